use crate::{CmpOp, HasBottom, HasTop, Lattice};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Bound {
    NegInf,
    Finite(i64),
    PosInf,
}

impl Bound {
    pub fn min(self, other: Self) -> Self {
        match (self, other) {
            (Bound::NegInf, _) | (_, Bound::NegInf) => Bound::NegInf,
            (Bound::PosInf, b) | (b, Bound::PosInf) => b,
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a.min(b)),
        }
    }

    pub fn max(self, other: Self) -> Self {
        match (self, other) {
            (Bound::PosInf, _) | (_, Bound::PosInf) => Bound::PosInf,
            (Bound::NegInf, b) | (b, Bound::NegInf) => b,
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a.max(b)),
        }
    }

    pub fn less_than(self, other: Self) -> bool {
        match (self, other) {
            (Bound::NegInf, Bound::NegInf) => false,
            (Bound::NegInf, _) => true,
            (_, Bound::NegInf) => false,
            (Bound::PosInf, _) => false,
            (_, Bound::PosInf) => true,
            (Bound::Finite(a), Bound::Finite(b)) => a < b,
        }
    }

    pub fn less_eq(self, other: Self) -> bool {
        self == other || self.less_than(other)
    }
}

/// Closed integer range `[lo, hi]`. The empty range has a single
/// representation (`lo = +inf`, `hi = -inf`) so that structurally equal
/// knowledge compares equal.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntRange {
    pub lo: Bound,
    pub hi: Bound,
}

impl IntRange {
    pub fn new(lo: i64, hi: i64) -> Self {
        Self::from_bounds(Bound::Finite(lo), Bound::Finite(hi))
    }

    pub fn point(v: i64) -> Self {
        IntRange::new(v, v)
    }

    /// Every integer `<= hi`.
    pub fn at_most(hi: i64) -> Self {
        Self::from_bounds(Bound::NegInf, Bound::Finite(hi))
    }

    /// Every integer `>= lo`.
    pub fn at_least(lo: i64) -> Self {
        Self::from_bounds(Bound::Finite(lo), Bound::PosInf)
    }

    pub fn full() -> Self {
        IntRange {
            lo: Bound::NegInf,
            hi: Bound::PosInf,
        }
    }

    pub fn empty() -> Self {
        IntRange {
            lo: Bound::PosInf,
            hi: Bound::NegInf,
        }
    }

    fn from_bounds(lo: Bound, hi: Bound) -> Self {
        if lo.less_eq(hi) && lo != Bound::PosInf && hi != Bound::NegInf {
            IntRange { lo, hi }
        } else {
            IntRange::empty()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == IntRange::empty()
    }

    pub fn is_full(&self) -> bool {
        *self == IntRange::full()
    }

    pub fn contains(&self, v: i64) -> bool {
        self.lo.less_eq(Bound::Finite(v)) && Bound::Finite(v).less_eq(self.hi)
    }

    /// The single value of a one-point range.
    pub fn as_point(&self) -> Option<i64> {
        match (self.lo, self.hi) {
            (Bound::Finite(a), Bound::Finite(b)) if a == b => Some(a),
            _ => None,
        }
    }

    /// Remove `v` from the range. Only a boundary point can be removed
    /// without splitting, so interior points leave the range unchanged.
    pub fn without(&self, v: i64) -> Self {
        if !self.contains(v) {
            return *self;
        }
        if self.as_point() == Some(v) {
            return IntRange::empty();
        }
        if self.lo == Bound::Finite(v) {
            return Self::from_bounds(Bound::Finite(v.saturating_add(1)), self.hi);
        }
        if self.hi == Bound::Finite(v) {
            return Self::from_bounds(self.lo, Bound::Finite(v.saturating_sub(1)));
        }
        *self
    }

    /// Every value of `self` is strictly less than every value of `other`.
    pub fn entirely_below(&self, other: &Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.hi.less_than(other.lo)
    }

    /// The values of `self` for which `x op y` can hold for some `y` in `other`.
    pub fn refine(&self, op: CmpOp, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return IntRange::empty();
        }
        match op {
            CmpOp::Eq => self.meet(other),
            CmpOp::Ne => match other.as_point() {
                Some(v) => self.without(v),
                None => *self,
            },
            CmpOp::Lt => self.meet(&Self::from_bounds(Bound::NegInf, step(other.hi, -1))),
            CmpOp::Le => self.meet(&Self::from_bounds(Bound::NegInf, other.hi)),
            CmpOp::Gt => self.meet(&Self::from_bounds(step(other.lo, 1), Bound::PosInf)),
            CmpOp::Ge => self.meet(&Self::from_bounds(other.lo, Bound::PosInf)),
        }
    }
}

fn step(b: Bound, delta: i64) -> Bound {
    match b {
        Bound::Finite(v) => Bound::Finite(v.saturating_add(delta)),
        inf => inf,
    }
}

impl Lattice for IntRange {
    fn join(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        IntRange {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    fn meet(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return IntRange::empty();
        }
        Self::from_bounds(self.lo.max(other.lo), self.hi.min(other.hi))
    }

    fn is_subseteq(&self, other: &Self) -> bool {
        if self.is_empty() {
            return true;
        }
        if other.is_empty() {
            return false;
        }
        other.lo.less_eq(self.lo) && self.hi.less_eq(other.hi)
    }
}

impl HasBottom for IntRange {
    fn bottom() -> Self {
        IntRange::empty()
    }
}

impl HasTop for IntRange {
    fn top() -> Self {
        IntRange::full()
    }
}

impl std::fmt::Display for IntRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        let bound = |b: Bound| match b {
            Bound::NegInf => "-inf".to_string(),
            Bound::PosInf => "+inf".to_string(),
            Bound::Finite(v) => v.to_string(),
        };
        write!(f, "[{}, {}]", bound(self.lo), bound(self.hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_one_representation() {
        assert_eq!(IntRange::new(5, 1), IntRange::empty());
        assert_eq!(IntRange::new(0, 3).meet(&IntRange::new(7, 9)), IntRange::empty());
        assert!(IntRange::point(3).without(3).is_empty());
    }

    #[test]
    fn without_trims_boundaries_only() {
        let r = IntRange::new(0, 10);
        assert_eq!(r.without(0), IntRange::new(1, 10));
        assert_eq!(r.without(10), IntRange::new(0, 9));
        assert_eq!(r.without(5), r);
        assert_eq!(r.without(42), r);
    }

    #[test]
    fn ordering_helpers() {
        assert!(IntRange::at_most(3).entirely_below(&IntRange::at_least(4)));
        assert!(!IntRange::at_most(4).entirely_below(&IntRange::at_least(4)));
        assert_eq!(IntRange::point(7).as_point(), Some(7));
        assert_eq!(IntRange::full().to_string(), "[-inf, +inf]");
    }

    #[test]
    fn refine_against_comparison() {
        let x = IntRange::new(0, 10);
        let five = IntRange::point(5);
        assert_eq!(x.refine(CmpOp::Lt, &five), IntRange::new(0, 4));
        assert_eq!(x.refine(CmpOp::Ge, &five), IntRange::new(5, 10));
        assert_eq!(x.refine(CmpOp::Eq, &five), five);
        assert_eq!(five.refine(CmpOp::Ne, &five), IntRange::empty());
        assert!(x.refine(CmpOp::Gt, &IntRange::at_least(10)).is_empty());
        assert_eq!(IntRange::full().refine(CmpOp::Le, &IntRange::full()), IntRange::full());
    }
}
