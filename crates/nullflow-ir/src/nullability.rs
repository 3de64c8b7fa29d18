/// What is known about whether a reference value is `null`.
///
/// Ordered from most to least precise:
/// `Null`, `NotNull` ⊑ `Nullable` ⊑ `Flushed` ⊑ `Unknown`.
///
/// `Flushed` is `Unknown` that remembers the value used to be known before a
/// side effect invalidated it. Consumers treat both as "no information" but may
/// choose not to warn on `Flushed`.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Nullability {
    Null,
    NotNull,
    Nullable,
    Flushed,
    #[default]
    Unknown,
}

impl Nullability {
    fn rank(self) -> u8 {
        match self {
            Nullability::Null | Nullability::NotNull => 0,
            Nullability::Nullable => 1,
            Nullability::Flushed => 2,
            Nullability::Unknown => 3,
        }
    }

    /// Least upper bound.
    pub fn join(self, other: Self) -> Self {
        if self == other {
            return self;
        }
        match self.rank().max(other.rank()) {
            // Null and NotNull disagree: either is possible.
            0 | 1 => Nullability::Nullable,
            2 => Nullability::Flushed,
            _ => Nullability::Unknown,
        }
    }

    /// Greatest lower bound, or `None` when the two cannot hold at once.
    pub fn intersect(self, other: Self) -> Option<Self> {
        if self == other {
            return Some(self);
        }
        match (self, other) {
            (Nullability::Null, Nullability::NotNull) | (Nullability::NotNull, Nullability::Null) => {
                None
            }
            _ if self.rank() <= other.rank() => Some(self),
            _ => Some(other),
        }
    }

    pub fn is_subseteq(self, other: Self) -> bool {
        self == other || (self.rank() < other.rank())
    }

    /// `true` when a value with this nullability may be `null` at runtime and
    /// the analysis has reason to believe so.
    pub fn may_be_null(self) -> bool {
        matches!(self, Nullability::Null | Nullability::Nullable)
    }

    pub fn is_known(self) -> bool {
        matches!(self, Nullability::Null | Nullability::NotNull | Nullability::Nullable)
    }
}

impl std::fmt::Display for Nullability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Nullability::Null => "null",
            Nullability::NotNull => "not-null",
            Nullability::Nullable => "nullable",
            Nullability::Flushed => "flushed",
            Nullability::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::Nullability::*;

    #[test]
    fn null_and_not_null_join_to_nullable() {
        assert_eq!(Null.join(NotNull), Nullable);
        assert_eq!(NotNull.join(Null), Nullable);
        assert_eq!(Null.join(Flushed), Flushed);
        assert_eq!(Nullable.join(Unknown), Unknown);
    }

    #[test]
    fn contradictory_intersection_is_infeasible() {
        assert_eq!(Null.intersect(NotNull), None);
        assert_eq!(Nullable.intersect(NotNull), Some(NotNull));
        assert_eq!(Unknown.intersect(Null), Some(Null));
        assert_eq!(Flushed.intersect(Nullable), Some(Nullable));
    }

    #[test]
    fn ordering() {
        assert!(Null.is_subseteq(Nullable));
        assert!(NotNull.is_subseteq(Unknown));
        assert!(!Null.is_subseteq(NotNull));
        assert!(!Unknown.is_subseteq(Flushed));
    }
}
