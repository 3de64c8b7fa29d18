//! Assertion helpers for the algebraic laws of the analysis domains.
//!
//! Every check runs over a set of sample elements and collects all
//! violations into one report, so a broken law shows every counterexample
//! at once.
//!
//! # Example
//!
//! ```
//! use nullflow_ir::IntRange;
//! use nullflow_test_utils::lattice::assert_bounded_lattice_laws;
//!
//! assert_bounded_lattice_laws(&[IntRange::point(0), IntRange::at_least(3)]);
//! ```

use std::fmt::{Debug, Write};

use nullflow_ir::{HasBottom, HasTop, Lattice};

fn report(violations: Vec<String>) {
    if violations.is_empty() {
        return;
    }
    let mut msg = format!("{} law violation(s):\n", violations.len());
    for (i, v) in violations.iter().enumerate() {
        let _ = writeln!(msg, "  {}. {}", i + 1, v);
    }
    panic!("{msg}");
}

/// Check a join-semilattice given as a `join` function and an order `le`.
///
/// For every pair and triple drawn from `elements`: join is idempotent,
/// commutative and associative, it is an upper bound of both arguments, and
/// `le(a, b)` holds exactly when `join(a, b) == b`.
pub fn assert_join_semilattice<T: PartialEq + Debug>(
    elements: &[T],
    join: impl Fn(&T, &T) -> T,
    le: impl Fn(&T, &T) -> bool,
) {
    let mut violations = Vec::new();
    check_semilattice(elements, &join, &le, &mut violations);
    report(violations);
}

/// Check a [`Lattice`] implementation: both semilattices, absorption, and
/// agreement of `is_subseteq` with `join` and `meet`.
pub fn assert_lattice_laws<L: Lattice + PartialEq + Debug>(elements: &[L]) {
    let mut violations = Vec::new();
    check_lattice(elements, &mut violations);
    report(violations);
}

/// [`assert_lattice_laws`] plus the bottom and top element laws. Bottom and
/// top are added to the samples.
pub fn assert_bounded_lattice_laws<L: HasBottom + HasTop + PartialEq + Debug + Clone>(
    elements: &[L],
) {
    let mut samples = elements.to_vec();
    samples.push(L::bottom());
    samples.push(L::top());

    let mut violations = Vec::new();
    check_lattice(&samples, &mut violations);
    let (bot, top) = (L::bottom(), L::top());
    for x in &samples {
        if !bot.is_subseteq(x) || bot.join(x) != *x || bot.meet(x) != bot {
            violations.push(format!("bottom laws violated against {x:?}"));
        }
        if !x.is_subseteq(&top) || top.join(x) != top || top.meet(x) != *x {
            violations.push(format!("top laws violated against {x:?}"));
        }
    }
    report(violations);
}

// -- Checks -----------------------------------------------------------------

fn check_semilattice<T: PartialEq + Debug>(
    elements: &[T],
    op: &impl Fn(&T, &T) -> T,
    le: &impl Fn(&T, &T) -> bool,
    v: &mut Vec<String>,
) {
    for a in elements {
        if op(a, a) != *a {
            v.push(format!("not idempotent at {a:?}"));
        }
        for b in elements {
            let ab = op(a, b);
            if ab != op(b, a) {
                v.push(format!("not commutative: {a:?}, {b:?}"));
            }
            if !le(a, &ab) || !le(b, &ab) {
                v.push(format!("{ab:?} is not an upper bound of {a:?} and {b:?}"));
            }
            if le(a, b) != (ab == *b) {
                v.push(format!(
                    "order disagrees with join: le({a:?}, {b:?}) = {}, join = {ab:?}",
                    le(a, b)
                ));
            }
            for c in elements {
                if op(&ab, c) != op(a, &op(b, c)) {
                    v.push(format!("not associative: {a:?}, {b:?}, {c:?}"));
                }
            }
        }
    }
}

fn check_lattice<L: Lattice + PartialEq + Debug>(elements: &[L], v: &mut Vec<String>) {
    let le = |a: &L, b: &L| a.is_subseteq(b);
    check_semilattice(elements, &|a: &L, b: &L| a.join(b), &le, v);
    // The meet semilattice has the reverse order.
    check_semilattice(elements, &|a: &L, b: &L| a.meet(b), &|a: &L, b: &L| b.is_subseteq(a), v);
    for a in elements {
        for b in elements {
            if a.join(&a.meet(b)) != *a || a.meet(&a.join(b)) != *a {
                v.push(format!("absorption violated: {a:?}, {b:?}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nullflow_ir::{IntRange, Nullability};

    use super::*;

    const ALL: [Nullability; 5] = [
        Nullability::Null,
        Nullability::NotNull,
        Nullability::Nullable,
        Nullability::Flushed,
        Nullability::Unknown,
    ];

    #[test]
    fn nullability_is_a_join_semilattice() {
        assert_join_semilattice(&ALL, |a, b| a.join(*b), |a, b| a.is_subseteq(*b));
    }

    #[test]
    fn ranges_form_a_bounded_lattice() {
        assert_bounded_lattice_laws(&[
            IntRange::point(0),
            IntRange::point(5),
            IntRange::new(-3, 2),
            IntRange::at_most(1),
            IntRange::at_least(4),
        ]);
    }

    #[test]
    #[should_panic(expected = "law violation")]
    fn violations_are_reported() {
        // Subtraction is no join.
        assert_join_semilattice(&[1i64, 2], |a, b| a - b, |a, b| a <= b);
    }
}
