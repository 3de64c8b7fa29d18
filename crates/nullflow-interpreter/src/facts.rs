use std::fmt::Write;

use nullflow_ir::{IntRange, Lattice, Nullability, SmallVec, TypeId, TypeTable};

/// Narrowing facts known about one equivalence class.
///
/// `instance_of` holds only minimal types (no element is a supertype of
/// another) and `not_instance_of` only maximal ones, both sorted, so equal
/// knowledge has one representation. Every narrowing returns `None` instead
/// of producing a contradictory set.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct FactSet {
    nullability: Nullability,
    instance_of: SmallVec<[TypeId; 2]>,
    not_instance_of: SmallVec<[TypeId; 2]>,
    range: Option<IntRange>,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_declared(nullability: Nullability) -> Self {
        Self {
            nullability,
            ..Self::default()
        }
    }

    /// Facts of a value of integer constant `v`.
    pub fn int(v: i64) -> Self {
        Self {
            nullability: Nullability::NotNull,
            range: Some(IntRange::point(v)),
            ..Self::default()
        }
    }

    pub fn nullability(&self) -> Nullability {
        self.nullability
    }

    pub fn instance_of(&self) -> &[TypeId] {
        &self.instance_of
    }

    pub fn not_instance_of(&self) -> &[TypeId] {
        &self.not_instance_of
    }

    pub fn range(&self) -> Option<IntRange> {
        self.range
    }

    /// No fact beyond the top element.
    pub fn is_empty(&self) -> bool {
        *self == FactSet::default()
    }

    // -- Implication ---------------------------------------------------------

    pub fn implies_instance_of(&self, types: &TypeTable, ty: TypeId) -> bool {
        self.instance_of.iter().any(|s| types.is_subtype(*s, ty))
    }

    /// Whether the value is known not to be a `ty`. A `null` value trivially
    /// is not.
    pub fn implies_not_instance_of(&self, types: &TypeTable, ty: TypeId) -> bool {
        self.nullability == Nullability::Null
            || self.not_instance_of.iter().any(|n| types.is_subtype(ty, *n))
            || self.instance_of.iter().any(|s| types.are_disjoint(*s, ty))
    }

    // -- Narrowing -----------------------------------------------------------

    pub fn with_nullability(&self, nullability: Nullability) -> Option<Self> {
        let nullability = self.nullability.intersect(nullability)?;
        if nullability == Nullability::Null && !self.instance_of.is_empty() {
            return None;
        }
        Some(Self {
            nullability,
            ..self.clone()
        })
    }

    /// Narrow to instances of `ty`. Being an instance implies `NotNull`.
    pub fn with_instance_of(&self, types: &TypeTable, ty: TypeId) -> Option<Self> {
        if self.not_instance_of.iter().any(|n| types.is_subtype(ty, *n)) {
            return None;
        }
        if self.instance_of.iter().any(|s| types.are_disjoint(*s, ty)) {
            return None;
        }
        let mut out = self.with_nullability(Nullability::NotNull)?;
        if out.implies_instance_of(types, ty) {
            return Some(out);
        }
        out.instance_of.retain(|s| !types.is_subtype(ty, *s));
        insert_sorted(&mut out.instance_of, ty);
        // Excluded types the new one is disjoint from carry no information.
        out.not_instance_of.retain(|n| !types.are_disjoint(ty, *n));
        Some(out)
    }

    /// Narrow to values that are not instances of `ty`. `null` stays allowed.
    pub fn with_not_instance_of(&self, types: &TypeTable, ty: TypeId) -> Option<Self> {
        if self.implies_instance_of(types, ty) {
            return None;
        }
        if self.implies_not_instance_of(types, ty) {
            return Some(self.clone());
        }
        let mut out = self.clone();
        out.not_instance_of.retain(|n| !types.is_subtype(*n, ty));
        insert_sorted(&mut out.not_instance_of, ty);
        Some(out)
    }

    /// Narrow the integer range. A full range carries no information and is
    /// not stored.
    pub fn with_range(&self, range: IntRange) -> Option<Self> {
        let range = match self.range {
            Some(current) => current.meet(&range),
            None => range,
        };
        if range.is_empty() {
            return None;
        }
        Some(Self {
            range: (!range.is_full()).then_some(range),
            ..self.clone()
        })
    }

    /// Facts holding for a value that satisfies both `self` and `other`.
    pub fn intersect(&self, other: &Self, types: &TypeTable) -> Option<Self> {
        let mut out = self.with_nullability(other.nullability)?;
        for ty in &other.instance_of {
            out = out.with_instance_of(types, *ty)?;
        }
        for ty in &other.not_instance_of {
            out = out.with_not_instance_of(types, *ty)?;
        }
        if let Some(range) = other.range {
            out = out.with_range(range)?;
        }
        Some(out)
    }

    /// Facts implied by both `self` and `other`.
    pub fn join(&self, other: &Self, types: &TypeTable) -> Self {
        let mut instance_of: SmallVec<[TypeId; 2]> = SmallVec::new();
        for ty in self.instance_of.iter().chain(other.instance_of.iter()) {
            if self.implies_instance_of(types, *ty)
                && other.implies_instance_of(types, *ty)
                && !instance_of.contains(ty)
            {
                instance_of.push(*ty);
            }
        }
        let minimal: SmallVec<[TypeId; 2]> = instance_of
            .iter()
            .copied()
            .filter(|t| {
                !instance_of
                    .iter()
                    .any(|s| s != t && types.is_subtype(*s, *t))
            })
            .collect();

        let mut not_instance_of: SmallVec<[TypeId; 2]> = SmallVec::new();
        for ty in self.not_instance_of.iter().chain(other.not_instance_of.iter()) {
            if self.implies_not_instance_of(types, *ty)
                && other.implies_not_instance_of(types, *ty)
                && !not_instance_of.contains(ty)
            {
                not_instance_of.push(*ty);
            }
        }
        let maximal: SmallVec<[TypeId; 2]> = not_instance_of
            .iter()
            .copied()
            .filter(|t| {
                !not_instance_of
                    .iter()
                    .any(|n| n != t && types.is_subtype(*t, *n))
                    && !minimal.iter().any(|s| types.are_disjoint(*s, *t))
            })
            .collect();

        let range = match (self.range, other.range) {
            (Some(a), Some(b)) => Some(a.join(&b)).filter(|r| !r.is_full()),
            _ => None,
        };

        let mut out = Self {
            nullability: self.nullability.join(other.nullability),
            instance_of: minimal,
            not_instance_of: maximal,
            range,
        };
        out.instance_of.sort();
        out.not_instance_of.sort();
        out
    }

    /// `self ⊑ other`: everything `other` claims, `self` implies.
    pub fn is_subseteq(&self, other: &Self, types: &TypeTable) -> bool {
        if !self.nullability.is_subseteq(other.nullability) {
            return false;
        }
        if !other
            .instance_of
            .iter()
            .all(|t| self.implies_instance_of(types, *t))
        {
            return false;
        }
        if !other
            .not_instance_of
            .iter()
            .all(|t| self.implies_not_instance_of(types, *t))
        {
            return false;
        }
        match (self.range, other.range) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a.is_subseteq(&b),
        }
    }

    /// Equal in everything but nullability.
    pub(crate) fn same_but_nullability(&self, other: &Self) -> bool {
        self.instance_of == other.instance_of
            && self.not_instance_of == other.not_instance_of
            && self.range == other.range
    }

    /// Render with type names resolved, e.g. `not-null instanceof(A) range [0, 3]`.
    pub fn render(&self, types: &TypeTable) -> String {
        let mut out = self.nullability.to_string();
        let names = |tys: &[TypeId]| -> String {
            tys.iter()
                .map(|t| types.name(*t))
                .collect::<Vec<_>>()
                .join(", ")
        };
        if !self.instance_of.is_empty() {
            let _ = write!(out, " instanceof({})", names(&self.instance_of));
        }
        if !self.not_instance_of.is_empty() {
            let _ = write!(out, " !instanceof({})", names(&self.not_instance_of));
        }
        if let Some(range) = self.range {
            let _ = write!(out, " range {range}");
        }
        out
    }
}

fn insert_sorted(set: &mut SmallVec<[TypeId; 2]>, ty: TypeId) {
    if let Err(pos) = set.binary_search(&ty) {
        set.insert(pos, ty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hierarchy {
        types: TypeTable,
        object: TypeId,
        exception: TypeId,
        io: TypeId,
        runtime: TypeId,
        npe: TypeId,
        closeable: TypeId,
    }

    fn hierarchy() -> Hierarchy {
        let mut types = TypeTable::new();
        let object = types.class("Object", &[]);
        let closeable = types.interface("Closeable", &[]);
        let exception = types.class("Exception", &[object]);
        let io = types.class("IOException", &[exception]);
        let runtime = types.class("RuntimeException", &[exception]);
        let npe = types.final_class("NullPointerException", &[runtime]);
        Hierarchy {
            types,
            object,
            exception,
            io,
            runtime,
            npe,
            closeable,
        }
    }

    #[test]
    fn instance_of_keeps_minimal_types_and_implies_not_null() {
        let h = hierarchy();
        let f = FactSet::new()
            .with_instance_of(&h.types, h.exception)
            .and_then(|f| f.with_instance_of(&h.types, h.io))
            .unwrap();
        assert_eq!(f.instance_of(), &[h.io]);
        assert_eq!(f.nullability(), Nullability::NotNull);

        // A supertype of a known type is redundant.
        let g = f.with_instance_of(&h.types, h.object).unwrap();
        assert_eq!(g, f);
        assert_eq!(
            g.render(&h.types),
            "not-null instanceof(IOException)"
        );
    }

    #[test]
    fn contradictions_are_infeasible() {
        let h = hierarchy();
        let io = FactSet::new().with_instance_of(&h.types, h.io).unwrap();
        assert_eq!(io.with_instance_of(&h.types, h.runtime), None);
        assert_eq!(io.with_not_instance_of(&h.types, h.exception), None);
        assert_eq!(io.with_nullability(Nullability::Null), None);

        let not_exc = FactSet::new()
            .with_not_instance_of(&h.types, h.exception)
            .unwrap();
        assert_eq!(not_exc.with_instance_of(&h.types, h.npe), None);
        // Interfaces may still be implemented by a non-exception.
        assert!(not_exc.with_instance_of(&h.types, h.closeable).is_some());
    }

    #[test]
    fn not_instance_of_keeps_maximal_types() {
        let h = hierarchy();
        let f = FactSet::new()
            .with_not_instance_of(&h.types, h.io)
            .and_then(|f| f.with_not_instance_of(&h.types, h.exception))
            .unwrap();
        assert_eq!(f.not_instance_of(), &[h.exception]);
        // Already implied.
        assert_eq!(f.with_not_instance_of(&h.types, h.npe), Some(f.clone()));
        // Null values are allowed.
        assert_eq!(f.nullability(), Nullability::Unknown);
    }

    #[test]
    fn join_keeps_common_knowledge() {
        let h = hierarchy();
        let io = FactSet::new().with_instance_of(&h.types, h.io).unwrap();
        let npe = FactSet::new().with_instance_of(&h.types, h.npe).unwrap();
        let joined = io.join(&npe, &h.types);
        assert!(joined.instance_of().is_empty());
        assert_eq!(joined.nullability(), Nullability::NotNull);
        assert!(io.is_subseteq(&joined, &h.types));
        assert!(npe.is_subseteq(&joined, &h.types));

        let exc = FactSet::new().with_instance_of(&h.types, h.exception).unwrap();
        assert_eq!(io.join(&exc, &h.types), exc);
    }

    #[test]
    fn ranges_narrow_and_join() {
        let f = FactSet::new().with_range(IntRange::new(0, 10)).unwrap();
        let g = f.with_range(IntRange::at_least(5)).unwrap();
        assert_eq!(g.range(), Some(IntRange::new(5, 10)));
        assert_eq!(g.with_range(IntRange::at_most(2)), None);
        assert_eq!(FactSet::new().with_range(IntRange::full()), Some(FactSet::new()));
        assert_eq!(
            FactSet::int(1).join(&FactSet::int(3), &TypeTable::new()).range(),
            Some(IntRange::new(1, 3))
        );
    }
}
