use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::hash::{Hash, Hasher};

use log::trace;
use nullflow_ir::{Constant, IntRange, Nullability, SmallVec, Trap, TypeId, VarKind};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{AnalysisContext, EqClass, FactSet, TrapStack, Value, ValueId};

/// Abstract memory along one path: evaluation stack, equivalence classes with
/// their facts, known disequalities and the active protected regions.
///
/// The representation is canonical. A value with no class has its default
/// facts, and a singleton class that only repeats those defaults is dropped,
/// so two states holding the same knowledge compare equal. The member index
/// is derived and takes no part in equality or hashing.
#[derive(Clone, Default)]
pub struct MemoryState {
    stack: SmallVec<[ValueId; 8]>,
    classes: BTreeMap<ValueId, EqClass>,
    /// Pairs of class keys, smaller first.
    distinct: BTreeSet<(ValueId, ValueId)>,
    traps: TrapStack,
    index: FxHashMap<ValueId, ValueId>,
}

fn pair(a: ValueId, b: ValueId) -> (ValueId, ValueId) {
    if a <= b { (a, b) } else { (b, a) }
}

// -- Stack and traps --------------------------------------------------------

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: ValueId) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<ValueId> {
        self.stack.pop()
    }

    pub fn peek(&self) -> Option<ValueId> {
        self.stack.last().copied()
    }

    pub fn stack(&self) -> &[ValueId] {
        &self.stack
    }

    /// Remove the topmost stack entry satisfying `pred`.
    pub(crate) fn take_topmost(&mut self, pred: impl Fn(ValueId) -> bool) -> Option<ValueId> {
        let pos = self.stack.iter().rposition(|v| pred(*v))?;
        Some(self.stack.remove(pos))
    }

    pub fn traps(&self) -> &TrapStack {
        &self.traps
    }

    pub fn set_traps(&mut self, traps: TrapStack) {
        self.traps = traps;
    }

    pub fn push_trap(&mut self, trap: Trap) {
        self.traps = self.traps.push(trap);
    }

    /// Leave the innermost protected region. `false` if there is none.
    pub fn pop_trap(&mut self) -> bool {
        match self.traps.pop() {
            Some((_, rest)) => {
                self.traps = rest;
                true
            }
            None => false,
        }
    }
}

// -- Queries ----------------------------------------------------------------

impl MemoryState {
    pub fn classes(&self) -> impl Iterator<Item = &EqClass> {
        self.classes.values()
    }

    pub fn class_of(&self, value: ValueId) -> Option<&EqClass> {
        self.classes.get(self.index.get(&value)?)
    }

    pub fn distinct_pairs(&self) -> impl Iterator<Item = (ValueId, ValueId)> + '_ {
        self.distinct.iter().copied()
    }

    fn key_of(&self, value: ValueId) -> ValueId {
        self.index.get(&value).copied().unwrap_or(value)
    }

    fn members_of(&self, value: ValueId) -> SmallVec<[ValueId; 4]> {
        match self.class_of(value) {
            Some(class) => class.members().iter().copied().collect(),
            None => SmallVec::from_elem(value, 1),
        }
    }

    pub fn facts_of(&self, ctx: &AnalysisContext<'_>, value: ValueId) -> FactSet {
        match self.class_of(value) {
            Some(class) => class.facts().clone(),
            None => ctx.default_facts(value),
        }
    }

    pub fn nullability_of(&self, ctx: &AnalysisContext<'_>, value: ValueId) -> Nullability {
        self.facts_of(ctx, value).nullability()
    }

    pub fn are_equal(&self, a: ValueId, b: ValueId) -> bool {
        a == b || self.key_of(a) == self.key_of(b)
    }

    pub fn are_distinct(&self, a: ValueId, b: ValueId) -> bool {
        self.distinct
            .contains(&pair(self.key_of(a), self.key_of(b)))
    }

    pub fn canonical_variable(&self, ctx: &AnalysisContext<'_>, value: ValueId) -> Option<ValueId> {
        match self.class_of(value) {
            Some(class) => class.canonical_variable(ctx),
            None => ctx.is_variable(value).then_some(value),
        }
    }

    /// Same evaluation stack and trap stack.
    pub fn same_superficial(&self, other: &Self) -> bool {
        self.stack == other.stack && self.traps == other.traps
    }

    /// Same equalities and disequalities, whatever the facts.
    pub fn same_partition(&self, other: &Self) -> bool {
        let merged = |s: &Self| {
            s.classes
                .values()
                .filter(|c| c.len() > 1)
                .map(|c| c.members().to_vec())
                .collect::<Vec<_>>()
        };
        self.distinct == other.distinct && merged(self) == merged(other)
    }

    /// Pairs of differing class facts. Only meaningful between states with
    /// the [same partition](Self::same_partition).
    pub(crate) fn fact_differences(
        &self,
        ctx: &AnalysisContext<'_>,
        other: &Self,
    ) -> Vec<(FactSet, FactSet)> {
        let keys: BTreeSet<ValueId> = self
            .classes
            .keys()
            .chain(other.classes.keys())
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|key| {
                let (a, b) = (self.facts_of(ctx, key), other.facts_of(ctx, key));
                (a != b).then_some((a, b))
            })
            .collect()
    }
}

// -- Canonical form ---------------------------------------------------------

impl MemoryState {
    fn rebuild_index(&mut self) {
        self.index.clear();
        for (key, class) in &self.classes {
            for member in class.members() {
                self.index.insert(*member, *key);
            }
        }
    }

    fn normalize(&mut self, ctx: &AnalysisContext<'_>) {
        let referenced: FxHashSet<ValueId> = self
            .distinct
            .iter()
            .flat_map(|(a, b)| [*a, *b])
            .collect();
        self.classes.retain(|key, class| {
            class.len() > 1 || referenced.contains(key) || *class.facts() != ctx.default_facts(*key)
        });
        self.rebuild_index();
    }

    /// Give `value` an explicit class and return its key.
    fn ensure_class(&mut self, ctx: &AnalysisContext<'_>, value: ValueId) -> ValueId {
        if let Some(key) = self.index.get(&value) {
            return *key;
        }
        self.classes
            .insert(value, EqClass::singleton(value, ctx.default_facts(value)));
        self.index.insert(value, value);
        value
    }

    fn remap_distinct(&mut self, old: ValueId, new: Option<ValueId>) {
        if Some(old) == new {
            return;
        }
        let touched: Vec<(ValueId, ValueId)> = self
            .distinct
            .iter()
            .copied()
            .filter(|(a, b)| *a == old || *b == old)
            .collect();
        for (a, b) in touched {
            self.distinct.remove(&(a, b));
            let Some(new) = new else { continue };
            let other = if a == old { b } else { a };
            self.distinct.insert(pair(new, other));
        }
    }

    /// Re-establish the key of the class formerly keyed `old` after a member
    /// was removed.
    fn rekey(&mut self, old: ValueId) {
        let Some(class) = self.classes.remove(&old) else {
            return;
        };
        if class.is_empty() {
            self.remap_distinct(old, None);
            return;
        }
        let key = class.key();
        self.classes.insert(key, class);
        self.remap_distinct(old, Some(key));
    }
}

// -- Equalities -------------------------------------------------------------

impl MemoryState {
    /// Record `a == b`. `false` when the equality is infeasible.
    pub fn unite_values(
        &mut self,
        ctx: &mut AnalysisContext<'_>,
        a: ValueId,
        b: ValueId,
    ) -> bool {
        if a == b {
            return true;
        }
        let types = ctx.types();
        match (ctx.is_fact_carrier(a), ctx.is_fact_carrier(b)) {
            (true, true) => self
                .facts_of(ctx, a)
                .intersect(&self.facts_of(ctx, b), types)
                .is_some(),
            (false, true) => {
                let carried = self.facts_of(ctx, b);
                self.narrow(ctx, a, |f| f.intersect(&carried, types))
            }
            (true, false) => {
                let carried = self.facts_of(ctx, a);
                self.narrow(ctx, b, |f| f.intersect(&carried, types))
            }
            (false, false) => self.merge_classes(ctx, a, b),
        }
    }

    fn constant_member(&self, ctx: &AnalysisContext<'_>, value: ValueId) -> Option<ValueId> {
        self.members_of(value)
            .into_iter()
            .find(|m| ctx.is_constant(*m))
    }

    fn merge_classes(&mut self, ctx: &AnalysisContext<'_>, a: ValueId, b: ValueId) -> bool {
        if self.are_equal(a, b) {
            return true;
        }
        if self.are_distinct(a, b) {
            return false;
        }
        if let (Some(ca), Some(cb)) = (self.constant_member(ctx, a), self.constant_member(ctx, b))
        {
            if ca != cb {
                return false;
            }
        }
        let Some(facts) = self
            .facts_of(ctx, a)
            .intersect(&self.facts_of(ctx, b), ctx.types())
        else {
            return false;
        };

        let ka = self.ensure_class(ctx, a);
        let kb = self.ensure_class(ctx, b);
        let (Some(mut merged), Some(other)) = (self.classes.remove(&ka), self.classes.remove(&kb))
        else {
            return false;
        };
        merged.absorb(other);
        merged.set_facts(facts);
        let key = merged.key();
        self.classes.insert(key, merged);
        self.remap_distinct(ka, Some(key));
        self.remap_distinct(kb, Some(key));
        self.normalize(ctx);
        true
    }

    /// Record `a != b`. `false` when the values are already known equal.
    pub fn assert_distinct(
        &mut self,
        ctx: &mut AnalysisContext<'_>,
        a: ValueId,
        b: ValueId,
    ) -> bool {
        let (a_null, b_null) = (ctx.is_null(a), ctx.is_null(b));
        if a == b {
            // Two objects described by one assertion may still differ.
            return ctx.is_fact_carrier(a) && !a_null;
        }
        if b_null {
            return self.narrow(ctx, a, |f| f.with_nullability(Nullability::NotNull));
        }
        if a_null {
            return self.narrow(ctx, b, |f| f.with_nullability(Nullability::NotNull));
        }
        if ctx.is_fact_carrier(a) || ctx.is_fact_carrier(b) {
            return true;
        }
        if self.are_equal(a, b) {
            return false;
        }
        for (value, other) in [(a, b), (b, a)] {
            let constant = match ctx.value(other) {
                Some(Value::Constant(Constant::Int(c))) => Some(*c),
                _ => None,
            };
            if let Some(c) = constant {
                let feasible = self.narrow(ctx, value, |f| {
                    f.with_range(f.range().unwrap_or_else(IntRange::full).without(c))
                });
                if !feasible {
                    return false;
                }
            }
        }
        if ctx.is_constant(a) && ctx.is_constant(b) {
            return true;
        }
        let ka = self.ensure_class(ctx, a);
        let kb = self.ensure_class(ctx, b);
        self.distinct.insert(pair(ka, kb));
        self.normalize(ctx);
        true
    }
}

// -- Facts ------------------------------------------------------------------

impl MemoryState {
    /// Replace the facts of `value`'s class with `f(current)`. `false` when
    /// `f` finds the narrowing infeasible.
    fn narrow(
        &mut self,
        ctx: &mut AnalysisContext<'_>,
        value: ValueId,
        f: impl FnOnce(&FactSet) -> Option<FactSet>,
    ) -> bool {
        let current = self.facts_of(ctx, value);
        let Some(next) = f(&current) else {
            return false;
        };
        if next == current {
            return true;
        }
        if ctx.is_fact_carrier(value) {
            // A carrier never joins a class: the stack slots holding it take
            // a value of their own with the narrowed facts.
            let narrowed = ctx.values.derived(value, next);
            for slot in self.stack.iter_mut().filter(|slot| **slot == value) {
                *slot = narrowed;
            }
            return true;
        }
        let key = self.ensure_class(ctx, value);
        if let Some(class) = self.classes.get_mut(&key) {
            class.set_facts(next);
        }
        self.normalize(ctx);
        true
    }

    pub fn with_nullability(
        mut self,
        ctx: &mut AnalysisContext<'_>,
        value: ValueId,
        nullability: Nullability,
    ) -> Option<Self> {
        self.narrow(ctx, value, |f| f.with_nullability(nullability))
            .then_some(self)
    }

    pub fn with_instanceof_fact(
        mut self,
        ctx: &mut AnalysisContext<'_>,
        value: ValueId,
        ty: TypeId,
    ) -> Option<Self> {
        let types = ctx.types();
        self.narrow(ctx, value, |f| f.with_instance_of(types, ty))
            .then_some(self)
    }

    pub fn with_not_instanceof_fact(
        mut self,
        ctx: &mut AnalysisContext<'_>,
        value: ValueId,
        ty: TypeId,
    ) -> Option<Self> {
        let types = ctx.types();
        self.narrow(ctx, value, |f| f.with_not_instance_of(types, ty))
            .then_some(self)
    }

    pub fn with_range(
        mut self,
        ctx: &mut AnalysisContext<'_>,
        value: ValueId,
        range: IntRange,
    ) -> Option<Self> {
        self.narrow(ctx, value, |f| f.with_range(range))
            .then_some(self)
    }

    /// Apply every fact of `facts` to `value`.
    pub fn with_facts(
        mut self,
        ctx: &mut AnalysisContext<'_>,
        value: ValueId,
        facts: &FactSet,
    ) -> Option<Self> {
        let types = ctx.types();
        self.narrow(ctx, value, |f| f.intersect(facts, types))
            .then_some(self)
    }
}

// -- Assignment and invalidation --------------------------------------------

impl MemoryState {
    /// Forget everything known about `var` and every value reached through it.
    /// A variable whose nullability was known is left `Flushed`.
    pub fn flush_variable(&mut self, ctx: &mut AnalysisContext<'_>, var: ValueId) {
        self.flush(ctx, var, true);
    }

    /// Flush every field variable, as after a call with unknown side effects.
    pub fn flush_fields(&mut self, ctx: &mut AnalysisContext<'_>) {
        let mut fields: Vec<ValueId> = self
            .classes
            .values()
            .flat_map(|c| c.members().iter().copied())
            .chain(self.stack.iter().copied())
            .filter(|v| ctx.var_kind(*v) == Some(VarKind::Field))
            .collect();
        fields.sort();
        fields.dedup();
        for field in fields {
            self.flush(ctx, field, true);
        }
    }

    /// `var = value`: flush `var`, then unite it with `value`.
    pub fn assign(&mut self, ctx: &mut AnalysisContext<'_>, var: ValueId, value: ValueId) -> bool {
        if var == value {
            return true;
        }
        // Keep `value` on the stack while flushing so that a value read
        // through `var` is replaced by its old meaning.
        self.stack.push(value);
        self.flush(ctx, var, false);
        let value = self.stack.pop().unwrap_or(value);
        self.unite_values(ctx, var, value)
    }

    fn flush(&mut self, ctx: &mut AnalysisContext<'_>, var: ValueId, mark: bool) {
        // A box on the stack reads the variable it wraps.
        let boxes: Vec<(ValueId, ValueId)> = self
            .stack
            .iter()
            .filter_map(|slot| ctx.values.unboxed(*slot).map(|inner| (*slot, inner)))
            .collect();
        let mut affected: Vec<ValueId> = self
            .classes
            .values()
            .flat_map(|c| c.members().iter().copied())
            .chain(self.stack.iter().copied())
            .chain(boxes.iter().map(|(_, inner)| *inner))
            .filter(|v| ctx.values.is_qualified_by(*v, var))
            .collect();
        affected.push(var);
        affected.sort();
        affected.dedup();

        // Stack entries keep the value they had before the flush.
        let mut substitutes: FxHashMap<ValueId, ValueId> = FxHashMap::default();
        for v in affected.iter().copied() {
            let read = self.stack.contains(&v) || boxes.iter().any(|(_, inner)| *inner == v);
            if !read {
                continue;
            }
            let survivor = self.class_of(v).and_then(|class| {
                class
                    .members()
                    .iter()
                    .copied()
                    .filter(|m| affected.binary_search(m).is_err())
                    .min_by_key(|m| (ctx.values.depth(*m), *m))
            });
            let substitute = match survivor {
                Some(s) => s,
                None => {
                    let snapshot = self.facts_of(ctx, v);
                    ctx.values.derived(v, snapshot)
                }
            };
            substitutes.insert(v, substitute);
        }
        for (slot, inner) in boxes {
            if let Some(s) = substitutes.get(&inner).copied() {
                substitutes.insert(slot, ctx.values.boxed(s));
            }
        }
        for slot in self.stack.iter_mut() {
            if let Some(s) = substitutes.get(slot) {
                *slot = *s;
            }
        }

        for v in affected {
            self.detach(ctx, v, mark);
        }
        self.normalize(ctx);
        trace!("flushed {}", ctx.render_value(var));
    }

    fn detach(&mut self, ctx: &AnalysisContext<'_>, value: ValueId, mark: bool) {
        let previous = self.facts_of(ctx, value);
        if let Some(key) = self.index.get(&value).copied() {
            if let Some(class) = self.classes.get_mut(&key) {
                class.remove(value);
            }
            self.index.remove(&value);
            self.rekey(key);
            self.rebuild_index();
        }

        // Declared field nullability is an invariant of the field; anything
        // else starts over.
        let mut facts = if ctx.var_kind(value) == Some(VarKind::Field) {
            ctx.default_facts(value)
        } else {
            FactSet::default()
        };
        if mark && previous.nullability().is_known() && !facts.nullability().is_known() {
            facts = FactSet::with_declared(Nullability::Flushed);
        }
        if facts != ctx.default_facts(value) {
            self.classes.insert(value, EqClass::singleton(value, facts));
            self.index.insert(value, value);
        }
    }
}

// -- Lattice operations -----------------------------------------------------

impl MemoryState {
    fn mentioned(&self) -> BTreeSet<ValueId> {
        self.classes
            .values()
            .flat_map(|c| c.members().iter().copied())
            .collect()
    }

    /// Whether `self` holds no knowledge that `other` lacks, so that every
    /// concrete state `other` admits, `self` admits too.
    pub fn is_superstate_of(&self, ctx: &AnalysisContext<'_>, other: &Self) -> bool {
        if !self.same_superficial(other) {
            return false;
        }
        for class in self.classes.values() {
            let key = class.key();
            if !class.members().iter().all(|m| other.are_equal(key, *m)) {
                return false;
            }
        }
        let types = ctx.types();
        let values = self.mentioned().into_iter().chain(other.mentioned());
        for value in values {
            if !other
                .facts_of(ctx, value)
                .is_subseteq(&self.facts_of(ctx, value), types)
            {
                return false;
            }
        }
        self.distinct.iter().all(|(a, b)| other.are_distinct(*a, *b))
    }

    /// Least upper bound of two states with the same stack and trap stack:
    /// equalities and disequalities holding in both, joined facts.
    pub fn join(&self, ctx: &AnalysisContext<'_>, other: &Self) -> Self {
        debug_assert!(self.same_superficial(other));
        let types = ctx.types();
        let mut out = MemoryState {
            stack: self.stack.clone(),
            traps: self.traps.clone(),
            ..MemoryState::default()
        };

        let mut groups: BTreeMap<(ValueId, ValueId), SmallVec<[ValueId; 4]>> = BTreeMap::new();
        for value in self.mentioned().into_iter().chain(other.mentioned()) {
            let members = groups
                .entry((self.key_of(value), other.key_of(value)))
                .or_default();
            if !members.contains(&value) {
                members.push(value);
            }
        }
        for members in groups.into_values() {
            let first = members[0];
            let facts = self
                .facts_of(ctx, first)
                .join(&other.facts_of(ctx, first), types);
            let class = EqClass::from_members(members, facts);
            out.classes.insert(class.key(), class);
        }
        out.rebuild_index();

        for (a, b) in &self.distinct {
            for ma in self.members_of(*a) {
                for mb in self.members_of(*b) {
                    if other.are_distinct(ma, mb) {
                        out.distinct.insert(pair(out.key_of(ma), out.key_of(mb)));
                    }
                }
            }
        }
        out.normalize(ctx);
        out
    }
}

// -- Equality, hashing and rendering ----------------------------------------

impl PartialEq for MemoryState {
    fn eq(&self, other: &Self) -> bool {
        self.stack == other.stack
            && self.classes == other.classes
            && self.distinct == other.distinct
            && self.traps == other.traps
    }
}

impl Eq for MemoryState {}

impl Hash for MemoryState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stack.hash(state);
        self.classes.hash(state);
        self.distinct.hash(state);
        self.traps.hash(state);
    }
}

impl std::fmt::Debug for MemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryState")
            .field("stack", &self.stack)
            .field("classes", &self.classes)
            .field("distinct", &self.distinct)
            .field("traps", &self.traps)
            .finish()
    }
}

impl MemoryState {
    /// One-line rendering with names resolved, e.g.
    /// `stack [x] | x = y: not-null | x != z | traps []`.
    pub fn render(&self, ctx: &AnalysisContext<'_>) -> String {
        let types = ctx.types();
        let stack: Vec<String> = self.stack.iter().map(|v| ctx.render_value(*v)).collect();
        let mut out = format!("stack [{}]", stack.join(", "));
        for class in self.classes.values() {
            let members: Vec<String> = class
                .members()
                .iter()
                .map(|v| ctx.render_value(*v))
                .collect();
            let _ = write!(
                out,
                " | {}: {}",
                members.join(" = "),
                class.facts().render(types)
            );
        }
        for (a, b) in &self.distinct {
            let _ = write!(out, " | {} != {}", ctx.render_value(*a), ctx.render_value(*b));
        }
        let _ = write!(out, " | traps {}", self.traps);
        out
    }
}

#[cfg(test)]
mod tests {
    use nullflow_ir::{Program, ProgramBuilder, TypeTable, VarPath};
    use test_log::test;

    use super::*;

    struct Fixture {
        program: Program,
        x: VarPath,
        y: VarPath,
        f: VarPath,
    }

    fn fixture() -> Fixture {
        let mut b = ProgramBuilder::new(TypeTable::new());
        let x = b.local("x");
        let y = b.local("y");
        let f = b.field("f");
        b.ret();
        Fixture {
            program: b.finish().unwrap(),
            x: VarPath::new(x),
            y: VarPath::new(y),
            f: VarPath::new(x).field(f),
        }
    }

    #[test]
    fn united_values_share_facts() {
        let fx = fixture();
        let mut ctx = AnalysisContext::new(&fx.program);
        let (x, y) = (ctx.values.path(&fx.x), ctx.values.path(&fx.y));
        let mut state = MemoryState::new();
        assert!(state.unite_values(&mut ctx, x, y));
        let state = state.with_nullability(&mut ctx, x, Nullability::NotNull).unwrap();
        assert_eq!(state.nullability_of(&ctx, y), Nullability::NotNull);
        assert_eq!(state.canonical_variable(&ctx, y), Some(x));
        insta::assert_snapshot!(state.render(&ctx), @"stack [] | x = y: not-null | traps []");
    }

    #[test]
    fn equality_and_disequality_conflict() {
        let fx = fixture();
        let mut ctx = AnalysisContext::new(&fx.program);
        let (x, y) = (ctx.values.path(&fx.x), ctx.values.path(&fx.y));
        let mut state = MemoryState::new();
        assert!(state.assert_distinct(&mut ctx, x, y));
        assert!(state.are_distinct(y, x));
        assert!(!state.clone().unite_values(&mut ctx, x, y));

        let mut equal = MemoryState::new();
        assert!(equal.unite_values(&mut ctx, x, y));
        assert!(!equal.assert_distinct(&mut ctx, x, y));
    }

    #[test]
    fn null_constant_applies_facts() {
        let fx = fixture();
        let mut ctx = AnalysisContext::new(&fx.program);
        let x = ctx.values.path(&fx.x);
        let null = ctx.values.constant(Constant::Null);

        let mut is_null = MemoryState::new();
        assert!(is_null.unite_values(&mut ctx, x, null));
        assert_eq!(is_null.nullability_of(&ctx, x), Nullability::Null);
        assert!(is_null.class_of(null).is_none());

        let mut not_null = MemoryState::new();
        assert!(not_null.assert_distinct(&mut ctx, x, null));
        assert_eq!(not_null.nullability_of(&ctx, x), Nullability::NotNull);
        assert!(!not_null.unite_values(&mut ctx, x, null));
    }

    #[test]
    fn integer_constants_narrow_ranges() {
        let fx = fixture();
        let mut ctx = AnalysisContext::new(&fx.program);
        let x = ctx.values.path(&fx.x);
        let one = ctx.values.constant(Constant::Int(1));
        let two = ctx.values.constant(Constant::Int(2));

        let mut state = MemoryState::new();
        assert!(state.unite_values(&mut ctx, x, one));
        assert_eq!(state.facts_of(&ctx, x).range(), Some(IntRange::point(1)));
        assert!(!state.clone().unite_values(&mut ctx, x, two));
        assert!(!state.assert_distinct(&mut ctx, x, one));
    }

    #[test]
    fn flushing_marks_known_nullability_and_drops_fields() {
        let fx = fixture();
        let mut ctx = AnalysisContext::new(&fx.program);
        let (x, xf) = (ctx.values.path(&fx.x), ctx.values.path(&fx.f));
        let mut state = MemoryState::new()
            .with_nullability(&mut ctx, x, Nullability::NotNull)
            .and_then(|s| s.with_nullability(&mut ctx, xf, Nullability::Null))
            .unwrap();
        state.flush_variable(&mut ctx, x);
        assert_eq!(state.nullability_of(&ctx, x), Nullability::Flushed);
        assert_eq!(state.nullability_of(&ctx, xf), Nullability::Flushed);
    }

    #[test]
    fn assignment_reads_the_old_value() {
        let fx = fixture();
        let mut ctx = AnalysisContext::new(&fx.program);
        let (x, xf) = (ctx.values.path(&fx.x), ctx.values.path(&fx.f));
        // x = x.f where x.f is known non-null.
        let mut state = MemoryState::new()
            .with_nullability(&mut ctx, xf, Nullability::NotNull)
            .unwrap();
        assert!(state.assign(&mut ctx, x, xf));
        assert_eq!(state.nullability_of(&ctx, x), Nullability::NotNull);
        assert_eq!(state.nullability_of(&ctx, xf), Nullability::Unknown);
    }

    #[test]
    fn stack_entries_survive_a_flush() {
        let fx = fixture();
        let mut ctx = AnalysisContext::new(&fx.program);
        let (x, y) = (ctx.values.path(&fx.x), ctx.values.path(&fx.y));
        let mut state = MemoryState::new();
        assert!(state.unite_values(&mut ctx, x, y));
        state.push(x);
        state.flush_variable(&mut ctx, x);
        // The pushed value is still the one `y` holds.
        assert_eq!(state.peek(), Some(y));
    }

    #[test]
    fn join_keeps_common_knowledge() {
        let fx = fixture();
        let mut ctx = AnalysisContext::new(&fx.program);
        let (x, y) = (ctx.values.path(&fx.x), ctx.values.path(&fx.y));
        let mut a = MemoryState::new()
            .with_nullability(&mut ctx, x, Nullability::Null)
            .unwrap();
        assert!(a.unite_values(&mut ctx, x, y));
        let b = MemoryState::new()
            .with_nullability(&mut ctx, x, Nullability::NotNull)
            .unwrap();

        let joined = a.join(&ctx, &b);
        assert_eq!(joined.nullability_of(&ctx, x), Nullability::Nullable);
        assert!(!joined.are_equal(x, y));
        assert!(joined.is_superstate_of(&ctx, &a));
        assert!(joined.is_superstate_of(&ctx, &b));
        assert!(!a.is_superstate_of(&ctx, &joined));
    }

    #[test]
    fn equal_knowledge_is_equal_state() {
        let fx = fixture();
        let mut ctx = AnalysisContext::new(&fx.program);
        let x = ctx.values.path(&fx.x);
        let narrowed = MemoryState::new()
            .with_nullability(&mut ctx, x, Nullability::NotNull)
            .unwrap();
        let mut flushed = narrowed.clone();
        flushed.flush_variable(&mut ctx, x);
        let mut widened = MemoryState::new()
            .with_nullability(&mut ctx, x, Nullability::Null)
            .unwrap();
        widened.flush_variable(&mut ctx, x);
        assert_eq!(flushed, widened);
        assert_ne!(flushed, MemoryState::new());
    }
}
