use nullflow_ir::SmallVec;

use crate::{AnalysisContext, FactSet, ValueId};

/// Values asserted equal in one state, with the facts they share.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct EqClass {
    /// Ascending; the first member is the class key.
    members: SmallVec<[ValueId; 4]>,
    facts: FactSet,
}

impl EqClass {
    pub(crate) fn singleton(value: ValueId, facts: FactSet) -> Self {
        let mut members = SmallVec::new();
        members.push(value);
        Self { members, facts }
    }

    pub(crate) fn from_members(mut members: SmallVec<[ValueId; 4]>, facts: FactSet) -> Self {
        members.sort();
        members.dedup();
        Self { members, facts }
    }

    pub fn key(&self) -> ValueId {
        self.members[0]
    }

    pub fn members(&self) -> &[ValueId] {
        &self.members
    }

    pub fn facts(&self) -> &FactSet {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, value: ValueId) -> bool {
        self.members.binary_search(&value).is_ok()
    }

    pub(crate) fn set_facts(&mut self, facts: FactSet) {
        self.facts = facts;
    }

    pub(crate) fn absorb(&mut self, other: EqClass) {
        self.members.extend(other.members);
        self.members.sort();
        self.members.dedup();
    }

    pub(crate) fn remove(&mut self, value: ValueId) -> bool {
        match self.members.binary_search(&value) {
            Ok(pos) => {
                self.members.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// The variable that best names this class: fewest qualifier hops, then
    /// lowest identity.
    pub fn canonical_variable(&self, ctx: &AnalysisContext<'_>) -> Option<ValueId> {
        self.members
            .iter()
            .copied()
            .filter(|m| ctx.is_variable(*m))
            .min_by_key(|m| (ctx.values.depth(*m), *m))
    }
}
