use std::collections::{BTreeMap, BTreeSet};

use nullflow_ir::{InstrIndex, Nullability, TypeId, VarPath};

use crate::{AnalysisContext, FactSet, Inconsistency, MemoryState, UncaughtException};

/// A defect observed while exploring the method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Problem {
    /// A dereference of a value that is null on every path (`definite`) or
    /// on some path.
    NullDereference { at: InstrIndex, definite: bool },
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Problem::NullDereference { at, definite: true } => {
                write!(f, "null dereference at {at}")
            }
            Problem::NullDereference { at, definite: false } => {
                write!(f, "possible null dereference at {at}")
            }
        }
    }
}

/// Outcome of a completed run: the states that reached each instruction,
/// plus what the run observed along the way.
#[derive(Debug)]
pub struct RunResult<'ir> {
    ctx: AnalysisContext<'ir>,
    states: BTreeMap<InstrIndex, Vec<MemoryState>>,
    poisoned: BTreeSet<InstrIndex>,
    uncaught: Vec<UncaughtException>,
    edges: BTreeSet<(InstrIndex, InstrIndex)>,
    processed: usize,
    inconsistencies: Vec<(InstrIndex, Inconsistency)>,
}

impl<'ir> RunResult<'ir> {
    pub(crate) fn new(
        ctx: AnalysisContext<'ir>,
        states: BTreeMap<InstrIndex, Vec<MemoryState>>,
        uncaught: Vec<UncaughtException>,
        edges: BTreeSet<(InstrIndex, InstrIndex)>,
        processed: usize,
        inconsistencies: Vec<(InstrIndex, Inconsistency)>,
    ) -> Self {
        let poisoned = inconsistencies.iter().map(|(at, _)| *at).collect();
        Self {
            ctx,
            states,
            poisoned,
            uncaught,
            edges,
            processed,
            inconsistencies,
        }
    }

    /// The interned values and program the states refer to.
    pub fn context(&self) -> &AnalysisContext<'ir> {
        &self.ctx
    }

    /// Distinct states recorded at `at`, empty if it was never reached.
    /// `None` if an inconsistency was observed there.
    pub fn states_at(&self, at: InstrIndex) -> Option<&[MemoryState]> {
        if self.poisoned.contains(&at) {
            return None;
        }
        Some(self.states.get(&at).map_or(&[][..], Vec::as_slice))
    }

    pub fn is_reachable(&self, at: InstrIndex) -> bool {
        self.states.get(&at).is_some_and(|s| !s.is_empty())
    }

    /// No feasible path reaches `at`. An instruction where the engine lost
    /// track of the state is neither reachable nor provably unreachable.
    pub fn is_unreachable(&self, at: InstrIndex) -> bool {
        !self.poisoned.contains(&at) && !self.is_reachable(at)
    }

    /// Facts about `path` at `at`, joined over every state reaching it.
    /// `None` if `at` was not reached or is poisoned.
    pub fn facts_at(&self, at: InstrIndex, path: &VarPath) -> Option<FactSet> {
        let states = self.states_at(at)?;
        let types = self.ctx.types();
        let value = self.ctx.values.find_path(path);
        states
            .iter()
            .map(|state| match value {
                Some(v) => state.facts_of(&self.ctx, v),
                None => self.declared_facts(path),
            })
            .reduce(|a, b| a.join(&b, types))
    }

    pub fn nullability_at(&self, at: InstrIndex, path: &VarPath) -> Option<Nullability> {
        self.facts_at(at, path).map(|facts| facts.nullability())
    }

    /// Whether some path reaching `at` has reason to believe `path` is null.
    pub fn may_be_null(&self, at: InstrIndex, path: &VarPath) -> Option<bool> {
        let states = self.states_at(at)?;
        if states.is_empty() {
            return None;
        }
        let value = self.ctx.values.find_path(path);
        Some(states.iter().any(|state| {
            let facts = match value {
                Some(v) => state.facts_of(&self.ctx, v),
                None => self.declared_facts(path),
            };
            facts.nullability().may_be_null()
        }))
    }

    /// Types `path` is known to be an instance of on every path reaching `at`.
    pub fn asserted_types(&self, at: InstrIndex, path: &VarPath) -> Option<Vec<TypeId>> {
        self.facts_at(at, path)
            .map(|facts| facts.instance_of().to_vec())
    }

    /// States at the exit instruction, i.e. of normal completion.
    pub fn exit_states(&self) -> &[MemoryState] {
        self.states
            .get(&self.ctx.program.exit())
            .map_or(&[][..], Vec::as_slice)
    }

    /// Joined facts of the returned value, the top of the stack on exit.
    /// `None` if the method never completes normally or returns no value.
    pub fn return_facts(&self) -> Option<FactSet> {
        let types = self.ctx.types();
        let mut joined: Option<FactSet> = None;
        for state in self.exit_states() {
            let facts = state.facts_of(&self.ctx, state.peek()?);
            joined = Some(match joined {
                Some(prev) => prev.join(&facts, types),
                None => facts,
            });
        }
        joined
    }

    pub fn uncaught_exceptions(&self) -> &[UncaughtException] {
        &self.uncaught
    }

    pub fn problems(&self) -> impl Iterator<Item = &Problem> {
        self.ctx.problems.iter()
    }

    /// Control-flow edges traversed by at least one state.
    pub fn edges(&self) -> &BTreeSet<(InstrIndex, InstrIndex)> {
        &self.edges
    }

    pub fn states_processed(&self) -> usize {
        self.processed
    }

    pub fn inconsistencies(&self) -> &[(InstrIndex, Inconsistency)] {
        &self.inconsistencies
    }

    fn declared_facts(&self, path: &VarPath) -> FactSet {
        let declared = path
            .components()
            .last()
            .and_then(|var| self.ctx.program.variable(*var));
        FactSet::with_declared(declared.map_or(Nullability::Unknown, |info| info.nullability))
    }
}
