use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, trace, warn};
use nullflow_ir::{InstrIndex, IntRange, Nullability, Program, TypeId, VarPath};
use rustc_hash::FxHashMap;

use crate::merge::merge_states;
use crate::{
    AnalysisContext, AnalysisError, Continuation, Inconsistency, Interpretable, MemoryState,
    MergePolicy, RunResult, StateQueue, UncaughtException, transfer,
};

/// Cooperative cancellation shared between a run and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every run holding a clone of this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A hypothesis about the method's inputs, used to seed the entry state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assumption {
    Nullability(VarPath, Nullability),
    InstanceOf(VarPath, TypeId),
    NotInstanceOf(VarPath, TypeId),
    Equal(VarPath, VarPath),
    Distinct(VarPath, VarPath),
    Range(VarPath, IntRange),
}

/// Worklist explorer over the abstract states of one method.
///
/// Every `(instruction, state)` pair reachable from the entry is interpreted
/// once, modulo subsumption: a state already covered by one recorded at the
/// same instruction adds nothing and is skipped. States co-arriving at a join
/// instruction are merged first, as the [`MergePolicy`] allows.
///
/// ```ignore
/// let result = DataflowInterpreter::new(&program)
///     .with_max_states(10_000)
///     .with_merge_policy(MergePolicy::Delayed(2))
///     .run()?;
/// ```
pub struct DataflowInterpreter<'ir> {
    ctx: AnalysisContext<'ir>,
    max_states: usize,
    join_limit: usize,
    merge_policy: MergePolicy,
    cancellation: Option<CancellationToken>,
    cancel_check_interval: usize,
}

// -- Constructors -----------------------------------------------------------

impl<'ir> DataflowInterpreter<'ir> {
    pub fn new(program: &'ir Program) -> Self {
        Self {
            ctx: AnalysisContext::new(program),
            max_states: 100_000,
            join_limit: 8,
            merge_policy: MergePolicy::AllJoins,
            cancellation: None,
            cancel_check_interval: 64,
        }
    }

    pub fn context(&self) -> &AnalysisContext<'ir> {
        &self.ctx
    }
}

// -- Builder methods --------------------------------------------------------

impl<'ir> DataflowInterpreter<'ir> {
    /// Abort with [`AnalysisError::TooComplex`] once more than `max` states
    /// have been processed.
    pub fn with_max_states(mut self, max: usize) -> Self {
        self.max_states = max;
        self
    }

    /// Largest number of states kept per stack shape at a join before pairs
    /// are joined outright.
    pub fn with_join_limit(mut self, limit: usize) -> Self {
        self.join_limit = limit;
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Poll the cancellation token every `interval` processed states.
    pub fn with_cancel_check_interval(mut self, interval: usize) -> Self {
        self.cancel_check_interval = interval;
        self
    }
}

// -- Seeding ----------------------------------------------------------------

impl<'ir> DataflowInterpreter<'ir> {
    /// An entry state satisfying every assumption, or `None` if they
    /// contradict each other.
    pub fn seed(&mut self, assumptions: &[Assumption]) -> Option<MemoryState> {
        let ctx = &mut self.ctx;
        let mut state = MemoryState::new();
        for assumption in assumptions {
            state = match assumption {
                Assumption::Nullability(path, n) => {
                    let v = ctx.values.path(path);
                    state.with_nullability(ctx, v, *n)?
                }
                Assumption::InstanceOf(path, ty) => {
                    let v = ctx.values.path(path);
                    state.with_instanceof_fact(ctx, v, *ty)?
                }
                Assumption::NotInstanceOf(path, ty) => {
                    let v = ctx.values.path(path);
                    state.with_not_instanceof_fact(ctx, v, *ty)?
                }
                Assumption::Range(path, range) => {
                    let v = ctx.values.path(path);
                    state.with_range(ctx, v, *range)?
                }
                Assumption::Equal(a, b) => {
                    let (a, b) = (ctx.values.path(a), ctx.values.path(b));
                    if !state.unite_values(ctx, a, b) {
                        return None;
                    }
                    state
                }
                Assumption::Distinct(a, b) => {
                    let (a, b) = (ctx.values.path(a), ctx.values.path(b));
                    if !state.assert_distinct(ctx, a, b) {
                        return None;
                    }
                    state
                }
            };
        }
        Some(state)
    }
}

// -- Execution engine -------------------------------------------------------

/// Bookkeeping of one run besides the interned values.
#[derive(Default)]
struct Exploration {
    queue: StateQueue,
    visited: BTreeMap<InstrIndex, Vec<MemoryState>>,
    visits: FxHashMap<InstrIndex, usize>,
    uncaught: Vec<UncaughtException>,
    edges: BTreeSet<(InstrIndex, InstrIndex)>,
    processed: usize,
    inconsistencies: Vec<(InstrIndex, Inconsistency)>,
}

impl Exploration {
    fn offer(&mut self, from: InstrIndex, to: InstrIndex, state: MemoryState) {
        self.edges.insert((from, to));
        self.queue.offer(to, state);
    }

    fn poison(&mut self, at: InstrIndex, inconsistency: Inconsistency) {
        error!("{at}: {inconsistency}; dropping the path");
        self.inconsistencies.push((at, inconsistency));
    }

    fn follow(&mut self, ctx: &mut AnalysisContext<'_>, at: InstrIndex, next: Continuation) {
        match next {
            Continuation::Next(state) => self.offer(at, at.next(), state),
            Continuation::Jump(target, state) => self.offer(at, target, state),
            Continuation::Fork(outcomes) => {
                for outcome in outcomes {
                    self.follow(ctx, at, outcome);
                }
            }
            Continuation::Transfer(state, target) => {
                match transfer::resolve(ctx, state, target) {
                    Ok(outcome) => {
                        for (to, state) in outcome.successors {
                            self.offer(at, to, state);
                        }
                        for (facts, state) in outcome.uncaught {
                            let exception = UncaughtException {
                                origin: at,
                                facts,
                                state,
                            };
                            if !self.uncaught.contains(&exception) {
                                self.uncaught.push(exception);
                            }
                        }
                    }
                    Err(inconsistency) => self.poison(at, inconsistency),
                }
            }
            Continuation::Halt | Continuation::Stop => {}
        }
    }
}

impl<'ir> DataflowInterpreter<'ir> {
    /// Explore from the first instruction with an empty state.
    pub fn run(self) -> Result<RunResult<'ir>, AnalysisError> {
        self.run_from(InstrIndex::new(0), MemoryState::new())
    }

    /// Explore from `entry` with `state`, typically one built by
    /// [`seed`](Self::seed).
    pub fn run_from(
        mut self,
        entry: InstrIndex,
        state: MemoryState,
    ) -> Result<RunResult<'ir>, AnalysisError> {
        let program = self.ctx.program;
        if program.instruction(entry).is_none() {
            return Err(AnalysisError::InvalidEntry(entry));
        }
        debug!(
            "exploring {} instructions from {entry}, budget {}",
            program.len(),
            self.max_states
        );

        let interval = self.cancel_check_interval.max(1);
        let mut run = Exploration::default();
        run.queue.offer(entry, state);

        while let Some((at, mut group)) = run.queue.take_next_group() {
            let Some(instruction) = program.instruction(at) else {
                warn!("{at} is past the end of the program");
                continue;
            };
            if program.is_join(at) {
                let count = run.visits.entry(at).or_default();
                *count += 1;
                if self.merge_policy.should_merge(*count) {
                    group = merge_states(&self.ctx, group, self.join_limit);
                }
            }

            for state in group {
                if run.processed % interval == 0
                    && self.cancellation.as_ref().is_some_and(|t| t.is_cancelled())
                {
                    debug!("cancelled after {} states", run.processed);
                    return Err(AnalysisError::Cancelled);
                }
                run.processed += 1;
                if run.processed > self.max_states {
                    return Err(AnalysisError::TooComplex {
                        processed: run.processed,
                        budget: self.max_states,
                    });
                }

                let seen = run.visited.entry(at).or_default();
                if seen.iter().any(|s| s.is_superstate_of(&self.ctx, &state)) {
                    continue;
                }
                seen.retain(|s| !state.is_superstate_of(&self.ctx, s));
                seen.push(state.clone());
                trace!("{at}: {}", state.render(&self.ctx));

                match instruction.interpret(at, state, &mut self.ctx) {
                    Ok(next) => run.follow(&mut self.ctx, at, next),
                    Err(inconsistency) => run.poison(at, inconsistency),
                }
            }
        }

        debug!(
            "explored {} states, {} problems",
            run.processed,
            self.ctx.problems.len()
        );
        Ok(RunResult::new(
            self.ctx,
            run.visited,
            run.uncaught,
            run.edges,
            run.processed,
            run.inconsistencies,
        ))
    }
}
