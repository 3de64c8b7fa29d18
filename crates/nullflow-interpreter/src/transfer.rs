use log::{debug, trace};
use nullflow_ir::{InstrIndex, Trap};

use crate::{AnalysisContext, FactSet, Inconsistency, MemoryState, TrapStack, Value, ValueId};

/// Where a non-local transfer is headed.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum TransferTarget {
    /// Continue at `offset` once only `depth` traps remain, flushing the
    /// variables that go out of scope.
    Instruction {
        offset: InstrIndex,
        flush: Vec<ValueId>,
        depth: usize,
    },
    /// An in-flight exception; `thrown` is a type assertion.
    Exception { thrown: ValueId },
    /// Resume the transfer suspended when the current cleanup block began.
    ExitFinally,
}

impl std::fmt::Display for TransferTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferTarget::Instruction { offset, depth, .. } => {
                write!(f, "{offset} depth={depth}")
            }
            TransferTarget::Exception { thrown } => write!(f, "throw {thrown}"),
            TransferTarget::ExitFinally => f.write_str("exit_finally"),
        }
    }
}

/// A transfer suspended while a cleanup block runs, with the trap stack it
/// continues against.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ControlTransfer {
    pub target: TransferTarget,
    pub traps: TrapStack,
}

/// An exception that left the method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UncaughtException {
    /// Instruction that started the transfer.
    pub origin: InstrIndex,
    pub facts: FactSet,
    pub state: MemoryState,
}

/// Everything a transfer can reach.
#[derive(Debug, Default)]
pub struct TransferOutcome {
    pub successors: Vec<(InstrIndex, MemoryState)>,
    pub uncaught: Vec<(FactSet, MemoryState)>,
}

/// Resolve `target` against the trap stack of `state`.
pub fn resolve(
    ctx: &mut AnalysisContext<'_>,
    mut state: MemoryState,
    mut target: TransferTarget,
) -> Result<TransferOutcome, Inconsistency> {
    let mut out = TransferOutcome::default();

    if target == TransferTarget::ExitFinally {
        let suspended = state.pop().ok_or(Inconsistency::MissingSuspendedTransfer)?;
        let Some(Value::ControlTransfer(ct)) = ctx.value(suspended).cloned() else {
            return Err(Inconsistency::NotATransfer);
        };
        trace!("resuming suspended transfer to {}", ct.target);
        if ct.target == TransferTarget::ExitFinally {
            return Err(Inconsistency::NotATransfer);
        }
        state.set_traps(ct.traps);
        target = ct.target;
    }

    loop {
        if let TransferTarget::Instruction {
            offset,
            flush,
            depth,
        } = &target
        {
            if state.traps().len() <= *depth {
                for var in flush {
                    state.flush_variable(ctx, *var);
                }
                out.successors.push((*offset, state));
                return Ok(out);
            }
        }

        let traps = state.traps().clone();
        let Some((trap, rest)) = traps.pop() else {
            // Only exceptions reach the bottom: an instruction target with any
            // depth is delivered above.
            if let TransferTarget::Exception { thrown } = target {
                let facts = ctx.default_facts(thrown);
                debug!("uncaught exception: {}", facts.render(ctx.types()));
                out.uncaught.push((facts, state));
            }
            return Ok(out);
        };

        match trap {
            Trap::TryCatch { clauses } => {
                state.set_traps(rest.clone());
                let TransferTarget::Exception { thrown } = target else {
                    continue;
                };
                let types = ctx.types();
                let mut remaining = ctx.default_facts(thrown);
                let mut exhausted = false;
                for clause in clauses {
                    let Some(param) = clause.param else {
                        continue;
                    };
                    let mut matches: Vec<FactSet> = Vec::new();
                    for ty in &clause.types {
                        if let Some(caught) = remaining.with_instance_of(types, *ty) {
                            if !matches.contains(&caught) {
                                matches.push(caught);
                            }
                        }
                        match remaining.with_not_instance_of(types, *ty) {
                            Some(rest) => remaining = rest,
                            None => {
                                exhausted = true;
                                break;
                            }
                        }
                    }
                    for caught in matches {
                        let mut handler = state.clone();
                        let value = ctx.values.assertion(caught);
                        let var = ctx.values.variable(param);
                        if handler.assign(ctx, var, value) {
                            trace!("caught at {}", clause.target);
                            out.successors.push((clause.target, handler));
                        }
                    }
                    if exhausted {
                        return Ok(out);
                    }
                }
                target = TransferTarget::Exception {
                    thrown: ctx.values.assertion(remaining),
                };
            }
            Trap::TryFinally { cleanup, .. } => {
                let suspended = ctx.values.transfer(ControlTransfer {
                    target,
                    traps: rest.clone(),
                });
                state.push(suspended);
                state.set_traps(rest);
                out.successors.push((*cleanup, state));
                return Ok(out);
            }
            Trap::InsideFinally => {
                // Leaving a cleanup block abandons the transfer it was running
                // for: the last transfer wins.
                state.set_traps(rest);
                state
                    .take_topmost(|v| matches!(ctx.value(v), Some(Value::ControlTransfer(_))))
                    .ok_or(Inconsistency::MissingSuspendedTransfer)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nullflow_ir::{CatchClause, Nullability, Program, ProgramBuilder, TypeTable, smallvec};

    use super::*;

    fn program() -> Program {
        let mut types = TypeTable::new();
        let object = types.class("Object", &[]);
        let exception = types.class("Exception", &[object]);
        types.class("IOException", &[exception]);
        types.class("RuntimeException", &[exception]);
        let mut b = ProgramBuilder::new(types);
        b.local("e");
        b.ret();
        b.finish().unwrap()
    }

    fn thrown(ctx: &mut AnalysisContext<'_>, ty: &str) -> TransferTarget {
        let ty = ctx.types().by_name(ty).unwrap();
        let facts = FactSet::with_declared(Nullability::NotNull)
            .with_instance_of(ctx.types(), ty)
            .unwrap();
        TransferTarget::Exception {
            thrown: ctx.values.assertion(facts),
        }
    }

    fn handlers(program: &Program) -> Trap {
        let types = program.types();
        let e = program.variable_named("e");
        Trap::TryCatch {
            clauses: vec![
                CatchClause {
                    types: smallvec![types.by_name("IOException").unwrap()],
                    param: e,
                    target: InstrIndex::new(5),
                },
                CatchClause {
                    types: smallvec![types.by_name("Exception").unwrap()],
                    param: e,
                    target: InstrIndex::new(7),
                },
            ],
        }
    }

    #[test]
    fn an_exact_match_stops_the_clause_search() {
        let program = program();
        let mut ctx = AnalysisContext::new(&program);
        let mut state = MemoryState::new();
        state.push_trap(handlers(&program));

        let target = thrown(&mut ctx, "IOException");
        let out = resolve(&mut ctx, state, target).unwrap();
        assert_eq!(out.successors.len(), 1);
        assert_eq!(out.successors[0].0, InstrIndex::new(5));
        assert!(out.successors[0].1.traps().is_empty());
        assert!(out.uncaught.is_empty());
    }

    #[test]
    fn unmatched_remainders_leave_the_method() {
        let program = program();
        let mut ctx = AnalysisContext::new(&program);
        let io = program.types().by_name("IOException").unwrap();
        let mut state = MemoryState::new();
        state.push_trap(Trap::TryCatch {
            clauses: vec![CatchClause {
                types: smallvec![io],
                param: program.variable_named("e"),
                target: InstrIndex::new(5),
            }],
        });

        let target = thrown(&mut ctx, "Exception");
        let out = resolve(&mut ctx, state, target).unwrap();
        assert_eq!(out.successors.len(), 1);
        assert_eq!(out.uncaught.len(), 1);
        assert_eq!(out.uncaught[0].0.not_instance_of(), &[io]);
    }

    #[test]
    fn a_multi_type_clause_matches_each_type_once() {
        let program = program();
        let mut ctx = AnalysisContext::new(&program);
        let types = program.types();
        let io = types.by_name("IOException").unwrap();
        let runtime = types.by_name("RuntimeException").unwrap();
        let mut state = MemoryState::new();
        state.push_trap(Trap::TryCatch {
            clauses: vec![CatchClause {
                types: smallvec![io, runtime],
                param: program.variable_named("e"),
                target: InstrIndex::new(5),
            }],
        });

        let target = thrown(&mut ctx, "Exception");
        let out = resolve(&mut ctx, state, target).unwrap();
        let targets: Vec<InstrIndex> = out.successors.iter().map(|(at, _)| *at).collect();
        assert_eq!(targets, vec![InstrIndex::new(5), InstrIndex::new(5)]);
        let [(remaining, _)] = out.uncaught.as_slice() else {
            panic!("expected one uncaught remainder");
        };
        let mut excluded = vec![io, runtime];
        excluded.sort();
        assert_eq!(remaining.not_instance_of(), excluded.as_slice());
    }

    #[test]
    fn clauses_without_a_parameter_never_catch() {
        let program = program();
        let mut ctx = AnalysisContext::new(&program);
        let types = program.types();
        let mut state = MemoryState::new();
        state.push_trap(Trap::TryCatch {
            clauses: vec![
                CatchClause {
                    types: smallvec![types.by_name("Exception").unwrap()],
                    param: None,
                    target: InstrIndex::new(5),
                },
                CatchClause {
                    types: smallvec![types.by_name("IOException").unwrap()],
                    param: program.variable_named("e"),
                    target: InstrIndex::new(7),
                },
            ],
        });

        let target = thrown(&mut ctx, "IOException");
        let out = resolve(&mut ctx, state, target).unwrap();
        let targets: Vec<InstrIndex> = out.successors.iter().map(|(at, _)| *at).collect();
        assert_eq!(targets, vec![InstrIndex::new(7)]);
        assert!(out.uncaught.is_empty());
    }

    #[test]
    fn a_finally_region_suspends_and_resumes_the_transfer() {
        let program = program();
        let mut ctx = AnalysisContext::new(&program);
        let mut state = MemoryState::new();
        state.push_trap(Trap::TryFinally {
            cleanup: InstrIndex::new(3),
            resume: InstrIndex::new(4),
        });

        let leave = TransferTarget::Instruction {
            offset: InstrIndex::new(4),
            flush: Vec::new(),
            depth: 0,
        };
        let mut out = resolve(&mut ctx, state, leave).unwrap();
        let (at, cleanup) = out.successors.pop().unwrap();
        assert_eq!(at, InstrIndex::new(3));
        assert!(cleanup.traps().is_empty());
        let suspended = cleanup.peek().unwrap();
        assert!(matches!(ctx.value(suspended), Some(Value::ControlTransfer(_))));

        let mut out = resolve(&mut ctx, cleanup, TransferTarget::ExitFinally).unwrap();
        let (at, resumed) = out.successors.pop().unwrap();
        assert_eq!(at, InstrIndex::new(4));
        assert!(resumed.stack().is_empty());
    }

    #[test]
    fn exiting_a_finally_needs_a_suspended_transfer() {
        let program = program();
        let mut ctx = AnalysisContext::new(&program);
        let err = resolve(&mut ctx, MemoryState::new(), TransferTarget::ExitFinally).unwrap_err();
        assert_eq!(err, Inconsistency::MissingSuspendedTransfer);
    }
}
