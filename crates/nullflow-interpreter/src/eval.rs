use log::trace;
use nullflow_ir::{
    CmpOp, Condition, Constant, InstrIndex, Instruction, IntRange, Nullability, Operand, TypeId,
    TypeTable,
};

use crate::{
    AnalysisContext, Continuation, FactSet, Inconsistency, MemoryState, Problem, TransferTarget,
    Value, ValueId,
};

/// Abstract semantics of one instruction.
///
/// `interpret` consumes the incoming state; every outgoing state is a private
/// copy. An infeasible outcome is [`Continuation::Stop`], never an error.
pub trait Interpretable {
    fn interpret(
        &self,
        at: InstrIndex,
        state: MemoryState,
        ctx: &mut AnalysisContext<'_>,
    ) -> Result<Continuation, Inconsistency>;
}

fn pop(state: &mut MemoryState) -> Result<ValueId, Inconsistency> {
    state.pop().ok_or(Inconsistency::StackUnderflow)
}

fn next_or_stop(state: Option<MemoryState>) -> Continuation {
    state.map_or(Continuation::Stop, Continuation::Next)
}

/// Facts of a value produced outside the method. A type is only recorded for
/// values known to be non-null, since instance facts imply non-nullness.
fn produced_facts(types: &TypeTable, ty: Option<TypeId>, nullability: Nullability) -> FactSet {
    let base = FactSet::with_declared(nullability);
    match ty {
        Some(ty) if nullability == Nullability::NotNull => {
            base.with_instance_of(types, ty).unwrap_or(base)
        }
        _ => base,
    }
}

fn exception_value(ctx: &mut AnalysisContext<'_>, ty: TypeId) -> ValueId {
    let facts = produced_facts(ctx.types(), Some(ty), Nullability::NotNull);
    ctx.values.assertion(facts)
}

fn throw(ctx: &mut AnalysisContext<'_>, state: MemoryState, exception: Option<TypeId>) -> Continuation {
    match exception {
        Some(ty) => {
            let thrown = exception_value(ctx, ty);
            Continuation::Transfer(state, TransferTarget::Exception { thrown })
        }
        None => Continuation::Stop,
    }
}

fn operand_value(ctx: &mut AnalysisContext<'_>, at: InstrIndex, operand: &Operand) -> ValueId {
    match operand {
        Operand::Var(path) => ctx.values.path(path),
        Operand::Const(constant) => ctx.values.constant(constant.clone()),
        Operand::New(ty) => {
            let facts = produced_facts(ctx.types(), Some(*ty), Nullability::NotNull);
            ctx.values.produced(at, facts)
        }
        Operand::Unknown { ty, nullability } => {
            let facts = produced_facts(ctx.types(), *ty, *nullability);
            ctx.values.produced(at, facts)
        }
    }
}

/// The state in which `l op r` holds, if any.
fn compare(
    ctx: &mut AnalysisContext<'_>,
    state: MemoryState,
    op: CmpOp,
    l: ValueId,
    r: ValueId,
) -> Option<MemoryState> {
    let lr = state.facts_of(ctx, l).range().unwrap_or_else(IntRange::full);
    let rr = state.facts_of(ctx, r).range().unwrap_or_else(IntRange::full);
    let narrowed_l = lr.refine(op, &rr);
    let narrowed_r = rr.refine(op.flip(), &lr);
    if narrowed_l.is_empty() || narrowed_r.is_empty() {
        return None;
    }
    let mut state = state
        .with_range(ctx, l, narrowed_l)?
        .with_range(ctx, r, narrowed_r)?;
    match op {
        CmpOp::Eq => state.unite_values(ctx, l, r).then_some(state),
        CmpOp::Ne => state.assert_distinct(ctx, l, r).then_some(state),
        _ => Some(state),
    }
}

/// States where the branch is taken and where it falls through.
fn branch(
    ctx: &mut AnalysisContext<'_>,
    mut state: MemoryState,
    cond: Condition,
) -> Result<(Option<MemoryState>, Option<MemoryState>), Inconsistency> {
    Ok(match cond {
        Condition::IsNull | Condition::NonNull => {
            let v = pop(&mut state)?;
            let null = state.clone().with_nullability(ctx, v, Nullability::Null);
            let not_null = state.with_nullability(ctx, v, Nullability::NotNull);
            if cond == Condition::IsNull {
                (null, not_null)
            } else {
                (not_null, null)
            }
        }
        Condition::IsTrue => {
            let v = pop(&mut state)?;
            let yes = ctx.values.constant(Constant::Bool(true));
            let no = ctx.values.constant(Constant::Bool(false));
            let mut taken = state.clone();
            let taken = taken.unite_values(ctx, v, yes).then_some(taken);
            let fallthrough = state.unite_values(ctx, v, no).then_some(state);
            (taken, fallthrough)
        }
        Condition::InstanceOf(ty) => {
            let v = pop(&mut state)?;
            (
                state.clone().with_instanceof_fact(ctx, v, ty),
                state.with_not_instanceof_fact(ctx, v, ty),
            )
        }
        Condition::Cmp(op) => {
            let r = pop(&mut state)?;
            let l = pop(&mut state)?;
            (
                compare(ctx, state.clone(), op, l, r),
                compare(ctx, state, op.negate(), l, r),
            )
        }
    })
}

/// Dereference of `v`: reports a possible null dereference and splits off
/// the path on which it fails.
fn dereference(
    ctx: &mut AnalysisContext<'_>,
    at: InstrIndex,
    state: MemoryState,
    v: ValueId,
    exception: Option<TypeId>,
    after: impl FnOnce(MemoryState) -> MemoryState,
) -> Continuation {
    match state.nullability_of(ctx, v) {
        Nullability::Null => {
            ctx.report(Problem::NullDereference { at, definite: true });
            throw(ctx, state, exception)
        }
        Nullability::Nullable => {
            ctx.report(Problem::NullDereference {
                at,
                definite: false,
            });
            let failing = match state.clone().with_nullability(ctx, v, Nullability::Null) {
                Some(s) => throw(ctx, s, exception),
                None => Continuation::Stop,
            };
            let passing = match state.with_nullability(ctx, v, Nullability::NotNull) {
                Some(s) => Continuation::Next(after(s)),
                None => Continuation::Stop,
            };
            Continuation::fork(vec![passing, failing])
        }
        _ => match state.with_nullability(ctx, v, Nullability::NotNull) {
            Some(s) => Continuation::Next(after(s)),
            None => Continuation::Stop,
        },
    }
}

impl Interpretable for Instruction {
    fn interpret(
        &self,
        at: InstrIndex,
        mut state: MemoryState,
        ctx: &mut AnalysisContext<'_>,
    ) -> Result<Continuation, Inconsistency> {
        trace!("{at}: {}", ctx.program.render(at));
        Ok(match self {
            Instruction::Push(operand) => {
                let v = operand_value(ctx, at, operand);
                state.push(v);
                Continuation::Next(state)
            }
            Instruction::Pop => {
                pop(&mut state)?;
                Continuation::Next(state)
            }
            Instruction::Dup => {
                let v = state.peek().ok_or(Inconsistency::StackUnderflow)?;
                state.push(v);
                Continuation::Next(state)
            }
            Instruction::Store(path) => {
                let v = pop(&mut state)?;
                let var = ctx.values.path(path);
                if state.assign(ctx, var, v) {
                    Continuation::Next(state)
                } else {
                    Continuation::Stop
                }
            }
            Instruction::Goto(target) => Continuation::Jump(*target, state),
            Instruction::Branch { cond, target } => {
                let (taken, fallthrough) = branch(ctx, state, *cond)?;
                Continuation::fork(vec![
                    taken.map_or(Continuation::Stop, |s| Continuation::Jump(*target, s)),
                    next_or_stop(fallthrough),
                ])
            }
            Instruction::Deref { exception } => {
                let v = pop(&mut state)?;
                dereference(ctx, at, state, v, *exception, |s| s)
            }
            Instruction::Cast { ty, exception } => {
                let v = state.peek().ok_or(Inconsistency::StackUnderflow)?;
                let facts = state.facts_of(ctx, v);
                let succeeding = match facts.nullability() {
                    Nullability::Null => Some(state.clone()),
                    Nullability::NotNull => state.clone().with_instanceof_fact(ctx, v, *ty),
                    // Either null or an instance; only a value that cannot be
                    // an instance is narrowed, to null.
                    _ if facts.with_instance_of(ctx.types(), *ty).is_some() => Some(state.clone()),
                    _ => state.clone().with_nullability(ctx, v, Nullability::Null),
                };
                let failing = state
                    .with_not_instanceof_fact(ctx, v, *ty)
                    .and_then(|s| s.with_nullability(ctx, v, Nullability::NotNull));
                let failing = match failing {
                    Some(mut s) => {
                        s.pop();
                        throw(ctx, s, *exception)
                    }
                    None => Continuation::Stop,
                };
                Continuation::fork(vec![next_or_stop(succeeding), failing])
            }
            Instruction::Call(spec) => {
                for _ in 0..spec.args {
                    pop(&mut state)?;
                }
                if !spec.pure {
                    state.flush_fields(ctx);
                }
                let mut outcomes = Vec::with_capacity(spec.throws.len() + 1);
                outcomes.push(Continuation::Stop);
                for ty in &spec.throws {
                    let thrown = exception_value(ctx, *ty);
                    outcomes.push(Continuation::Transfer(
                        state.clone(),
                        TransferTarget::Exception { thrown },
                    ));
                }
                if let Some(result) = &spec.result {
                    let facts = produced_facts(ctx.types(), result.ty, result.nullability);
                    let v = ctx.values.produced(at, facts);
                    state.push(v);
                }
                outcomes[0] = Continuation::Next(state);
                Continuation::fork(outcomes)
            }
            Instruction::Box => {
                let v = pop(&mut state)?;
                let boxed = if ctx.is_variable(v) {
                    ctx.values.boxed(v)
                } else {
                    ctx.values
                        .produced(at, FactSet::with_declared(Nullability::NotNull))
                };
                state.push(boxed);
                Continuation::Next(state)
            }
            Instruction::Unbox => {
                let v = pop(&mut state)?;
                if let Some(Value::Boxed(inner)) = ctx.value(v) {
                    let inner = *inner;
                    state.push(inner);
                    return Ok(Continuation::Next(state));
                }
                let unboxed = ctx
                    .values
                    .produced(at, FactSet::with_declared(Nullability::NotNull));
                dereference(ctx, at, state, v, None, move |mut s| {
                    s.push(unboxed);
                    s
                })
            }
            Instruction::Throw => {
                let v = pop(&mut state)?;
                let Some(state) = state.with_nullability(ctx, v, Nullability::NotNull) else {
                    ctx.report(Problem::NullDereference { at, definite: true });
                    return Ok(Continuation::Stop);
                };
                let facts = state.facts_of(ctx, v);
                let thrown = ctx.values.assertion(facts);
                Continuation::Transfer(state, TransferTarget::Exception { thrown })
            }
            Instruction::Return => Continuation::Transfer(
                state,
                TransferTarget::Instruction {
                    offset: ctx.program.exit(),
                    flush: Vec::new(),
                    depth: 0,
                },
            ),
            Instruction::Jump {
                target,
                depth,
                flush,
            } => {
                let flush = flush.iter().map(|p| ctx.values.path(p)).collect();
                Continuation::Transfer(
                    state,
                    TransferTarget::Instruction {
                        offset: *target,
                        flush,
                        depth: *depth,
                    },
                )
            }
            Instruction::PushTrap(trap) => {
                state.push_trap(trap.clone());
                Continuation::Next(state)
            }
            Instruction::PopTrap => {
                if !state.pop_trap() {
                    return Err(Inconsistency::TrapUnderflow);
                }
                Continuation::Next(state)
            }
            Instruction::EndFinally => Continuation::Transfer(state, TransferTarget::ExitFinally),
            Instruction::Exit => Continuation::Halt,
        })
    }
}
