use smallvec::{SmallVec, smallvec};

use crate::{InstrIndex, Nullability, TypeId, VarId};

/// A variable access chain, root first: `[x]` is `x`, `[x, f]` is `x.f`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarPath(SmallVec<[VarId; 2]>);

impl VarPath {
    pub fn new(root: VarId) -> Self {
        VarPath(smallvec![root])
    }

    /// Extend the chain with a field access.
    pub fn field(mut self, field: VarId) -> Self {
        self.0.push(field);
        self
    }

    pub fn root(&self) -> VarId {
        self.0[0]
    }

    pub fn components(&self) -> &[VarId] {
        &self.0
    }
}

impl From<VarId> for VarPath {
    fn from(value: VarId) -> Self {
        VarPath::new(value)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// The value pushed by [`Instruction::Push`].
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Operand {
    Var(VarPath),
    Const(Constant),
    /// A freshly allocated object of exactly this type.
    New(TypeId),
    /// Some value about which only these facts are known.
    Unknown {
        ty: Option<TypeId>,
        nullability: Nullability,
    },
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// The comparison that holds exactly when `self` does not.
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
        }
    }

    /// The comparison with its operands swapped: `a < b` is `b > a`.
    pub fn flip(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
        }
    }
}

/// Condition tested by [`Instruction::Branch`].
///
/// `Cmp` pops two values (the right operand is on top), every other
/// condition pops one.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Condition {
    IsNull,
    NonNull,
    IsTrue,
    InstanceOf(TypeId),
    Cmp(CmpOp),
}

impl Condition {
    pub fn operands(self) -> usize {
        match self {
            Condition::Cmp(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CallResult {
    pub ty: Option<TypeId>,
    pub nullability: Nullability,
}

/// Effects of a call whose body is not analyzed.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, bon::Builder)]
pub struct CallSpec {
    /// Number of stack values consumed, receiver included.
    #[builder(default)]
    pub args: usize,
    /// Value pushed on normal completion, if any.
    pub result: Option<CallResult>,
    /// A pure call does not invalidate field facts.
    #[builder(default)]
    pub pure: bool,
    /// Exceptions the call may raise.
    #[builder(default)]
    pub throws: Vec<TypeId>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CatchClause<J = InstrIndex> {
    /// Declared types; more than one for a multi-type handler.
    pub types: SmallVec<[TypeId; 1]>,
    /// Variable bound to the caught value. A clause without one is dead.
    pub param: Option<VarId>,
    pub target: J,
}

/// An active protected region.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Trap<J = InstrIndex> {
    TryCatch { clauses: Vec<CatchClause<J>> },
    /// `cleanup` is the entry of the finally block, `resume` where normal
    /// completion continues once it has run.
    TryFinally { cleanup: J, resume: J },
    /// Marks execution inside a cleanup block.
    InsideFinally,
}

impl<J> Trap<J> {
    pub fn map_targets<K, E>(self, f: &mut impl FnMut(J) -> Result<K, E>) -> Result<Trap<K>, E> {
        Ok(match self {
            Trap::TryCatch { clauses } => Trap::TryCatch {
                clauses: clauses
                    .into_iter()
                    .map(|c| {
                        Ok(CatchClause {
                            types: c.types,
                            param: c.param,
                            target: f(c.target)?,
                        })
                    })
                    .collect::<Result<_, E>>()?,
            },
            Trap::TryFinally { cleanup, resume } => Trap::TryFinally {
                cleanup: f(cleanup)?,
                resume: f(resume)?,
            },
            Trap::InsideFinally => Trap::InsideFinally,
        })
    }
}

impl std::fmt::Display for Trap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trap::TryCatch { clauses } => {
                f.write_str("try_catch(")?;
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", clause.target)?;
                }
                f.write_str(")")
            }
            Trap::TryFinally { cleanup, resume } => {
                write!(f, "try_finally(cleanup={cleanup}, resume={resume})")
            }
            Trap::InsideFinally => f.write_str("inside_finally"),
        }
    }
}

/// One instruction of a lowered method body. `J` is the jump target type:
/// [`Label`](crate::Label) while building, [`InstrIndex`] once resolved.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Instruction<J = InstrIndex> {
    Push(Operand),
    Pop,
    Dup,
    /// Pop a value and assign it to a variable.
    Store(VarPath),
    Goto(J),
    /// Pop the condition operands; jump when the condition holds, fall
    /// through otherwise.
    Branch { cond: Condition, target: J },
    /// Pop a value that is about to be dereferenced. A null value raises
    /// `exception` if given, otherwise the path ends.
    Deref { exception: Option<TypeId> },
    /// Checked cast of the top of stack. Failure raises `exception` if given.
    Cast { ty: TypeId, exception: Option<TypeId> },
    Call(CallSpec),
    Box,
    Unbox,
    Throw,
    /// Leave the method, running every enclosing cleanup block. The return
    /// value, if any, stays on the stack.
    Return,
    /// Structured jump leaving protected regions until `depth` traps remain,
    /// flushing the variables that go out of scope.
    Jump {
        target: J,
        depth: usize,
        flush: Vec<VarPath>,
    },
    PushTrap(Trap<J>),
    PopTrap,
    /// Resume the transfer suspended when the current cleanup block was
    /// entered.
    EndFinally,
    Exit,
}

impl<J> Instruction<J> {
    /// Rewrite every jump target through `f`.
    pub fn map_targets<K, E>(
        self,
        f: &mut impl FnMut(J) -> Result<K, E>,
    ) -> Result<Instruction<K>, E> {
        Ok(match self {
            Instruction::Push(op) => Instruction::Push(op),
            Instruction::Pop => Instruction::Pop,
            Instruction::Dup => Instruction::Dup,
            Instruction::Store(path) => Instruction::Store(path),
            Instruction::Goto(target) => Instruction::Goto(f(target)?),
            Instruction::Branch { cond, target } => Instruction::Branch {
                cond,
                target: f(target)?,
            },
            Instruction::Deref { exception } => Instruction::Deref { exception },
            Instruction::Cast { ty, exception } => Instruction::Cast { ty, exception },
            Instruction::Call(spec) => Instruction::Call(spec),
            Instruction::Box => Instruction::Box,
            Instruction::Unbox => Instruction::Unbox,
            Instruction::Throw => Instruction::Throw,
            Instruction::Return => Instruction::Return,
            Instruction::Jump {
                target,
                depth,
                flush,
            } => Instruction::Jump {
                target: f(target)?,
                depth,
                flush,
            },
            Instruction::PushTrap(trap) => Instruction::PushTrap(trap.map_targets(f)?),
            Instruction::PopTrap => Instruction::PopTrap,
            Instruction::EndFinally => Instruction::EndFinally,
            Instruction::Exit => Instruction::Exit,
        })
    }
}

impl Instruction {
    /// Offsets this instruction can statically pass control to. Exceptional
    /// edges are not listed: they are resolved against the trap stack at
    /// analysis time.
    pub fn successors(&self, at: InstrIndex, exit: InstrIndex) -> SmallVec<[InstrIndex; 2]> {
        match self {
            Instruction::Push(_)
            | Instruction::Pop
            | Instruction::Dup
            | Instruction::Store(_)
            | Instruction::Deref { .. }
            | Instruction::Cast { .. }
            | Instruction::Call(_)
            | Instruction::Box
            | Instruction::Unbox
            | Instruction::PopTrap => smallvec![at.next()],
            Instruction::Goto(target) => smallvec![*target],
            Instruction::Branch { target, .. } => smallvec![at.next(), *target],
            Instruction::Jump { target, .. } => smallvec![*target],
            Instruction::Return => smallvec![exit],
            Instruction::PushTrap(trap) => {
                let mut out: SmallVec<[InstrIndex; 2]> = smallvec![at.next()];
                match trap {
                    Trap::TryCatch { clauses } => out.extend(clauses.iter().map(|c| c.target)),
                    Trap::TryFinally { cleanup, resume } => {
                        out.push(*cleanup);
                        out.push(*resume);
                    }
                    Trap::InsideFinally => {}
                }
                out
            }
            Instruction::Throw | Instruction::EndFinally | Instruction::Exit => SmallVec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Instruction::Exit)
    }
}

pub(crate) fn mnemonic(cond: Condition) -> String {
    match cond {
        Condition::IsNull => "if_null".into(),
        Condition::NonNull => "if_nonnull".into(),
        Condition::IsTrue => "if_true".into(),
        Condition::InstanceOf(_) => "if_instanceof".into(),
        Condition::Cmp(op) => format!("if_{}", op.mnemonic()),
    }
}
