mod builder;
mod error;
mod id;
mod instruction;
mod intern;
mod lattice;
mod nullability;
mod program;
mod range;
mod types;

pub use builder::{ProgramBuilder, catch};
pub use error::BuildError;
pub use id::{InstrIndex, InternKey, Label, TypeId, VarId};
pub use instruction::{
    CallResult, CallSpec, CatchClause, CmpOp, Condition, Constant, Instruction, Operand, Trap,
    VarPath,
};
pub use intern::InternTable;
pub use lattice::{HasBottom, HasTop, Lattice};
pub use nullability::Nullability;
pub use program::{Program, VarKind, VariableInfo};
pub use range::{Bound, IntRange};
pub use types::{TypeInfo, TypeKind, TypeTable};

pub use ::smallvec::{self, SmallVec, smallvec};
