mod class;
mod control;
mod error;
mod eval;
mod facts;
mod interpreter;
mod merge;
mod queue;
mod result;
mod state;
mod trap;
pub mod transfer;
mod value;
mod widening;

pub use class::EqClass;
pub use control::Continuation;
pub use error::{AnalysisError, Inconsistency};
pub use eval::Interpretable;
pub use facts::FactSet;
pub use interpreter::{Assumption, CancellationToken, DataflowInterpreter};
pub use merge::merge_states;
pub use queue::StateQueue;
pub use result::{Problem, RunResult};
pub use state::MemoryState;
pub use trap::TrapStack;
pub use transfer::{ControlTransfer, TransferOutcome, TransferTarget, UncaughtException};
pub use value::{AnalysisContext, Origin, Value, ValueId, ValueStore};
pub use widening::MergePolicy;

pub use ::smallvec::{self, SmallVec};
