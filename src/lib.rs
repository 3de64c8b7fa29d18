//! Null-flow analysis of lowered methods.
//!
//! [`ir`] holds the instruction stream, its builder and the type hierarchy;
//! [`interpreter`] explores the abstract states of one method and answers
//! queries about the run.

pub use nullflow_ir as ir;

#[cfg(feature = "interpret")]
pub use nullflow_interpreter as interpreter;

pub mod prelude {
    pub use nullflow_ir::*;

    #[cfg(feature = "interpret")]
    pub use nullflow_interpreter::{
        AnalysisError, Assumption, CancellationToken, DataflowInterpreter, FactSet, MergePolicy,
        Problem, RunResult,
    };
}
