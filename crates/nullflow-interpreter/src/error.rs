use nullflow_ir::InstrIndex;

/// Why a run produced no [`RunResult`](crate::RunResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// More states were processed than the configured budget allows.
    #[error("analysis too complex: {processed} states processed, budget is {budget}")]
    TooComplex { processed: usize, budget: usize },
    /// The cancellation token was triggered.
    #[error("analysis cancelled")]
    Cancelled,
    /// The requested entry is not an instruction of the program.
    #[error("entry {0} is not an instruction of the program")]
    InvalidEntry(InstrIndex),
}

/// A state the engine cannot interpret, which indicates a malformed
/// instruction stream rather than an infeasible path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, thiserror::Error)]
pub enum Inconsistency {
    #[error("evaluation stack underflow")]
    StackUnderflow,
    #[error("no protected region to leave")]
    TrapUnderflow,
    #[error("no suspended transfer to resume")]
    MissingSuspendedTransfer,
    #[error("value resumed by end_finally is not a suspended transfer")]
    NotATransfer,
}
