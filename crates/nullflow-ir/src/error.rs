use crate::{InstrIndex, Label};

/// Error returned when an instruction stream cannot form a [`Program`](crate::Program).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// The program has no instructions.
    #[error("program has no instructions")]
    EmptyProgram,
    /// A label was referenced but never bound to a position.
    #[error("label {0} is never bound")]
    UnboundLabel(Label),
    /// A label was bound twice.
    #[error("label {0} is already bound to {1}")]
    LabelRebound(Label, InstrIndex),
    /// A jump target lies outside the instruction stream.
    #[error("instruction {at} targets {target}, past the end of the program ({len} instructions)")]
    TargetOutOfRange {
        at: InstrIndex,
        target: InstrIndex,
        len: usize,
    },
    /// No `exit` instruction.
    #[error("program has no exit instruction")]
    MissingExit,
    /// More than one `exit` instruction.
    #[error("program has more than one exit instruction: {0} and {1}")]
    MultipleExits(InstrIndex, InstrIndex),
}
