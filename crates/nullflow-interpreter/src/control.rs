use nullflow_ir::InstrIndex;

use crate::{MemoryState, TransferTarget};

/// What happens after one instruction has been interpreted on one state.
#[derive(Debug)]
pub enum Continuation {
    /// Fall through to the next instruction.
    Next(MemoryState),
    /// Continue at a target instruction without touching the trap stack.
    Jump(InstrIndex, MemoryState),
    /// Several outcomes, e.g. both sides of an undecided branch.
    Fork(Vec<Continuation>),
    /// A non-local transfer, resolved against the state's trap stack.
    Transfer(MemoryState, TransferTarget),
    /// The exit instruction was reached.
    Halt,
    /// The path ends here.
    Stop,
}

impl Continuation {
    /// Fork over the feasible outcomes; a single one is returned as is.
    pub fn fork(mut outcomes: Vec<Continuation>) -> Self {
        outcomes.retain(|c| !matches!(c, Continuation::Stop));
        match outcomes.len() {
            0 => Continuation::Stop,
            1 => outcomes.pop().unwrap_or(Continuation::Stop),
            _ => Continuation::Fork(outcomes),
        }
    }
}
