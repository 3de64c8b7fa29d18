use std::collections::BTreeMap;

use nullflow_ir::InstrIndex;
use rustc_hash::FxHashSet;

use crate::MemoryState;

/// Pending `(instruction, state)` pairs, grouped by instruction.
///
/// Offering a pair that is already pending is a no-op. States are handed out
/// lowest instruction first, all co-arrivals at once, which is what lets the
/// merge strategies see every state reaching a join together.
#[derive(Debug, Default)]
pub struct StateQueue {
    pending: BTreeMap<InstrIndex, Vec<MemoryState>>,
    queued: FxHashSet<(InstrIndex, MemoryState)>,
}

impl StateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `state` at `at`. Returns `false` if the same pair is already
    /// pending.
    pub fn offer(&mut self, at: InstrIndex, state: MemoryState) -> bool {
        if !self.queued.insert((at, state.clone())) {
            return false;
        }
        self.pending.entry(at).or_default().push(state);
        true
    }

    /// Every state pending at the lowest queued instruction.
    pub fn take_next_group(&mut self) -> Option<(InstrIndex, Vec<MemoryState>)> {
        let (at, states) = self.pending.pop_first()?;
        for state in &states {
            self.queued.remove(&(at, state.clone()));
        }
        Some((at, states))
    }

    /// Number of pending pairs.
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
