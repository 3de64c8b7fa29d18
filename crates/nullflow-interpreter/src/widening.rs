/// When co-arriving states at a join instruction are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Merge at every visit of a join instruction.
    #[default]
    AllJoins,
    /// Deduplicate only. Every distinct path state is kept.
    Never,
    /// Keep states apart for the first `n` visits of each join instruction,
    /// then merge.
    Delayed(usize),
}

impl MergePolicy {
    /// `visit_count` is the number of times the join instruction has been
    /// dequeued, this visit included.
    pub fn should_merge(&self, visit_count: usize) -> bool {
        match self {
            Self::AllJoins => true,
            Self::Never => false,
            Self::Delayed(n) => visit_count > *n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delayed_merging_starts_after_n_visits() {
        let policy = MergePolicy::Delayed(2);
        assert!(!policy.should_merge(1));
        assert!(!policy.should_merge(2));
        assert!(policy.should_merge(3));
        assert!(MergePolicy::default().should_merge(1));
        assert!(!MergePolicy::Never.should_merge(100));
    }
}
