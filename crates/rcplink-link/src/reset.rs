//! RCP restart recovery.

/// What happens to pending-but-unsent outbound frames when an RCP restart is
/// observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Keep queued frames; they are retried against the refreshed link.
    #[default]
    PreserveQueued,
    /// Discard queued frames along with all in-flight state.
    DiscardQueued,
}

/// Monotonic marker distinguishing link state before and after a reset.
///
/// Any frame state associated with a prior epoch is discarded rather than
/// delivered or retransmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ResetEpoch(u64);

impl ResetEpoch {
    pub fn value(self) -> u64 {
        self.0
    }

    pub(crate) fn advance(&mut self) {
        self.0 += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_advances_monotonically() {
        let mut epoch = ResetEpoch::default();
        let before = epoch;
        epoch.advance();
        assert!(epoch > before);
        assert_eq!(epoch.value(), 1);
    }

    #[test]
    fn default_policy_preserves_queued_frames() {
        assert_eq!(ResetPolicy::default(), ResetPolicy::PreserveQueued);
    }
}
