use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Server-pushed incremental signal emitted while the assessment is analyzed.
///
/// `seq` is the event's identity; delivery is at-least-once, so the same
/// event may arrive more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationEvent {
    pub seq: u64,
    pub message: String,
    pub delta_count: u64,
}

/// Cumulative projection of calibration events.
///
/// Accumulation is keyed by event identity, so duplicated deliveries never
/// double-count and the cumulative count is monotonically non-decreasing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalibrationTally {
    cumulative: u64,
    applied: BTreeSet<u64>,
}

impl CalibrationTally {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges an event; returns false when its seq was already applied.
    pub fn apply(&mut self, event: &CalibrationEvent) -> bool {
        if !self.applied.insert(event.seq) {
            return false;
        }
        self.cumulative += event.delta_count;
        true
    }

    #[must_use]
    pub fn cumulative_count(&self) -> u64 {
        self.cumulative
    }

    /// Highest applied seq, used as the resume cursor for the push channel.
    #[must_use]
    pub fn last_seq(&self) -> Option<u64> {
        self.applied.iter().next_back().copied()
    }

    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}
