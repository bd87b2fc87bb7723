use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("progress {current}/{total} is out of bounds")]
pub struct ProgressError {
    pub current: u32,
    pub total: u32,
}

/// How far the user is through the question set.
///
/// `completed` is derived from the stage, not from the counters: it is true
/// exactly while the session is awaiting its report or complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    current: u32,
    total: u32,
    completed: bool,
}

impl Progress {
    /// # Errors
    ///
    /// Returns `ProgressError` unless `0 <= current <= total`.
    pub fn new(current: u32, total: u32, completed: bool) -> Result<Self, ProgressError> {
        if current > total {
            return Err(ProgressError { current, total });
        }
        Ok(Self {
            current,
            total,
            completed,
        })
    }

    /// Progress at the start of a session with `total` questions.
    #[must_use]
    pub fn fresh(total: u32) -> Self {
        Self {
            current: 0,
            total,
            completed: false,
        }
    }

    #[must_use]
    pub fn current(&self) -> u32 {
        self.current
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.total - self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_progress_starts_at_zero() {
        let progress = Progress::fresh(10);
        assert_eq!(progress.current(), 0);
        assert_eq!(progress.total(), 10);
        assert_eq!(progress.remaining(), 10);
        assert!(!progress.completed());
    }

    #[test]
    fn current_cannot_exceed_total() {
        let err = Progress::new(11, 10, false).unwrap_err();
        assert_eq!(err.current, 11);
        assert_eq!(err.total, 10);
    }

    #[test]
    fn full_progress_is_valid() {
        let progress = Progress::new(10, 10, true).unwrap();
        assert_eq!(progress.remaining(), 0);
        assert!(progress.completed());
    }
}
