use std::sync::atomic::{AtomicBool, Ordering};

/// Single-use-per-session gate preventing duplicate start operations.
///
/// Re-entrant initialization around the flow (remounts, background/foreground
/// cycles) may invoke start more than once for the same logical session; only
/// the first acquire wins. The guard lives on the controller so its lifetime
/// is the session's, not any single invocation's. `reset` is called only when
/// a new session is explicitly begun or a failed start is rolled back.
#[derive(Debug, Default)]
pub struct StartGuard {
    taken: AtomicBool,
}

impl StartGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard that starts already consumed, for restored sessions.
    #[must_use]
    pub fn taken() -> Self {
        Self {
            taken: AtomicBool::new(true),
        }
    }

    /// Returns true exactly once until the next `reset`.
    pub fn try_acquire(&self) -> bool {
        !self.taken.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_taken(&self) -> bool {
        self.taken.load(Ordering::SeqCst)
    }

    /// Release the ticket so another explicit start may proceed.
    pub fn reset(&self) {
        self.taken.store(false, Ordering::SeqCst);
    }
}
