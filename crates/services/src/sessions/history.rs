use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::client::{AssessmentClient, HistoryRequest, SessionStatus};
use wealth_core::model::{SessionId, UserId};

/// Cooperative cancellation flag for the resume check.
///
/// Set whenever the user takes any forward action (confirms the intro, or a
/// session already exists); checked again immediately before the redirect
/// side effect fires.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A previously completed session the user can be sent back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorSession {
    pub session_id: SessionId,
    pub report_ref: Option<String>,
}

/// Outcome of the resume check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeDecision {
    /// A completed prior session exists and the redirect fired.
    Redirect(PriorSession),
    /// No usable history (including timeout); the user starts fresh.
    StartFresh,
}

const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Decides, for a returning user still at `NotStarted`, whether to send them
/// to a previously completed session instead of starting a new one.
pub struct HistoryChecker {
    client: Arc<dyn AssessmentClient>,
    timeout: Duration,
}

impl HistoryChecker {
    #[must_use]
    pub fn new(client: Arc<dyn AssessmentClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Race the history lookup against the timeout, then redirect via
    /// `redirect` if a completed prior session exists.
    ///
    /// The abort signal is re-validated immediately before `redirect` runs:
    /// the user can advance while the lookup is in flight, and a stale
    /// positive result must not redirect.
    pub async fn run<F>(
        &self,
        user_id: UserId,
        email: String,
        abort: &AbortSignal,
        redirect: F,
    ) -> ResumeDecision
    where
        F: FnOnce(&PriorSession),
    {
        if abort.is_set() {
            return ResumeDecision::StartFresh;
        }

        let request = HistoryRequest { user_id, email };
        let lookup = self.client.history(request);
        let entries = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(error)) => {
                warn!(%error, "history lookup failed, starting fresh");
                return ResumeDecision::StartFresh;
            }
            Err(_) => {
                debug!(timeout_ms = self.timeout.as_millis() as u64, "history lookup timed out");
                return ResumeDecision::StartFresh;
            }
        };

        let Some(entry) = entries
            .into_iter()
            .find(|entry| entry.status == SessionStatus::Completed)
        else {
            return ResumeDecision::StartFresh;
        };

        let prior = PriorSession {
            session_id: SessionId::new(entry.session_id),
            report_ref: entry.report_ref,
        };

        // Check-then-act: the lookup may have raced a forward action.
        if abort.is_set() {
            debug!(session_id = %prior.session_id, "resume suppressed, user already advanced");
            return ResumeDecision::StartFresh;
        }

        redirect(&prior);
        ResumeDecision::Redirect(prior)
    }
}
