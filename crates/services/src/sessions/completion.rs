use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::client::{AssessmentClient, ClientError};
use wealth_core::model::SessionId;

/// Non-blocking notice that the completion acknowledgment did not land.
///
/// Deliberately not an error type: the flow proceeds exactly as on success
/// and the caller surfaces the message as a notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionWarning {
    message: String,
}

impl CompletionWarning {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CompletionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of asking the backend to finalize a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The backend acknowledged; the report is being generated.
    Acknowledged,
    /// The acknowledgment failed; the backend is trusted to finish report
    /// generation independently.
    Deferred(CompletionWarning),
}

impl CompletionOutcome {
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, CompletionOutcome::Acknowledged)
    }

    #[must_use]
    pub fn warning(&self) -> Option<&CompletionWarning> {
        match self {
            CompletionOutcome::Acknowledged => None,
            CompletionOutcome::Deferred(warning) => Some(warning),
        }
    }
}

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(400);

/// Invokes the report-generation collaborator with bounded retries.
///
/// Failure never escalates past a [`CompletionWarning`].
#[derive(Clone)]
pub struct CompletionHandler {
    client: Arc<dyn AssessmentClient>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl CompletionHandler {
    #[must_use]
    pub fn new(client: Arc<dyn AssessmentClient>) -> Self {
        Self {
            client,
            max_attempts: DEFAULT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    #[must_use]
    pub fn with_retries(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Ask the backend to finalize `session_id`.
    ///
    /// An "incomplete answers" rejection is not retried; transport failures
    /// are, up to the attempt bound.
    pub async fn complete(&self, session_id: &SessionId) -> CompletionOutcome {
        for attempt in 1..=self.max_attempts {
            match self.client.complete(session_id).await {
                Ok(_) => return CompletionOutcome::Acknowledged,
                Err(ClientError::IncompleteAnswers { message }) => {
                    warn!(session_id = %session_id, %message, "completion rejected");
                    return CompletionOutcome::Deferred(CompletionWarning::new(format!(
                        "your report will be prepared once processing finishes: {message}"
                    )));
                }
                Err(error) if attempt < self.max_attempts => {
                    warn!(session_id = %session_id, %error, attempt, "completion attempt failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(error) => {
                    warn!(session_id = %session_id, %error, "completion failed, continuing without ack");
                    return CompletionOutcome::Deferred(CompletionWarning::new(
                        "report generation is continuing in the background",
                    ));
                }
            }
        }
        // Unreachable with max_attempts >= 1.
        CompletionOutcome::Deferred(CompletionWarning::new(
            "report generation is continuing in the background",
        ))
    }
}
