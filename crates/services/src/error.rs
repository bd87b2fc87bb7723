//! Shared error types for the services crate.

use thiserror::Error;

use crate::client::ClientError;
use storage::repository::StorageError;
use wealth_core::model::QuestionError;

/// Errors emitted by the assessment flow.
///
/// Only `RetakeNotAllowed` and `Submission` are user-actionable; everything
/// else is recovered locally by the flow and logged.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlowError {
    #[error("no active session")]
    NoSession,

    #[error("unknown question: {id}")]
    UnknownQuestion { id: String },

    /// Business-rule rejection from the start collaborator, surfaced verbatim.
    #[error("{message}")]
    RetakeNotAllowed { message: String },

    /// Starting the session failed in transport; no stage was consumed.
    #[error("session start failed")]
    Start(#[source] ClientError),

    /// Submitting the answer failed; the current question is unchanged and
    /// the user may retry.
    #[error("answer submission failed")]
    Submission(#[source] ClientError),

    #[error(transparent)]
    Question(#[from] QuestionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The flow task has shut down and can no longer accept commands.
    #[error("assessment flow is no longer running")]
    FlowClosed,
}
