use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Position of a session in the assessment lifecycle.
///
/// Stages are ordered; a session's stage index never decreases, and once
/// `Complete` it is frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NotStarted,
    Introduction,
    InProgress,
    AwaitingReport,
    Complete,
}

impl Stage {
    /// Ordinal used for the monotonicity invariant.
    #[must_use]
    pub fn index(self) -> u8 {
        match self {
            Stage::NotStarted => 0,
            Stage::Introduction => 1,
            Stage::InProgress => 2,
            Stage::AwaitingReport => 3,
            Stage::Complete => 4,
        }
    }

    /// True once the session has reached its terminal stage.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete)
    }

    /// True for stages that can only exist with an assigned session id.
    #[must_use]
    pub fn requires_session(self) -> bool {
        self.index() >= Stage::InProgress.index()
    }

    /// True when the user counts as finished answering.
    #[must_use]
    pub fn is_post_answering(self) -> bool {
        matches!(self, Stage::AwaitingReport | Stage::Complete)
    }

    /// Whether a transition to `next` is admissible.
    ///
    /// Re-asserting the current stage is allowed; moving backwards is not,
    /// and nothing follows `Complete`.
    #[must_use]
    pub fn accepts(self, next: Stage) -> bool {
        if self.is_terminal() {
            return next == Stage::Complete;
        }
        next.index() >= self.index()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::NotStarted => "not_started",
            Stage::Introduction => "introduction",
            Stage::InProgress => "in_progress",
            Stage::AwaitingReport => "awaiting_report",
            Stage::Complete => "complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage: {value}")]
pub struct ParseStageError {
    pub value: String,
}

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Stage::NotStarted),
            "introduction" => Ok(Stage::Introduction),
            "in_progress" => Ok(Stage::InProgress),
            "awaiting_report" => Ok(Stage::AwaitingReport),
            "complete" => Ok(Stage::Complete),
            other => Err(ParseStageError {
                value: other.to_owned(),
            }),
        }
    }
}
