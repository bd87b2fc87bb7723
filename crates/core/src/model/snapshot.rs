use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{SessionId, Stage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("stage {stage} requires a session id")]
    MissingSessionId { stage: Stage },
}

/// The durable `{stage, session_id}` record written on every transition.
///
/// Stages at or past `InProgress` always carry their session id; a reader
/// never observes one without the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSnapshot {
    stage: Stage,
    session_id: Option<SessionId>,
}

impl StageSnapshot {
    /// # Errors
    ///
    /// Returns `SnapshotError::MissingSessionId` when `stage` requires a
    /// session id and none is given.
    pub fn new(stage: Stage, session_id: Option<SessionId>) -> Result<Self, SnapshotError> {
        if stage.requires_session() && session_id.is_none() {
            return Err(SnapshotError::MissingSessionId { stage });
        }
        Ok(Self { stage, session_id })
    }

    /// Snapshot for a stage before any session exists.
    #[must_use]
    pub fn without_session(stage: Stage) -> Option<Self> {
        Self::new(stage, None).ok()
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_stages_need_no_session() {
        assert!(StageSnapshot::new(Stage::NotStarted, None).is_ok());
        assert!(StageSnapshot::new(Stage::Introduction, None).is_ok());
    }

    #[test]
    fn in_progress_requires_session_id() {
        let err = StageSnapshot::new(Stage::InProgress, None).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::MissingSessionId {
                stage: Stage::InProgress
            }
        ));

        let snapshot =
            StageSnapshot::new(Stage::InProgress, Some(SessionId::new("sess-1"))).unwrap();
        assert_eq!(snapshot.session_id().unwrap().as_str(), "sess-1");
    }
}
