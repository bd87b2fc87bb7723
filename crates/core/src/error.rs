use thiserror::Error;

use crate::model::{ParseStageError, ProgressError, QuestionError, SnapshotError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Stage(#[from] ParseStageError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
