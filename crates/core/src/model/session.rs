use chrono::{DateTime, Utc};

use crate::model::SessionId;

/// One instance of a user undertaking the assessment.
///
/// Immutable once assigned; the backend owns the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    session_id: SessionId,
    created_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(session_id: SessionId, created_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            created_at,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
