use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use crate::repository::{SnapshotRepository, StorageError};
use wealth_core::model::{SessionId, Stage, StageSnapshot};

#[async_trait]
impl SnapshotRepository for super::SqliteRepository {
    async fn load(&self) -> Result<Option<StageSnapshot>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT stage, session_id
            FROM flow_snapshot
            WHERE id = 1
            ",
        )
        .fetch_optional(self.pool())
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stage: String = row
            .try_get("stage")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let session_id: Option<String> = row
            .try_get("session_id")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        // A record that fails to parse or violates the stage/session pairing
        // is treated as absent, not as an error.
        let Ok(stage) = stage.parse::<Stage>() else {
            return Ok(None);
        };
        Ok(StageSnapshot::new(stage, session_id.map(SessionId::new)).ok())
    }

    async fn save(&self, snapshot: &StageSnapshot) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO flow_snapshot (id, stage, session_id, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                stage = excluded.stage,
                session_id = excluded.session_id,
                updated_at = excluded.updated_at
            ",
        )
        .bind(1_i64)
        .bind(snapshot.stage().as_str())
        .bind(snapshot.session_id().map(SessionId::as_str))
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM flow_snapshot WHERE id = 1")
            .execute(self.pool())
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }
}
