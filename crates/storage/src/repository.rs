use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use wealth_core::model::StageSnapshot;

/// Errors surfaced by snapshot storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable home for the `{stage, session_id}` snapshot.
///
/// Written on every flow transition and read exactly once at controller
/// construction. Missing or corrupt data loads as `None` and is treated as a
/// fresh `NotStarted` session by the caller.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Read the current snapshot, if a valid one exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only for infrastructure failures; a corrupt
    /// record is `Ok(None)`, never an error.
    async fn load(&self) -> Result<Option<StageSnapshot>, StorageError>;

    /// Persist the snapshot, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    async fn save(&self, snapshot: &StageSnapshot) -> Result<(), StorageError>;

    /// Remove the snapshot; called when a session reaches `Complete`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be removed.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// In-memory snapshot store for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    slot: Arc<Mutex<Option<StageSnapshot>>>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the store, e.g. to simulate a process restart in tests.
    #[must_use]
    pub fn seeded(snapshot: StageSnapshot) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(snapshot))),
        }
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotStore {
    async fn load(&self) -> Result<Option<StageSnapshot>, StorageError> {
        let guard = self
            .slot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn save(&self, snapshot: &StageSnapshot) -> Result<(), StorageError> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = Some(snapshot.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

/// Aggregates storage adapters behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub snapshots: Arc<dyn SnapshotRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            snapshots: Arc::new(InMemorySnapshotStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wealth_core::model::{SessionId, Stage};

    fn snapshot(stage: Stage) -> StageSnapshot {
        StageSnapshot::new(stage, Some(SessionId::new("sess-1"))).unwrap()
    }

    #[tokio::test]
    async fn round_trips_snapshot() {
        let store = InMemorySnapshotStore::new();
        assert!(store.load().await.unwrap().is_none());

        let saved = snapshot(Stage::InProgress);
        store.save(&saved).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn save_replaces_previous_record() {
        let store = InMemorySnapshotStore::new();
        store.save(&snapshot(Stage::InProgress)).await.unwrap();
        store.save(&snapshot(Stage::AwaitingReport)).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.stage(), Stage::AwaitingReport);
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let store = InMemorySnapshotStore::new();
        store.save(&snapshot(Stage::InProgress)).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
