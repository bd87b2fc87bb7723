#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{InMemorySnapshotStore, SnapshotRepository, Storage, StorageError};
pub use sqlite::{SqliteInitError, SqliteRepository};
