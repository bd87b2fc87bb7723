use storage::repository::SnapshotRepository;
use storage::sqlite::SqliteRepository;
use wealth_core::model::{SessionId, Stage, StageSnapshot};

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_snapshot_round_trip() {
    let repo = connect("memdb_roundtrip").await;

    assert!(repo.load().await.unwrap().is_none());

    let snapshot =
        StageSnapshot::new(Stage::InProgress, Some(SessionId::new("sess-abc"))).unwrap();
    repo.save(&snapshot).await.unwrap();

    let loaded = repo.load().await.unwrap().expect("snapshot present");
    assert_eq!(loaded, snapshot);
}

#[tokio::test]
async fn sqlite_save_overwrites_and_clear_removes() {
    let repo = connect("memdb_overwrite").await;

    let first = StageSnapshot::new(Stage::Introduction, None).unwrap();
    repo.save(&first).await.unwrap();

    let second =
        StageSnapshot::new(Stage::AwaitingReport, Some(SessionId::new("sess-xyz"))).unwrap();
    repo.save(&second).await.unwrap();

    let loaded = repo.load().await.unwrap().expect("snapshot present");
    assert_eq!(loaded.stage(), Stage::AwaitingReport);
    assert_eq!(loaded.session_id().unwrap().as_str(), "sess-xyz");

    repo.clear().await.unwrap();
    assert!(repo.load().await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_corrupt_stage_loads_as_none() {
    let repo = connect("memdb_corrupt").await;

    sqlx::query(
        "INSERT INTO flow_snapshot (id, stage, session_id, updated_at) VALUES (1, 'bogus', 's', '')",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    assert!(repo.load().await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_unpaired_session_loads_as_none() {
    let repo = connect("memdb_unpaired").await;

    // InProgress without a session id violates the pairing invariant.
    sqlx::query(
        "INSERT INTO flow_snapshot (id, stage, session_id, updated_at) \
         VALUES (1, 'in_progress', NULL, '')",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    assert!(repo.load().await.unwrap().is_none());
}
