use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use services::client::{
    Ack, AssessmentClient, ClientError, HistoryEntry, HistoryRequest, InMemoryAssessmentClient,
    SessionStatus, StartRequest, StartResponse, SubmitRequest, SubmitResponse,
};
use services::sessions::{
    AbortSignal, AssessmentFlow, CompletionHandler, EventStreamConsumer, FlowController,
    FlowHandle, HistoryChecker, ReconnectPolicy, ResumeDecision, StartOutcome, StreamEvent,
};
use storage::repository::{InMemorySnapshotStore, SnapshotRepository};
use wealth_core::model::{
    CalibrationEvent, ChoiceId, QuestionId, ReportResult, SessionId, Stage, StageSnapshot, UserId,
};
use wealth_core::time::fixed_clock;

fn report() -> ReportResult {
    ReportResult {
        outcome: "balanced-growth".into(),
        narrative: "Your strategy favors steady accumulation.".into(),
        report_ref: Some("report-1".into()),
    }
}

fn calibration(seq: u64, delta: u64) -> CalibrationEvent {
    CalibrationEvent {
        seq,
        message: format!("matched {delta} peers"),
        delta_count: delta,
    }
}

async fn spawn_flow(
    client: Arc<InMemoryAssessmentClient>,
    store: InMemorySnapshotStore,
) -> (FlowHandle, InMemorySnapshotStore) {
    let controller = FlowController::restore(
        fixed_clock(),
        Arc::clone(&client) as Arc<dyn AssessmentClient>,
        Arc::new(store.clone()),
        AbortSignal::new(),
    )
    .await
    .expect("restore")
    .with_completion(
        CompletionHandler::new(client).with_retries(2, Duration::from_millis(1)),
    );
    let (handle, _task) = AssessmentFlow::spawn(controller);
    (handle, store)
}

async fn start_session(handle: &FlowHandle) -> SessionId {
    match handle
        .start(UserId::new("u1"), "u1@example.com".into())
        .await
        .expect("start")
    {
        StartOutcome::Started { session_id, .. } => session_id,
        StartOutcome::AlreadyStarted => panic!("expected a fresh session"),
    }
}

#[tokio::test]
async fn concurrent_starts_create_exactly_one_session() {
    let client = Arc::new(InMemoryAssessmentClient::with_questions(3));
    let (handle, _store) = spawn_flow(Arc::clone(&client), InMemorySnapshotStore::new()).await;

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle.start(UserId::new("u1"), "u1@example.com".into()).await
        }));
    }

    let mut started = 0;
    let mut suppressed = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            StartOutcome::Started { .. } => started += 1,
            StartOutcome::AlreadyStarted => suppressed += 1,
        }
    }

    assert_eq!(started, 1);
    assert_eq!(suppressed, 9);
    assert_eq!(client.start_calls(), 1);
}

#[tokio::test]
async fn answering_every_question_walks_progress_to_awaiting_report() {
    let client = Arc::new(InMemoryAssessmentClient::with_questions(10));
    let (handle, store) = spawn_flow(Arc::clone(&client), InMemorySnapshotStore::new()).await;

    handle.confirm_intro().await.unwrap();
    let session_id = start_session(&handle).await;

    for n in 1..=10 {
        let outcome = handle
            .submit_answer(
                QuestionId::new(format!("q{n}")),
                ChoiceId::new(format!("a{n}")),
                1_200,
            )
            .await
            .expect("submit");
        assert_eq!(outcome.progress.current(), n);
        assert_eq!(outcome.advanced, n == 10);
    }

    let status = handle.status().await.unwrap();
    assert_eq!(status.stage, Stage::AwaitingReport);
    assert!(status.progress.completed());
    assert_eq!(client.completed_sessions(), vec![session_id.clone()]);

    // The transition is durable before the call returns.
    let snapshot = store.load().await.unwrap().expect("snapshot");
    assert_eq!(snapshot.stage(), Stage::AwaitingReport);
    assert_eq!(snapshot.session_id(), Some(&session_id));
}

#[tokio::test]
async fn local_progress_path_advances_without_server_progress() {
    let client = Arc::new(
        InMemoryAssessmentClient::with_questions(2).without_progress_reports(),
    );
    let (handle, _store) = spawn_flow(client, InMemorySnapshotStore::new()).await;
    start_session(&handle).await;

    let first = handle
        .submit_answer(QuestionId::new("q1"), ChoiceId::new("a1"), 900)
        .await
        .unwrap();
    assert_eq!(first.progress.current(), 1);
    assert!(!first.advanced);

    let second = handle
        .submit_answer(QuestionId::new("q2"), ChoiceId::new("a2"), 900)
        .await
        .unwrap();
    assert_eq!(second.progress.current(), 2);
    assert!(second.advanced);
}

#[tokio::test]
async fn completion_failure_warns_but_still_advances() {
    let client = Arc::new(
        InMemoryAssessmentClient::with_questions(1)
            .fail_completion(ClientError::Decode("connection reset".into())),
    );
    let (handle, _store) = spawn_flow(client, InMemorySnapshotStore::new()).await;
    start_session(&handle).await;

    let outcome = handle
        .submit_answer(QuestionId::new("q1"), ChoiceId::new("a1"), 700)
        .await
        .expect("submission itself succeeds");

    assert!(outcome.advanced);
    assert!(outcome.completion_warning.is_some());
    assert_eq!(handle.status().await.unwrap().stage, Stage::AwaitingReport);
}

#[tokio::test]
async fn explicit_complete_is_optimistic() {
    let client = Arc::new(InMemoryAssessmentClient::with_questions(3));
    let (handle, _store) = spawn_flow(client, InMemorySnapshotStore::new()).await;
    start_session(&handle).await;

    handle
        .submit_answer(QuestionId::new("q1"), ChoiceId::new("a1"), 700)
        .await
        .unwrap();
    let outcome = handle.complete().await.unwrap();
    assert!(outcome.is_acknowledged());
    assert_eq!(handle.status().await.unwrap().stage, Stage::AwaitingReport);
}

#[tokio::test]
async fn retake_rejection_is_verbatim_and_leaves_stage_alone() {
    let client = Arc::new(
        InMemoryAssessmentClient::with_questions(1).block_retakes("cooldown until next quarter"),
    );
    let (handle, _store) = spawn_flow(Arc::clone(&client), InMemorySnapshotStore::new()).await;

    let error = handle
        .start(UserId::new("u1"), "u1@example.com".into())
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "cooldown until next quarter");
    assert_eq!(handle.status().await.unwrap().stage, Stage::NotStarted);

    // The ticket was released, so a deliberate retry reaches the backend.
    let _ = handle
        .start(UserId::new("u1"), "u1@example.com".into())
        .await;
    assert_eq!(client.start_calls(), 2);
}

#[tokio::test]
async fn duplicate_calibration_events_count_once() {
    let client = Arc::new(InMemoryAssessmentClient::with_questions(1));
    let (handle, _store) = spawn_flow(client, InMemorySnapshotStore::new()).await;
    start_session(&handle).await;

    handle
        .forward_event(StreamEvent::Calibration(calibration(1, 3)))
        .await
        .unwrap();
    handle
        .forward_event(StreamEvent::Calibration(calibration(1, 3)))
        .await
        .unwrap();
    handle
        .forward_event(StreamEvent::Calibration(calibration(2, 4)))
        .await
        .unwrap();

    let status = handle.status().await.unwrap();
    assert_eq!(status.calibration_count, 7);
}

#[tokio::test]
async fn report_ready_completes_session_and_clears_snapshot() {
    let client = Arc::new(InMemoryAssessmentClient::with_questions(1));
    let (handle, store) = spawn_flow(client, InMemorySnapshotStore::new()).await;
    let session_id = start_session(&handle).await;

    handle
        .submit_answer(QuestionId::new("q1"), ChoiceId::new("a1"), 500)
        .await
        .unwrap();
    handle
        .forward_event(StreamEvent::ReportReady(report()))
        .await
        .unwrap();

    let status = handle.status().await.unwrap();
    assert_eq!(status.stage, Stage::Complete);
    assert_eq!(status.session_id, Some(session_id));
    assert_eq!(status.report.unwrap().outcome, "balanced-growth");
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn restored_session_does_not_restart() {
    let client = Arc::new(InMemoryAssessmentClient::with_questions(5));
    let seeded = InMemorySnapshotStore::seeded(
        StageSnapshot::new(Stage::AwaitingReport, Some(SessionId::new("sess-prior"))).unwrap(),
    );
    let (handle, _store) = spawn_flow(Arc::clone(&client), seeded).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.stage, Stage::AwaitingReport);
    assert_eq!(status.session_id, Some(SessionId::new("sess-prior")));

    // Re-entrant initialization after a restart must not start a second
    // session.
    let outcome = handle
        .start(UserId::new("u1"), "u1@example.com".into())
        .await
        .unwrap();
    assert_eq!(outcome, StartOutcome::AlreadyStarted);
    assert_eq!(client.start_calls(), 0);

    handle
        .forward_event(StreamEvent::ReportReady(report()))
        .await
        .unwrap();
    assert_eq!(handle.status().await.unwrap().stage, Stage::Complete);
}

#[tokio::test(start_paused = true)]
async fn event_consumer_survives_reconnect_and_keeps_counts_exact() {
    let client = Arc::new(InMemoryAssessmentClient::with_questions(1));
    let (handle, _store) = spawn_flow(client, InMemorySnapshotStore::new()).await;
    let session_id = start_session(&handle).await;

    let source = Arc::new(services::client::InMemoryEventSource::new());

    // First subscription delivers one event, then drops (disconnect).
    let first = source.push_subscription();
    first
        .send(StreamEvent::Calibration(calibration(1, 3)))
        .unwrap();
    drop(first);

    // After reconnecting, delivery resumes with a duplicate of seq 1.
    let second = source.push_subscription();
    second
        .send(StreamEvent::Calibration(calibration(1, 3)))
        .unwrap();
    second
        .send(StreamEvent::Calibration(calibration(2, 2)))
        .unwrap();
    second.send(StreamEvent::ReportReady(report())).unwrap();

    let consumer = EventStreamConsumer::new(source, handle.clone(), session_id)
        .with_policy(ReconnectPolicy::new(5));
    consumer.spawn().await.unwrap();

    let status = handle.status().await.unwrap();
    assert_eq!(status.calibration_count, 5);
    assert_eq!(status.stage, Stage::Complete);
}

// History collaborator that blocks until released, so tests can interleave a
// forward action with an in-flight lookup.
struct BlockingHistoryClient {
    release: Arc<Notify>,
    entries: Vec<HistoryEntry>,
}

#[async_trait]
impl AssessmentClient for BlockingHistoryClient {
    async fn start(&self, _request: StartRequest) -> Result<StartResponse, ClientError> {
        Err(ClientError::Decode("not under test".into()))
    }

    async fn submit_answer(&self, _request: SubmitRequest) -> Result<SubmitResponse, ClientError> {
        Err(ClientError::Decode("not under test".into()))
    }

    async fn complete(&self, _session_id: &SessionId) -> Result<Ack, ClientError> {
        Err(ClientError::Decode("not under test".into()))
    }

    async fn history(&self, _request: HistoryRequest) -> Result<Vec<HistoryEntry>, ClientError> {
        self.release.notified().await;
        Ok(self.entries.clone())
    }
}

#[tokio::test]
async fn stale_positive_lookup_never_redirects() {
    let release = Arc::new(Notify::new());
    let client = Arc::new(BlockingHistoryClient {
        release: Arc::clone(&release),
        entries: vec![HistoryEntry {
            session_id: "sess-old".into(),
            status: SessionStatus::Completed,
            report_ref: Some("report-old".into()),
        }],
    });

    let abort = AbortSignal::new();
    let checker_abort = abort.clone();
    let lookup = tokio::spawn(async move {
        HistoryChecker::new(client)
            .with_timeout(Duration::from_secs(3))
            .run(
                UserId::new("u1"),
                "u1@example.com".into(),
                &checker_abort,
                |_| panic!("redirect must not fire after the user advanced"),
            )
            .await
    });

    // The user clicks "begin" while the lookup is still in flight.
    tokio::task::yield_now().await;
    abort.set();
    release.notify_one();

    assert_eq!(lookup.await.unwrap(), ResumeDecision::StartFresh);
}

#[tokio::test]
async fn slow_history_lookup_times_out_to_fresh_start() {
    // Never released, so only the timeout can resolve the race.
    let client = Arc::new(BlockingHistoryClient {
        release: Arc::new(Notify::new()),
        entries: Vec::new(),
    });

    let decision = HistoryChecker::new(client)
        .with_timeout(Duration::from_millis(20))
        .run(
            UserId::new("u1"),
            "u1@example.com".into(),
            &AbortSignal::new(),
            |_| panic!("no redirect on timeout"),
        )
        .await;

    assert_eq!(decision, ResumeDecision::StartFresh);
}
