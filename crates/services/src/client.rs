//! Collaborator contracts consumed by the assessment flow.
//!
//! The flow itself only sees the [`AssessmentClient`] and
//! [`EventSource`](crate::sessions::EventSource) traits; the HTTP
//! implementations here talk to the wealth-intelligence backend, and the
//! in-memory implementations back tests and prototyping.

use std::collections::HashSet;
use std::env;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::sessions::{EventSource, EventSubscription, StreamEvent};
use wealth_core::model::{
    CalibrationEvent, ChoiceId, QuestionDraft, QuestionId, ReportResult, SessionId, UserId,
};

/// Errors surfaced by collaborator clients.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Cooldown policy violation from the start collaborator.
    #[error("retake not allowed: {message}")]
    RetakeNotAllowed { message: String },

    /// Distinguished rejection from the completion collaborator.
    #[error("incomplete answers: {message}")]
    IncompleteAnswers { message: String },

    #[error("request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("client state unavailable: {0}")]
    Internal(String),
}

//
// ─── REQUEST / RESPONSE SHAPES ─────────────────────────────────────────────────
//

#[derive(Debug, Clone, Serialize)]
pub struct StartRequest {
    pub user_id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartResponse {
    pub session_id: String,
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub choice_id: ChoiceId,
    pub response_time_ms: u64,
}

/// Authoritative progress as reported by the submission collaborator.
///
/// `answers_submitted` counts the answers recorded before this submission;
/// `is_complete` reflects the state after it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServerProgress {
    pub answers_submitted: u32,
    pub total_questions: u32,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpportunityHint {
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitResponse {
    /// Not every backend revision reports progress; the flow falls back to
    /// its local index when this is absent.
    pub progress: Option<ServerProgress>,
    #[serde(default)]
    pub insight: Option<String>,
    #[serde(default)]
    pub tier_signal: Option<String>,
    #[serde(default)]
    pub opportunities: Vec<OpportunityHint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryRequest {
    pub user_id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    InProgress,
    Abandoned,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub report_ref: Option<String>,
}

/// Contract for the start / submit / complete / history collaborators.
#[async_trait]
pub trait AssessmentClient: Send + Sync {
    /// Begin a new assessment session.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::RetakeNotAllowed` for a cooldown policy
    /// violation, or transport errors otherwise.
    async fn start(&self, request: StartRequest) -> Result<StartResponse, ClientError>;

    /// Submit one answer.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` for transport failures; retrying is safe.
    async fn submit_answer(&self, request: SubmitRequest) -> Result<SubmitResponse, ClientError>;

    /// Ask the backend to finalize the session and generate the report.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::IncompleteAnswers` when the backend refuses to
    /// finalize, or transport errors otherwise.
    async fn complete(&self, session_id: &SessionId) -> Result<Ack, ClientError>;

    /// Prior sessions for the user, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` for transport failures.
    async fn history(&self, request: HistoryRequest) -> Result<Vec<HistoryEntry>, ClientError>;
}

//
// ─── HTTP IMPLEMENTATION ───────────────────────────────────────────────────────
//

#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl HttpClientConfig {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("WEALTH_API_BASE_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let api_key = env::var("WEALTH_API_KEY").ok().filter(|k| !k.is_empty());
        Some(Self { base_url, api_key })
    }
}

/// JSON client for the assessment backend.
#[derive(Clone)]
pub struct HttpAssessmentClient {
    client: Client,
    config: HttpClientConfig,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Map a non-success response to the distinguished business rejections where
/// the backend supplies an error code, or a plain status error otherwise.
async fn decode_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    if let Ok(body) = response.json::<ApiErrorBody>().await {
        let message = body.message.unwrap_or_default();
        match body.code.as_deref() {
            Some("retake_not_allowed") => return ClientError::RetakeNotAllowed { message },
            Some("incomplete_answers") => return ClientError::IncompleteAnswers { message },
            _ => {}
        }
    }
    ClientError::HttpStatus(status)
}

impl HttpAssessmentClient {
    #[must_use]
    pub fn new(config: HttpClientConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn from_env() -> Option<Self> {
        HttpClientConfig::from_env().map(Self::new)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl AssessmentClient for HttpAssessmentClient {
    async fn start(&self, request: StartRequest) -> Result<StartResponse, ClientError> {
        let response = self
            .request(self.client.post(self.url("assessments/start")))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(decode_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn submit_answer(&self, request: SubmitRequest) -> Result<SubmitResponse, ClientError> {
        let response = self
            .request(self.client.post(self.url("assessments/answers")))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(decode_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn complete(&self, session_id: &SessionId) -> Result<Ack, ClientError> {
        let response = self
            .request(self.client.post(self.url("assessments/complete")))
            .json(&serde_json::json!({ "session_id": session_id }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(decode_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn history(&self, request: HistoryRequest) -> Result<Vec<HistoryEntry>, ClientError> {
        #[derive(Deserialize)]
        struct HistoryResponse {
            #[serde(default)]
            sessions: Vec<HistoryEntry>,
        }

        let response = self
            .request(self.client.get(self.url("assessments/history")))
            .query(&[
                ("user_id", request.user_id.as_str()),
                ("email", &request.email),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(decode_error(response).await);
        }
        let body: HistoryResponse = response.json().await?;
        Ok(body.sessions)
    }
}

//
// ─── HTTP EVENT SOURCE ─────────────────────────────────────────────────────────
//

/// Long-polling push subscription over the backend's event feed.
///
/// The `after` cursor carries the last applied calibration seq so a
/// reconnect resumes the feed instead of replaying it from the start.
#[derive(Clone)]
pub struct HttpEventSource {
    client: Client,
    config: HttpClientConfig,
}

impl HttpEventSource {
    #[must_use]
    pub fn new(config: HttpClientConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    CalibrationUpdate {
        seq: u64,
        message: String,
        delta_count: u64,
        // The server's own running total; the local tally is authoritative.
        #[serde(default)]
        cumulative_count: u64,
    },
    ReportReady {
        outcome: String,
        narrative: String,
        #[serde(default)]
        report_ref: Option<String>,
    },
    Error {
        message: String,
    },
}

impl From<WireEvent> for StreamEvent {
    fn from(wire: WireEvent) -> Self {
        match wire {
            WireEvent::CalibrationUpdate {
                seq,
                message,
                delta_count,
                cumulative_count: _,
            } => StreamEvent::Calibration(CalibrationEvent {
                seq,
                message,
                delta_count,
            }),
            WireEvent::ReportReady {
                outcome,
                narrative,
                report_ref,
            } => StreamEvent::ReportReady(ReportResult {
                outcome,
                narrative,
                report_ref,
            }),
            WireEvent::Error { message } => StreamEvent::StreamError { message },
        }
    }
}

struct HttpEventSubscription {
    client: Client,
    config: HttpClientConfig,
    session_id: SessionId,
    cursor: Option<u64>,
    pending: Vec<StreamEvent>,
}

#[async_trait]
impl EventSubscription for HttpEventSubscription {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, ClientError> {
        #[derive(Deserialize)]
        struct EventBatch {
            #[serde(default)]
            events: Vec<WireEvent>,
        }

        loop {
            if !self.pending.is_empty() {
                let event = self.pending.remove(0);
                if let StreamEvent::Calibration(calibration) = &event {
                    self.cursor = Some(self.cursor.unwrap_or(0).max(calibration.seq));
                }
                return Ok(Some(event));
            }

            let url = format!(
                "{}/assessments/{}/events",
                self.config.base_url.trim_end_matches('/'),
                self.session_id
            );
            let mut request = self.client.get(url);
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }
            if let Some(after) = self.cursor {
                request = request.query(&[("after", after)]);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(ClientError::HttpStatus(response.status()));
            }
            let batch: EventBatch = response.json().await?;
            self.pending = batch.events.into_iter().map(StreamEvent::from).collect();
        }
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn subscribe(
        &self,
        session_id: &SessionId,
        after_seq: Option<u64>,
    ) -> Result<Box<dyn EventSubscription>, ClientError> {
        Ok(Box::new(HttpEventSubscription {
            client: self.client.clone(),
            config: self.config.clone(),
            session_id: session_id.clone(),
            cursor: after_seq,
            pending: Vec::new(),
        }))
    }
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

struct InMemoryInner {
    start_calls: u32,
    answered: HashSet<(SessionId, QuestionId)>,
    completed: Vec<SessionId>,
    history: Vec<HistoryEntry>,
    retake_block: Option<String>,
    completion_failure: Option<ClientError>,
    report_progress: bool,
}

/// Scripted collaborator for tests and prototyping.
///
/// Counts start calls so the exactly-once property is observable, and tracks
/// distinct answers per session to report authoritative progress.
pub struct InMemoryAssessmentClient {
    questions: Vec<QuestionDraft>,
    inner: Mutex<InMemoryInner>,
}

impl InMemoryAssessmentClient {
    /// Client serving `total` generated questions with three choices each.
    #[must_use]
    pub fn with_questions(total: usize) -> Self {
        let questions = (1..=total)
            .map(|n| QuestionDraft {
                id: Some(format!("q{n}")),
                prompt: Some(format!("Question {n}")),
                choices: ["a", "b", "c"]
                    .into_iter()
                    .map(|c| wealth_core::model::ChoiceDraft {
                        id: Some(format!("{c}{n}")),
                        value: None,
                        label: format!("Option {c}"),
                    })
                    .collect(),
                ..QuestionDraft::default()
            })
            .collect();
        Self {
            questions,
            inner: Mutex::new(InMemoryInner {
                start_calls: 0,
                answered: HashSet::new(),
                completed: Vec::new(),
                history: Vec::new(),
                retake_block: None,
                completion_failure: None,
                report_progress: true,
            }),
        }
    }

    /// Reject every start call with a cooldown message.
    #[must_use]
    pub fn block_retakes(self, message: impl Into<String>) -> Self {
        self.inner
            .lock()
            .map(|mut inner| inner.retake_block = Some(message.into()))
            .ok();
        self
    }

    /// Fail the next completion calls with the given error.
    #[must_use]
    pub fn fail_completion(self, error: ClientError) -> Self {
        self.inner
            .lock()
            .map(|mut inner| inner.completion_failure = Some(error))
            .ok();
        self
    }

    /// Seed the history lookup result.
    #[must_use]
    pub fn with_history(self, entries: Vec<HistoryEntry>) -> Self {
        self.inner
            .lock()
            .map(|mut inner| inner.history = entries)
            .ok();
        self
    }

    /// Omit the authoritative progress block from submit responses, forcing
    /// the flow onto its locally derived path.
    #[must_use]
    pub fn without_progress_reports(self) -> Self {
        self.inner
            .lock()
            .map(|mut inner| inner.report_progress = false)
            .ok();
        self
    }

    /// How many times `start` was invoked.
    #[must_use]
    pub fn start_calls(&self) -> u32 {
        self.inner.lock().map(|inner| inner.start_calls).unwrap_or(0)
    }

    /// Session ids that were asked to finalize.
    #[must_use]
    pub fn completed_sessions(&self) -> Vec<SessionId> {
        self.inner
            .lock()
            .map(|inner| inner.completed.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryInner>, ClientError> {
        self.inner
            .lock()
            .map_err(|e| ClientError::Internal(e.to_string()))
    }
}

#[async_trait]
impl AssessmentClient for InMemoryAssessmentClient {
    async fn start(&self, _request: StartRequest) -> Result<StartResponse, ClientError> {
        let mut inner = self.lock()?;
        inner.start_calls += 1;
        if let Some(message) = &inner.retake_block {
            return Err(ClientError::RetakeNotAllowed {
                message: message.clone(),
            });
        }
        Ok(StartResponse {
            session_id: format!("sess-{}", Uuid::new_v4()),
            questions: self.questions.clone(),
        })
    }

    async fn submit_answer(&self, request: SubmitRequest) -> Result<SubmitResponse, ClientError> {
        let total = u32::try_from(self.questions.len()).unwrap_or(u32::MAX);
        let mut inner = self.lock()?;
        let before = u32::try_from(inner.answered.len()).unwrap_or(u32::MAX);
        inner
            .answered
            .insert((request.session_id, request.question_id));
        let after = u32::try_from(inner.answered.len()).unwrap_or(u32::MAX);

        let progress = inner.report_progress.then_some(ServerProgress {
            answers_submitted: before,
            total_questions: total,
            is_complete: after >= total,
        });
        Ok(SubmitResponse {
            progress,
            insight: None,
            tier_signal: None,
            opportunities: Vec::new(),
        })
    }

    async fn complete(&self, session_id: &SessionId) -> Result<Ack, ClientError> {
        let mut inner = self.lock()?;
        if let Some(error) = inner.completion_failure.take() {
            inner.completion_failure = Some(clone_error(&error));
            return Err(error);
        }
        inner.completed.push(session_id.clone());
        Ok(Ack { message: None })
    }

    async fn history(&self, _request: HistoryRequest) -> Result<Vec<HistoryEntry>, ClientError> {
        Ok(self.lock()?.history.clone())
    }
}

fn clone_error(error: &ClientError) -> ClientError {
    match error {
        ClientError::RetakeNotAllowed { message } => ClientError::RetakeNotAllowed {
            message: message.clone(),
        },
        ClientError::IncompleteAnswers { message } => ClientError::IncompleteAnswers {
            message: message.clone(),
        },
        ClientError::HttpStatus(status) => ClientError::HttpStatus(*status),
        ClientError::Decode(message) => ClientError::Decode(message.clone()),
        ClientError::Internal(message) => ClientError::Internal(message.clone()),
        ClientError::Http(_) => ClientError::Decode("transport error".to_owned()),
    }
}

/// Scripted event source backed by unbounded channels.
///
/// Each call to [`InMemoryEventSource::push_subscription`] queues one
/// subscription; the consumer takes them in order across reconnects.
#[derive(Default)]
pub struct InMemoryEventSource {
    subscriptions: Mutex<Vec<mpsc::UnboundedReceiver<StreamEvent>>>,
}

impl InMemoryEventSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a subscription and return its sender side.
    pub fn push_subscription(&self) -> mpsc::UnboundedSender<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.push(rx);
        }
        tx
    }
}

struct InMemoryEventSubscription {
    receiver: mpsc::UnboundedReceiver<StreamEvent>,
}

#[async_trait]
impl EventSubscription for InMemoryEventSubscription {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, ClientError> {
        Ok(self.receiver.recv().await)
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn subscribe(
        &self,
        _session_id: &SessionId,
        _after_seq: Option<u64>,
    ) -> Result<Box<dyn EventSubscription>, ClientError> {
        let mut subs = self
            .subscriptions
            .lock()
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        if subs.is_empty() {
            return Err(ClientError::Decode("no subscription available".into()));
        }
        let receiver = subs.remove(0);
        Ok(Box::new(InMemoryEventSubscription { receiver }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_event_decodes_calibration_update() {
        let event: WireEvent = serde_json::from_str(
            r#"{"type":"calibration_update","seq":4,"message":"matched","delta_count":2,"cumulative_count":9}"#,
        )
        .unwrap();
        let StreamEvent::Calibration(calibration) = StreamEvent::from(event) else {
            panic!("expected calibration event");
        };
        assert_eq!(calibration.seq, 4);
        assert_eq!(calibration.delta_count, 2);
    }

    #[test]
    fn wire_event_decodes_report_ready() {
        let event: WireEvent = serde_json::from_str(
            r#"{"type":"report_ready","outcome":"growth","narrative":"...","report_ref":"r-1"}"#,
        )
        .unwrap();
        let StreamEvent::ReportReady(report) = StreamEvent::from(event) else {
            panic!("expected report event");
        };
        assert_eq!(report.outcome, "growth");
        assert_eq!(report.report_ref.as_deref(), Some("r-1"));
    }

    #[test]
    fn submit_response_tolerates_missing_progress() {
        let response: SubmitResponse = serde_json::from_str(r#"{"insight":"steady hand"}"#).unwrap();
        assert!(response.progress.is_none());
        assert_eq!(response.insight.as_deref(), Some("steady hand"));
    }

    #[test]
    fn unknown_history_status_decodes_as_unknown() {
        let entry: HistoryEntry =
            serde_json::from_str(r#"{"session_id":"s1","status":"archived"}"#).unwrap();
        assert_eq!(entry.status, SessionStatus::Unknown);
    }

    #[tokio::test]
    async fn in_memory_client_counts_start_calls() {
        let client = InMemoryAssessmentClient::with_questions(2);
        let request = StartRequest {
            user_id: UserId::new("u1"),
            email: "u1@example.com".into(),
        };
        client.start(request.clone()).await.unwrap();
        client.start(request).await.unwrap();
        assert_eq!(client.start_calls(), 2);
    }

    #[tokio::test]
    async fn in_memory_client_reports_progress_before_and_after() {
        let client = InMemoryAssessmentClient::with_questions(2);
        let session_id = SessionId::new("sess-1");

        let first = client
            .submit_answer(SubmitRequest {
                session_id: session_id.clone(),
                question_id: QuestionId::new("q1"),
                choice_id: ChoiceId::new("a1"),
                response_time_ms: 100,
            })
            .await
            .unwrap()
            .progress
            .unwrap();
        assert_eq!(first.answers_submitted, 0);
        assert!(!first.is_complete);

        let second = client
            .submit_answer(SubmitRequest {
                session_id,
                question_id: QuestionId::new("q2"),
                choice_id: ChoiceId::new("a2"),
                response_time_ms: 100,
            })
            .await
            .unwrap()
            .progress
            .unwrap();
        assert_eq!(second.answers_submitted, 1);
        assert!(second.is_complete);
    }
}
