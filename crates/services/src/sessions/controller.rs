use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::{
    AssessmentClient, ClientError, OpportunityHint, StartRequest, SubmitRequest, SubmitResponse,
};
use crate::error::FlowError;
use crate::sessions::completion::{CompletionHandler, CompletionOutcome, CompletionWarning};
use crate::sessions::events::StreamEvent;
use crate::sessions::guard::StartGuard;
use crate::sessions::history::AbortSignal;
use crate::sessions::state::SessionState;
use storage::repository::{SnapshotRepository, StorageError};
use wealth_core::Clock;
use wealth_core::model::{
    AnswerRecord, ChoiceId, Progress, QuestionId, ReportResult, Session, SessionId, Stage,
    StageSnapshot, UserId,
};

/// Result of a start call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started {
        session_id: SessionId,
        total_questions: u32,
    },
    /// The guard had already granted its ticket; the duplicate call is a
    /// no-op rather than an error.
    AlreadyStarted,
}

/// Result of submitting one answer.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub progress: Progress,
    pub insight: Option<String>,
    pub tier_signal: Option<String>,
    pub opportunities: Vec<OpportunityHint>,
    /// True when this submission moved the session to `AwaitingReport`.
    pub advanced: bool,
    /// Set when the optimistic completion call could not be acknowledged.
    pub completion_warning: Option<CompletionWarning>,
}

/// The single authoritative state machine for one assessment session.
///
/// Owns the session state outright; every mutation funnels through here (in
/// production, via the command queue in [`AssessmentFlow`]). Each stage
/// transition is persisted before the operation returns, so a process
/// restart resumes from the last durable stage.
///
/// [`AssessmentFlow`]: crate::sessions::AssessmentFlow
pub struct FlowController {
    clock: Clock,
    client: Arc<dyn AssessmentClient>,
    snapshots: Arc<dyn SnapshotRepository>,
    completion: CompletionHandler,
    guard: StartGuard,
    abort: AbortSignal,
    state: SessionState,
}

impl FlowController {
    /// Build a controller, reading the persisted snapshot exactly once.
    ///
    /// A restored session marks the guard consumed (its start already
    /// happened) and sets the abort signal for any pending resume check.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Storage` if the snapshot cannot be read.
    pub async fn restore(
        clock: Clock,
        client: Arc<dyn AssessmentClient>,
        snapshots: Arc<dyn SnapshotRepository>,
        abort: AbortSignal,
    ) -> Result<Self, FlowError> {
        let completion = CompletionHandler::new(Arc::clone(&client));
        let snapshot = snapshots.load().await?;

        let (state, guard) = match snapshot {
            Some(snapshot) => {
                info!(stage = %snapshot.stage(), "restoring persisted session");
                let state = SessionState::from_snapshot(&snapshot, clock.now());
                let guard = if state.session_id().is_some() {
                    StartGuard::taken()
                } else {
                    StartGuard::new()
                };
                if state.stage() != Stage::NotStarted {
                    abort.set();
                }
                (state, guard)
            }
            None => (SessionState::new(), StartGuard::new()),
        };

        Ok(Self {
            clock,
            client,
            snapshots,
            completion,
            guard,
            abort,
            state,
        })
    }

    #[must_use]
    pub fn with_completion(mut self, completion: CompletionHandler) -> Self {
        self.completion = completion;
        self
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// The user confirmed the introduction screen.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Storage` if the transition cannot be persisted.
    pub async fn confirm_intro(&mut self) -> Result<Stage, FlowError> {
        self.abort.set();
        let stage = self.transition(Stage::Introduction);
        self.persist_stage().await?;
        Ok(stage)
    }

    /// Begin a new session, guarded against re-entrant duplicates.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::RetakeNotAllowed` verbatim from the collaborator
    /// (stage unchanged), `FlowError::Start` for transport failures, or
    /// `FlowError::Question`/`FlowError::Storage` for normalization and
    /// persistence failures. All failures release the guard ticket so a
    /// deliberate retry can start again.
    pub async fn start(&mut self, user_id: UserId, email: String) -> Result<StartOutcome, FlowError> {
        if self.state.session().is_some() || !self.guard.try_acquire() {
            debug!("duplicate start suppressed");
            return Ok(StartOutcome::AlreadyStarted);
        }
        self.abort.set();

        let response = match self.client.start(StartRequest { user_id, email }).await {
            Ok(response) => response,
            Err(ClientError::RetakeNotAllowed { message }) => {
                self.guard.reset();
                return Err(FlowError::RetakeNotAllowed { message });
            }
            Err(error) => {
                self.guard.reset();
                return Err(FlowError::Start(error));
            }
        };

        let questions = response
            .questions
            .into_iter()
            .map(wealth_core::model::QuestionDraft::normalize)
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|_| self.guard.reset())?;

        let session_id = SessionId::new(response.session_id);
        let total = u32::try_from(questions.len()).unwrap_or(u32::MAX);
        info!(session_id = %session_id, total_questions = total, "session started");

        self.state
            .install_session(Session::new(session_id.clone(), self.clock.now()), questions);
        self.transition(Stage::InProgress);
        self.persist_stage().await?;

        Ok(StartOutcome::Started {
            session_id,
            total_questions: total,
        })
    }

    /// Submit one answer and advance progress.
    ///
    /// Progress precedence: an authoritative server-reported pair wins over
    /// the locally derived index; advancing to `AwaitingReport` takes either
    /// the server's completion signal or the local "last question" signal
    /// (logical OR).
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NoSession`/`FlowError::UnknownQuestion` for
    /// validation failures and `FlowError::Submission` when the collaborator
    /// call fails; in the latter case no state changed and the user may
    /// retry the same question.
    pub async fn submit_answer(
        &mut self,
        question_id: QuestionId,
        choice_id: ChoiceId,
        response_time_ms: u64,
    ) -> Result<AnswerOutcome, FlowError> {
        let session_id = self
            .state
            .session_id()
            .cloned()
            .ok_or(FlowError::NoSession)?;
        if self.state.question(&question_id).is_none() {
            return Err(FlowError::UnknownQuestion {
                id: question_id.as_str().to_owned(),
            });
        }

        let response = self
            .client
            .submit_answer(SubmitRequest {
                session_id: session_id.clone(),
                question_id: question_id.clone(),
                choice_id: choice_id.clone(),
                response_time_ms,
            })
            .await
            .map_err(FlowError::Submission)?;

        self.state.record_answer(AnswerRecord {
            question_id,
            choice_id,
            response_time_ms,
            submitted_at: self.clock.now(),
        });

        let total = self.state.total_questions();
        let (next, server_complete) = next_progress(&response, self.state.answered_index(), total);
        self.state.set_answered_index(next);

        let should_advance = server_complete || next >= total;
        let mut completion_warning = None;
        let mut advanced = false;
        if should_advance && !self.state.stage().is_post_answering() {
            let outcome = self.completion.complete(&session_id).await;
            completion_warning = outcome.warning().cloned();
            self.transition(Stage::AwaitingReport);
            self.persist_stage().await?;
            advanced = true;
        }

        Ok(AnswerOutcome {
            progress: self.state.progress(),
            insight: response.insight,
            tier_signal: response.tier_signal,
            opportunities: response.opportunities,
            advanced,
            completion_warning,
        })
    }

    /// Explicitly finalize the session.
    ///
    /// The stage moves to `AwaitingReport` whatever the collaborator says;
    /// completion failure is a warning, never a blocker.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NoSession` without a session, or
    /// `FlowError::Storage` if the transition cannot be persisted.
    pub async fn complete(&mut self) -> Result<CompletionOutcome, FlowError> {
        let session_id = self
            .state
            .session_id()
            .cloned()
            .ok_or(FlowError::NoSession)?;

        let outcome = self.completion.complete(&session_id).await;
        self.transition(Stage::AwaitingReport);
        self.persist_stage().await?;
        Ok(outcome)
    }

    /// Single serialized entry point for server-pushed events.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Storage` if the terminal transition cannot be
    /// persisted; event payload problems never error.
    pub async fn apply_event(&mut self, event: StreamEvent) -> Result<(), FlowError> {
        match event {
            StreamEvent::Calibration(calibration) => {
                let fresh = self.state.apply_calibration(&calibration);
                debug!(
                    seq = calibration.seq,
                    fresh,
                    cumulative = self.state.calibration().cumulative_count(),
                    "calibration update"
                );
                Ok(())
            }
            StreamEvent::ReportReady(report) => self.apply_report(report).await,
            StreamEvent::StreamError { message } => {
                warn!(%message, "event stream reported an error");
                Ok(())
            }
        }
    }

    async fn apply_report(&mut self, report: ReportResult) -> Result<(), FlowError> {
        if self.state.stage().is_terminal() {
            debug!("duplicate report_ready ignored");
            return Ok(());
        }
        if self.state.stage() != Stage::AwaitingReport {
            // The push channel is authoritative about report existence.
            warn!(stage = %self.state.stage(), "report arrived ahead of local completion");
        }
        self.state.set_report(report);
        self.transition(Stage::Complete);
        self.snapshots.clear().await?;
        info!("session complete, snapshot cleared");
        Ok(())
    }

    fn transition(&mut self, next: Stage) -> Stage {
        let current = self.state.stage();
        let effective = self.state.transition(next);
        if effective != next {
            warn!(current = %current, attempted = %next, "stage regression rejected");
        } else if effective != current {
            info!(from = %current, to = %effective, "stage transition");
        }
        effective
    }

    async fn persist_stage(&self) -> Result<(), FlowError> {
        let snapshot = StageSnapshot::new(self.state.stage(), self.state.session_id().cloned())
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.snapshots.save(&snapshot).await?;
        Ok(())
    }
}

/// Compute the next progress value and the server's completion signal.
///
/// The authoritative pair wins when present; otherwise the local index
/// derives the next value. Both paths clamp into `0..=total`.
fn next_progress(response: &SubmitResponse, local_index: u32, total: u32) -> (u32, bool) {
    match &response.progress {
        Some(progress) => {
            let next = if progress.is_complete {
                total
            } else {
                progress.answers_submitted.saturating_add(1).min(total)
            };
            (next, progress.is_complete)
        }
        None => (local_index.saturating_add(1).min(total), false),
    }
}
