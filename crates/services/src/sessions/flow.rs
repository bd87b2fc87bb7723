//! Single-consumer command queue around the flow controller.
//!
//! Every writer — user-triggered calls and the event-stream consumer —
//! enqueues an intent; one task owns the controller and applies commands in
//! arrival order. Racing asynchronous effects can no longer interleave
//! writes, without any locks.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::FlowError;
use crate::sessions::completion::CompletionOutcome;
use crate::sessions::controller::{AnswerOutcome, FlowController, StartOutcome};
use crate::sessions::events::StreamEvent;
use wealth_core::model::{ChoiceId, Progress, QuestionId, ReportResult, SessionId, Stage, UserId};

const COMMAND_BUFFER: usize = 32;

enum Command {
    ConfirmIntro {
        reply: oneshot::Sender<Result<Stage, FlowError>>,
    },
    Start {
        user_id: UserId,
        email: String,
        reply: oneshot::Sender<Result<StartOutcome, FlowError>>,
    },
    SubmitAnswer {
        question_id: QuestionId,
        choice_id: ChoiceId,
        response_time_ms: u64,
        reply: oneshot::Sender<Result<AnswerOutcome, FlowError>>,
    },
    Complete {
        reply: oneshot::Sender<Result<CompletionOutcome, FlowError>>,
    },
    StreamEvent {
        event: StreamEvent,
    },
    Status {
        reply: oneshot::Sender<FlowStatus>,
    },
}

/// Read-only view of the flow for observers.
#[derive(Debug, Clone)]
pub struct FlowStatus {
    pub stage: Stage,
    pub session_id: Option<SessionId>,
    pub progress: Progress,
    pub calibration_count: u64,
    pub report: Option<ReportResult>,
}

/// The running flow task.
pub struct AssessmentFlow {
    controller: FlowController,
    commands: mpsc::Receiver<Command>,
}

impl AssessmentFlow {
    /// Spawn the command loop and return its handle.
    #[must_use]
    pub fn spawn(controller: FlowController) -> (FlowHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let flow = Self {
            controller,
            commands: rx,
        };
        let task = tokio::spawn(flow.run());
        (FlowHandle { commands: tx }, task)
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::ConfirmIntro { reply } => {
                    let _ = reply.send(self.controller.confirm_intro().await);
                }
                Command::Start {
                    user_id,
                    email,
                    reply,
                } => {
                    let _ = reply.send(self.controller.start(user_id, email).await);
                }
                Command::SubmitAnswer {
                    question_id,
                    choice_id,
                    response_time_ms,
                    reply,
                } => {
                    let _ = reply.send(
                        self.controller
                            .submit_answer(question_id, choice_id, response_time_ms)
                            .await,
                    );
                }
                Command::Complete { reply } => {
                    let _ = reply.send(self.controller.complete().await);
                }
                Command::StreamEvent { event } => {
                    // Merge failures are recovered locally; the stream must
                    // never stall the command loop.
                    if let Err(error) = self.controller.apply_event(event).await {
                        debug!(%error, "event merge failed");
                    }
                }
                Command::Status { reply } => {
                    let state = self.controller.state();
                    let _ = reply.send(FlowStatus {
                        stage: state.stage(),
                        session_id: state.session_id().cloned(),
                        progress: state.progress(),
                        calibration_count: state.calibration().cumulative_count(),
                        report: state.report().cloned(),
                    });
                }
            }
        }
        debug!("flow command loop finished");
    }
}

/// Cheaply cloneable writer handle to the flow task.
#[derive(Clone)]
pub struct FlowHandle {
    commands: mpsc::Sender<Command>,
}

impl FlowHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, FlowError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| FlowError::FlowClosed)?;
        rx.await.map_err(|_| FlowError::FlowClosed)
    }

    /// # Errors
    ///
    /// Returns `FlowError::FlowClosed` if the flow task is gone, or the
    /// controller's error.
    pub async fn confirm_intro(&self) -> Result<Stage, FlowError> {
        self.request(|reply| Command::ConfirmIntro { reply }).await?
    }

    /// # Errors
    ///
    /// Returns `FlowError::FlowClosed` if the flow task is gone, or the
    /// controller's error.
    pub async fn start(&self, user_id: UserId, email: String) -> Result<StartOutcome, FlowError> {
        self.request(|reply| Command::Start {
            user_id,
            email,
            reply,
        })
        .await?
    }

    /// # Errors
    ///
    /// Returns `FlowError::FlowClosed` if the flow task is gone, or the
    /// controller's error.
    pub async fn submit_answer(
        &self,
        question_id: QuestionId,
        choice_id: ChoiceId,
        response_time_ms: u64,
    ) -> Result<AnswerOutcome, FlowError> {
        self.request(|reply| Command::SubmitAnswer {
            question_id,
            choice_id,
            response_time_ms,
            reply,
        })
        .await?
    }

    /// # Errors
    ///
    /// Returns `FlowError::FlowClosed` if the flow task is gone, or the
    /// controller's error.
    pub async fn complete(&self) -> Result<CompletionOutcome, FlowError> {
        self.request(|reply| Command::Complete { reply }).await?
    }

    /// Enqueue a pushed event; used by the event-stream consumer.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::FlowClosed` if the flow task is gone.
    pub async fn forward_event(&self, event: StreamEvent) -> Result<(), FlowError> {
        self.commands
            .send(Command::StreamEvent { event })
            .await
            .map_err(|_| FlowError::FlowClosed)
    }

    /// # Errors
    ///
    /// Returns `FlowError::FlowClosed` if the flow task is gone.
    pub async fn status(&self) -> Result<FlowStatus, FlowError> {
        self.request(|reply| Command::Status { reply }).await
    }
}
