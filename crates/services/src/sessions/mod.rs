mod completion;
mod controller;
mod events;
mod flow;
mod guard;
mod history;
mod state;

// Public API of the assessment flow subsystem.
pub use crate::error::FlowError;
pub use completion::{CompletionHandler, CompletionOutcome, CompletionWarning};
pub use controller::{AnswerOutcome, FlowController, StartOutcome};
pub use events::{
    EventSource, EventStreamConsumer, EventSubscription, ReconnectPolicy, StreamEvent,
};
pub use flow::{AssessmentFlow, FlowHandle, FlowStatus};
pub use guard::StartGuard;
pub use history::{AbortSignal, HistoryChecker, PriorSession, ResumeDecision};
pub use state::SessionState;
