#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod sessions;

pub use wealth_core::Clock;

pub use client::{
    Ack, AssessmentClient, ClientError, HistoryEntry, HistoryRequest, HttpAssessmentClient,
    HttpClientConfig, HttpEventSource, InMemoryAssessmentClient, InMemoryEventSource,
    OpportunityHint, ServerProgress, SessionStatus, StartRequest, StartResponse, SubmitRequest,
    SubmitResponse,
};
pub use error::FlowError;

pub use sessions::{
    AbortSignal, AnswerOutcome, AssessmentFlow, CompletionHandler, CompletionOutcome,
    CompletionWarning, EventSource, EventStreamConsumer, EventSubscription, FlowController,
    FlowHandle, FlowStatus, HistoryChecker, PriorSession, ReconnectPolicy, ResumeDecision,
    SessionState, StartGuard, StartOutcome, StreamEvent,
};
