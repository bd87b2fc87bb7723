//! Server-push event stream: subscription seam, reconnect policy, and the
//! consumer task that feeds events into the flow's single entry point.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::sessions::flow::FlowHandle;
use wealth_core::model::{CalibrationEvent, ReportResult, SessionId};

/// Decoded event from the per-session push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Calibration(CalibrationEvent),
    ReportReady(ReportResult),
    StreamError { message: String },
}

/// An open subscription to one session's push channel.
#[async_trait]
pub trait EventSubscription: Send {
    /// Next event, `None` when the channel closes cleanly.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` on a broken connection; the consumer treats both
    /// cases as a disconnect and reconnects with backoff.
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, ClientError>;
}

/// Factory for per-session push subscriptions.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a subscription, resuming after `after_seq` when given.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` when the subscription cannot be established.
    async fn subscribe(
        &self,
        session_id: &SessionId,
        after_seq: Option<u64>,
    ) -> Result<Box<dyn EventSubscription>, ClientError>;
}

/// Backoff ladder: 1s, 2s, 5s, 15s, 30s
const BACKOFF_DELAYS: [Duration; 5] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(15),
    Duration::from_secs(30),
];

const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Reconnect policy for the push channel: a delay ladder with jitter,
/// bounded by a consecutive-failure limit, reset on any successful event.
#[derive(Debug)]
pub struct ReconnectPolicy {
    consecutive_failures: u32,
    max_failures: u32,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(max_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_failures,
        }
    }

    /// Delay before the next reconnect attempt, `None` to give up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.consecutive_failures >= self.max_failures {
            return None;
        }
        let idx = (self.consecutive_failures as usize).min(BACKOFF_DELAYS.len() - 1);
        self.consecutive_failures += 1;

        let jitter = rand::rng().random_range(0..250);
        Some(BACKOFF_DELAYS[idx] + Duration::from_millis(jitter))
    }

    /// Reset after a successful delivery.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(MAX_CONSECUTIVE_FAILURES)
    }
}

/// Consumes one session's push channel and forwards every event into the
/// flow handle, so merges stay serialized behind the single writer.
///
/// Delivery is at-least-once: duplicates pass straight through here and are
/// deduplicated by the calibration tally's seq bookkeeping.
pub struct EventStreamConsumer {
    source: Arc<dyn EventSource>,
    handle: FlowHandle,
    session_id: SessionId,
    policy: ReconnectPolicy,
}

impl EventStreamConsumer {
    #[must_use]
    pub fn new(source: Arc<dyn EventSource>, handle: FlowHandle, session_id: SessionId) -> Self {
        Self {
            source,
            handle,
            session_id,
            policy: ReconnectPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run on a background task until the report arrives or the flow closes.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drive the subscription loop to completion.
    pub async fn run(mut self) {
        let mut cursor: Option<u64> = None;

        loop {
            let mut subscription = match self.source.subscribe(&self.session_id, cursor).await {
                Ok(subscription) => subscription,
                Err(error) => {
                    warn!(session_id = %self.session_id, error = %error, "event subscription failed");
                    match self.policy.next_delay() {
                        Some(delay) => {
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        None => {
                            warn!(session_id = %self.session_id, "giving up on event stream");
                            return;
                        }
                    }
                }
            };

            loop {
                match subscription.next_event().await {
                    Ok(Some(event)) => {
                        self.policy.reset();
                        if let StreamEvent::Calibration(calibration) = &event {
                            cursor = Some(cursor.unwrap_or(0).max(calibration.seq));
                        }
                        let terminal = matches!(event, StreamEvent::ReportReady(_));
                        if self.handle.forward_event(event).await.is_err() {
                            debug!(session_id = %self.session_id, "flow closed, stopping consumer");
                            return;
                        }
                        if terminal {
                            debug!(session_id = %self.session_id, "report delivered, stopping consumer");
                            return;
                        }
                    }
                    Ok(None) => {
                        debug!(session_id = %self.session_id, "event stream closed");
                        break;
                    }
                    Err(error) => {
                        warn!(session_id = %self.session_id, error = %error, "event stream error");
                        break;
                    }
                }
            }

            match self.policy.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    warn!(session_id = %self.session_id, "giving up on event stream");
                    return;
                }
            }
        }
    }
}
