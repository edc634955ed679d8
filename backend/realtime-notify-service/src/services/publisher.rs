use std::sync::Arc;
use std::time::Duration;

use event_bus::{Broker, BrokerError};
use serde::Serialize;

/// What happened to one publish call. Publishing never fails the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Accepted by the broker; `receivers` is its subscriber count.
    Published { receivers: usize },
    /// Broker unavailable, the event is gone.
    Dropped,
    /// Broker unavailable, delivered to connections on this process only.
    DeliveredLocally { recipients: usize },
}

impl PublishOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PublishOutcome::Published { .. } => "published",
            PublishOutcome::Dropped => "dropped",
            PublishOutcome::DeliveredLocally { .. } => "delivered_locally",
        }
    }
}

/// Broker handle bound to a single channel, with a per-call time limit.
#[derive(Clone)]
pub struct ChannelPublisher {
    broker: Arc<dyn Broker>,
    channel: String,
    timeout: Duration,
}

impl ChannelPublisher {
    pub fn new(broker: Arc<dyn Broker>, channel: impl Into<String>, timeout: Duration) -> Self {
        Self {
            broker,
            channel: channel.into(),
            timeout,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish raw text. A broker that does not answer within the time
    /// limit counts as unavailable.
    pub async fn send(&self, payload: String) -> Result<usize, BrokerError> {
        match tokio::time::timeout(self.timeout, self.broker.publish(&self.channel, payload)).await
        {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}
