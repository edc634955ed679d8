use serde_json::Value;
use tracing::debug;

use super::publisher::{ChannelPublisher, PublishOutcome};
use crate::metrics;
use crate::websocket::{ChatEnvelope, ChatRegistry};

/// What to do with a chat event the broker would not take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackStrategy {
    /// Deliver to recipients connected to this process.
    #[default]
    DeliverLocally,
    Drop,
}

/// Chat fan-out: publishes on the chat channel, owns the chat registry.
#[derive(Clone)]
pub struct ChatHub {
    registry: ChatRegistry,
    publisher: ChannelPublisher,
    fallback: FallbackStrategy,
}

impl ChatHub {
    pub fn new(registry: ChatRegistry, publisher: ChannelPublisher) -> Self {
        Self {
            registry,
            publisher,
            fallback: FallbackStrategy::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn registry(&self) -> &ChatRegistry {
        &self.registry
    }

    /// Publish to the recipients wherever they are connected.
    ///
    /// Recipients on other processes are only reached through the broker;
    /// the local fallback covers this process alone.
    pub async fn publish_to_recipients(
        &self,
        event_type: &str,
        payload: Value,
        recipient_ids: &[String],
    ) -> PublishOutcome {
        let envelope = ChatEnvelope::new(event_type, payload, recipient_ids.to_vec());
        let channel = self.publisher.channel();

        let published = match envelope.to_json() {
            Ok(body) => self.publisher.send(body).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let outcome = match published {
            Ok(receivers) => PublishOutcome::Published { receivers },
            Err(reason) => {
                debug!(channel = %channel, event_type = %event_type, error = %reason, "chat_publish_failed");
                match self.fallback {
                    FallbackStrategy::DeliverLocally => {
                        let recipients = self.registry.dispatch(&envelope).await;
                        debug!(event_type = %event_type, recipients, "chat event delivered locally");
                        PublishOutcome::DeliveredLocally { recipients }
                    }
                    FallbackStrategy::Drop => PublishOutcome::Dropped,
                }
            }
        };

        metrics::record_publish(channel, outcome.label());
        outcome
    }
}
