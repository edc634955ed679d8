use serde_json::Value;
use tracing::debug;

use super::publisher::{ChannelPublisher, PublishOutcome};
use crate::metrics;
use crate::websocket::routing::HR_ALL;
use crate::websocket::EventEnvelope;

/// Fire-and-forget publisher for the main notification stream.
///
/// Every process's subscriber loop (this one included) receives the event
/// and routes it to its own connections. When the broker is unavailable the
/// event is dropped: there is no local fallback on this stream.
#[derive(Clone)]
pub struct EventPublisher {
    publisher: ChannelPublisher,
}

impl EventPublisher {
    pub fn new(publisher: ChannelPublisher) -> Self {
        Self { publisher }
    }

    pub async fn publish(
        &self,
        event_type: &str,
        payload: Value,
        target_role: Option<&str>,
        target_user_id: Option<&str>,
    ) -> PublishOutcome {
        let mut envelope = EventEnvelope::new(event_type, payload);
        envelope.target_role = target_role.map(str::to_string);
        envelope.target_user_id = target_user_id.map(str::to_string);
        self.publish_envelope(&envelope).await
    }

    pub async fn publish_envelope(&self, envelope: &EventEnvelope) -> PublishOutcome {
        let channel = self.publisher.channel();
        let outcome = match envelope.to_json() {
            Ok(body) => match self.publisher.send(body).await {
                Ok(receivers) => PublishOutcome::Published { receivers },
                Err(e) => {
                    debug!(channel = %channel, event_type = %envelope.event_type, error = %e, "emit_event_failed");
                    PublishOutcome::Dropped
                }
            },
            Err(e) => {
                debug!(event_type = %envelope.event_type, error = %e, "event serialization failed");
                PublishOutcome::Dropped
            }
        };

        metrics::record_publish(channel, outcome.label());
        outcome
    }

    pub async fn notify_user(&self, user_id: &str, event_type: &str, payload: Value) -> PublishOutcome {
        self.publish(event_type, payload, None, Some(user_id)).await
    }

    pub async fn notify_role(&self, role: &str, event_type: &str, payload: Value) -> PublishOutcome {
        self.publish(event_type, payload, Some(role), None).await
    }

    /// Reach every staff role at once.
    pub async fn notify_hr_all(&self, event_type: &str, payload: Value) -> PublishOutcome {
        self.publish(event_type, payload, Some(HR_ALL), None).await
    }

    pub async fn broadcast(&self, event_type: &str, payload: Value) -> PublishOutcome {
        self.publish(event_type, payload, None, None).await
    }
}
