use async_trait::async_trait;
use tracing::debug;

use super::envelope::{ChatEnvelope, EnvelopeError, EventEnvelope, ServerEvent, Target};
use super::registry::{ChatRegistry, MainRegistry};

/// Shorthand role target meaning "every staff role".
pub const HR_ALL: &str = "hr_all";

/// Roles reached by an `hr_all` event.
pub const STAFF_ROLES: [&str; 7] = [
    "hr",
    "hr_admin",
    "hiring_manager",
    "recruiter",
    "superadmin",
    "admin",
    "elite_admin",
];

/// Sink for raw broker messages.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    /// Parse and deliver one message. Errors are per-message and never fatal.
    async fn dispatch_raw(&self, raw: &str) -> Result<(), EnvelopeError>;
}

impl MainRegistry {
    /// Route an envelope to locally connected clients. Returns delivered count.
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> usize {
        let payload = envelope.payload.clone();
        let event_type = envelope.event_type.as_str();

        let delivered = match envelope.target() {
            Target::User(user_id) => {
                usize::from(self.broadcast_to_user(user_id, event_type, payload).await)
            }
            Target::StaffRoles => {
                // One shared frame for every staff room.
                let event = ServerEvent::new(event_type, payload);
                let mut delivered = 0;
                for role in STAFF_ROLES {
                    let members = self.role_members(role).await;
                    delivered += self.fan_out(&members, &event).await;
                }
                delivered
            }
            Target::Role(role) => self.broadcast_to_role(role, event_type, payload).await,
            Target::Everyone => self.broadcast_to_all(event_type, payload).await,
        };

        debug!(event_type = %event_type, target = ?envelope.target(), delivered, "event dispatched");
        delivered
    }
}

#[async_trait]
impl Dispatch for MainRegistry {
    async fn dispatch_raw(&self, raw: &str) -> Result<(), EnvelopeError> {
        let envelope = EventEnvelope::from_json(raw)?;
        self.dispatch(&envelope).await;
        Ok(())
    }
}

impl ChatRegistry {
    /// Deliver to each listed recipient connected here. Returns delivered count.
    pub async fn dispatch(&self, envelope: &ChatEnvelope) -> usize {
        let event = ServerEvent::new(envelope.event_type.as_str(), envelope.payload.clone());
        let delivered = self.fan_out(&envelope.recipients, &event).await;
        debug!(
            event_type = %envelope.event_type,
            recipients = envelope.recipients.len(),
            delivered,
            "chat event dispatched"
        );
        delivered
    }
}

#[async_trait]
impl Dispatch for ChatRegistry {
    async fn dispatch_raw(&self, raw: &str) -> Result<(), EnvelopeError> {
        let envelope = ChatEnvelope::from_json(raw)?;
        self.dispatch(&envelope).await;
        Ok(())
    }
}
