/// Wire formats for server-originated events.
///
/// Three shapes exist:
/// - `ServerEvent`: what a WebSocket client receives
/// - `EventEnvelope`: what travels on the events channel (adds routing targets)
/// - `ChatEnvelope`: what travels on the chat channel (adds the recipient list)
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::routing::HR_ALL;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

fn empty_payload() -> Value {
    Value::Object(Default::default())
}

/// Broker timestamps are informational only; routing never reads them.
///
/// Accepts RFC 3339, offset-less ISO-8601 (read as UTC) and `null`.
/// Anything else is stamped with the receive time.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let parsed = match raw {
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                text.parse::<NaiveDateTime>()
                    .ok()
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
        _ => None,
    };
    Ok(parsed.unwrap_or_else(Utc::now))
}

/// Event pushed to a connected client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerEvent {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl ServerEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload: Some(payload),
            timestamp: Utc::now(),
        }
    }

    /// Heartbeat event, carries no payload
    pub fn ping() -> Self {
        Self {
            event_type: "ping".to_string(),
            payload: None,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Who an `EventEnvelope` is addressed to, in dispatch precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    User(&'a str),
    StaffRoles,
    Role(&'a str),
    Everyone,
}

/// Envelope published on the events channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub event_type: String,
    #[serde(default = "empty_payload")]
    pub payload: Value,
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub target_user_id: Option<String>,
    #[serde(default)]
    pub target_role: Option<String>,
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            target_user_id: None,
            target_role: None,
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.target_user_id = Some(user_id.into());
        self
    }

    pub fn for_role(mut self, role: impl Into<String>) -> Self {
        self.target_role = Some(role.into());
        self
    }

    /// Resolve the routing target.
    ///
    /// A user target always wins over a role target, so a 1:1 notification
    /// can never be widened by a stray role field. Empty strings count as
    /// unset.
    pub fn target(&self) -> Target<'_> {
        let user = self.target_user_id.as_deref().filter(|s| !s.is_empty());
        let role = self.target_role.as_deref().filter(|s| !s.is_empty());

        match (user, role) {
            (Some(user_id), _) => Target::User(user_id),
            (None, Some(HR_ALL)) => Target::StaffRoles,
            (None, Some(role)) => Target::Role(role),
            (None, None) => Target::Everyone,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Envelope published on the chat channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatEnvelope {
    pub event_type: String,
    #[serde(default = "empty_payload")]
    pub payload: Value,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl ChatEnvelope {
    pub fn new(event_type: impl Into<String>, payload: Value, recipients: Vec<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            recipients,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(json)?)
    }
}
