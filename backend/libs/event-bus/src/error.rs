//! Error types for broker operations

use thiserror::Error;

/// Broker errors
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Could not open or re-open a connection to the broker
    #[error("broker connection error: {0}")]
    Connection(String),

    /// PUBLISH was rejected or the connection dropped mid-command
    #[error("publish failed on channel {channel}: {reason}")]
    Publish { channel: String, reason: String },

    /// SUBSCRIBE was rejected
    #[error("subscribe failed on channel {channel}: {reason}")]
    Subscribe { channel: String, reason: String },

    /// A message arrived but its payload could not be read as text
    #[error("unreadable payload: {0}")]
    Payload(String),

    /// Operation did not complete in time
    #[error("broker operation timed out after {0} ms")]
    Timeout(u64),

    /// The subscription stream ended
    #[error("subscription closed")]
    Closed,
}

impl BrokerError {
    /// Payload errors concern a single message; everything else means the
    /// subscription itself is unusable.
    pub fn is_per_message(&self) -> bool {
        matches!(self, BrokerError::Payload(_))
    }
}

impl From<redis::RedisError> for BrokerError {
    fn from(e: redis::RedisError) -> Self {
        BrokerError::Connection(e.to_string())
    }
}
