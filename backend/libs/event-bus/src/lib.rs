//! Pub/Sub broker abstraction shared by every realtime process.
//!
//! Any process can publish a text message on a named channel, and any
//! process can subscribe to a channel and receive every message published
//! after the subscription was established. Delivery is best-effort and
//! at-most-once: messages published while a subscriber is disconnected are
//! never replayed.
//!
//! # Architecture
//!
//! ```text
//! Process A (business logic):
//!   PUBLISH donehr:events {"event_type": "new_application", ...}
//!      ↓
//! Redis Pub/Sub (broadcast to all subscribers)
//!      ↓
//! Process A, B, C (subscriber loops):
//!   route the envelope to locally connected WebSocket clients
//! ```
//!
//! Two implementations are provided:
//! - [`RedisBroker`]: Redis `PUBLISH` / `SUBSCRIBE`, used in production.
//! - [`MemoryBroker`]: in-process `tokio::sync::broadcast` channels, for
//!   single-node runs and tests.

use async_trait::async_trait;

mod error;
mod memory;
mod redis_broker;

pub use error::BrokerError;
pub use memory::MemoryBroker;
pub use redis_broker::{RedisBroker, RedisSubscription};

pub type Result<T> = std::result::Result<T, BrokerError>;

/// A shared channel abstraction available to every process.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Publish `payload` on `channel`.
    ///
    /// Returns the number of subscribers that received the message, as
    /// reported by the broker.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize>;

    /// Open a dedicated subscription on `channel`.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>>;
}

/// A live subscription to a single channel.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message.
    ///
    /// `None` means the underlying connection ended and the subscription
    /// must be re-established.
    async fn next_message(&mut self) -> Option<Result<String>>;

    /// Unsubscribe and release the broker connection.
    async fn close(self: Box<Self>);
}
