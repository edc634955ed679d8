use crate::{Broker, Result, Subscription};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

/// Capacity of each channel. Subscribers that fall behind skip messages.
const CHANNEL_CAPACITY: usize = 1024;

/// In-process broker backed by `tokio::sync::broadcast`.
///
/// Cloning shares the same set of channels, so a clone handed to another
/// task behaves like another process attached to the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Number of live subscriptions on `channel`.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.channels.lock().await;
        channels
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize> {
        let tx = self.sender(channel).await;
        // send() fails only when nobody is subscribed, which Redis reports as 0.
        Ok(tx.send(payload).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>> {
        let rx = self.sender(channel).await.subscribe();
        Ok(Box::new(MemorySubscription {
            rx,
            channel: channel.to_string(),
        }))
    }
}

struct MemorySubscription {
    rx: broadcast::Receiver<String>,
    channel: String,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_message(&mut self) -> Option<Result<String>> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(Ok(payload)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn close(self: Box<Self>) {}
}
