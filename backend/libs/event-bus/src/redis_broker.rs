use crate::{Broker, BrokerError, Result, Subscription};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::{ConnectionManager, PubSub};
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Redis-backed broker.
///
/// Publishing goes through a lazily created [`ConnectionManager`] that is
/// shared by all publishers in the process. Each subscription gets its own
/// dedicated connection because a connection in subscriber mode cannot issue
/// regular commands.
pub struct RedisBroker {
    client: Client,
    publisher: Mutex<Option<ConnectionManager>>,
}

impl RedisBroker {
    /// Parse the URL without touching the network.
    ///
    /// The first connection attempt happens on the first publish or
    /// subscribe, so the process can start while Redis is down.
    pub fn open(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| BrokerError::Connection(format!("invalid REDIS_URL: {e}")))?;

        Ok(Self {
            client,
            publisher: Mutex::new(None),
        })
    }

    async fn publisher(&self) -> Result<ConnectionManager> {
        let mut guard = self.publisher.lock().await;
        if let Some(manager) = guard.as_ref() {
            return Ok(manager.clone());
        }

        let manager = ConnectionManager::new(self.client.clone()).await?;
        info!("Redis publisher connection established");
        *guard = Some(manager.clone());
        Ok(manager)
    }

    async fn reset_publisher(&self) {
        let mut guard = self.publisher.lock().await;
        *guard = None;
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize> {
        let mut conn = self.publisher().await?;

        match conn.publish::<_, _, usize>(channel, payload).await {
            Ok(receivers) => {
                debug!(channel = %channel, receivers, "published message");
                Ok(receivers)
            }
            Err(e) => {
                // Connection-level failures get a fresh manager on the next call.
                if e.is_io_error() || e.is_connection_dropped() {
                    self.reset_publisher().await;
                }
                Err(BrokerError::Publish {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BrokerError::Subscribe {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        info!(channel = %channel, "Subscribed to Redis channel");

        Ok(Box::new(RedisSubscription {
            pubsub,
            channel: channel.to_string(),
        }))
    }
}

/// Dedicated Redis connection in subscriber mode.
pub struct RedisSubscription {
    pubsub: PubSub,
    channel: String,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next_message(&mut self) -> Option<Result<String>> {
        let msg = self.pubsub.on_message().next().await?;
        Some(
            msg.get_payload::<String>()
                .map_err(|e| BrokerError::Payload(e.to_string())),
        )
    }

    async fn close(mut self: Box<Self>) {
        if let Err(e) = self.pubsub.unsubscribe(&self.channel).await {
            warn!(channel = %self.channel, error = %e, "unsubscribe failed, dropping connection");
        }
        debug!(channel = %self.channel, "Redis subscription closed");
    }
}
