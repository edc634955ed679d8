use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::registry::{ConnectionId, ConnectionIndex, ConnectionRegistry};
use crate::shutdown::ShutdownListener;

/// Per-connection keepalive.
///
/// Sends a `ping` event every `interval` while the registration is current.
/// Ends on the first failed send (the registry has released the connection
/// by then), when the registration is superseded, on shutdown, or when the
/// handle is dropped.
pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub fn spawn<I: ConnectionIndex>(
        registry: ConnectionRegistry<I>,
        user_id: String,
        connection_id: ConnectionId,
        interval: Duration,
        mut shutdown: ShutdownListener,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => break,
                    _ = ticker.tick() => {
                        if !registry.ping(&user_id, connection_id).await {
                            debug!(registry = registry.name(), user_id = %user_id, "heartbeat stopped");
                            break;
                        }
                    }
                }
            }
        });

        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
