use std::sync::Arc;
use std::time::Duration;

use event_bus::{Broker, Subscription};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::routing::Dispatch;
use crate::metrics;
use crate::shutdown::ShutdownListener;

/// Lifecycle of a subscriber loop, observable through [`SubscriberLoop::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberState {
    Idle,
    Connecting,
    Subscribed,
    Dispatching,
    Backoff,
    Cancelled,
    Terminated,
}

enum Exit {
    Lost,
    Cancelled,
}

/// Bridges one broker channel into a local dispatcher.
///
/// Runs until shutdown. Broker failures never escape: the subscription is
/// dropped, the loop waits `backoff`, then subscribes again. Malformed
/// messages are logged and skipped. Messages published while the loop is
/// between subscriptions are lost.
pub struct SubscriberLoop<D: Dispatch> {
    broker: Arc<dyn Broker>,
    channel: String,
    dispatcher: D,
    backoff: Duration,
    state: watch::Sender<SubscriberState>,
}

impl<D: Dispatch> SubscriberLoop<D> {
    pub fn new(
        broker: Arc<dyn Broker>,
        channel: impl Into<String>,
        dispatcher: D,
        backoff: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SubscriberState::Idle);
        Self {
            broker,
            channel: channel.into(),
            dispatcher,
            backoff,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<SubscriberState> {
        self.state.subscribe()
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: ShutdownListener) {
        info!(channel = %self.channel, "subscriber loop started");

        loop {
            self.set_state(SubscriberState::Connecting);

            let subscribed = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                result = self.broker.subscribe(&self.channel) => result,
            };

            match subscribed {
                Ok(mut subscription) => {
                    self.set_state(SubscriberState::Subscribed);
                    info!(channel = %self.channel, "subscriber listening");

                    let exit = self.consume(subscription.as_mut(), &mut shutdown).await;
                    subscription.close().await;
                    if let Exit::Cancelled = exit {
                        break;
                    }
                }
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "subscribe failed");
                }
            }

            self.set_state(SubscriberState::Backoff);
            metrics::record_subscriber_reconnect(&self.channel);
            debug!(channel = %self.channel, backoff_ms = self.backoff.as_millis() as u64, "subscriber backing off");

            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }

        self.set_state(SubscriberState::Cancelled);
        info!(channel = %self.channel, "subscriber loop cancelled");
        self.set_state(SubscriberState::Terminated);
    }

    async fn consume(
        &self,
        subscription: &mut dyn Subscription,
        shutdown: &mut ShutdownListener,
    ) -> Exit {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.wait() => return Exit::Cancelled,
                next = subscription.next_message() => next,
            };

            match next {
                Some(Ok(raw)) => {
                    self.set_state(SubscriberState::Dispatching);
                    match self.dispatcher.dispatch_raw(&raw).await {
                        Ok(()) => metrics::record_dispatched(&self.channel),
                        Err(e) => {
                            warn!(channel = %self.channel, error = %e, "skipping malformed message");
                            metrics::record_malformed(&self.channel);
                        }
                    }
                    self.set_state(SubscriberState::Subscribed);
                }
                Some(Err(e)) if e.is_per_message() => {
                    warn!(channel = %self.channel, error = %e, "skipping unreadable message");
                    metrics::record_malformed(&self.channel);
                }
                Some(Err(e)) => {
                    warn!(channel = %self.channel, error = %e, "subscription failed");
                    return Exit::Lost;
                }
                None => {
                    warn!(channel = %self.channel, "subscription ended");
                    return Exit::Lost;
                }
            }
        }
    }

    fn set_state(&self, state: SubscriberState) {
        self.state.send_replace(state);
    }
}
