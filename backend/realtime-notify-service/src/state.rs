use std::sync::Arc;

use event_bus::Broker;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::middleware::TokenValidator;
use crate::services::{
    ChannelPublisher, ChatCommandHandler, ChatHub, ChatStore, EventPublisher, NotificationService,
};
use crate::shutdown::Shutdown;
use crate::websocket::{ChatRegistry, MainRegistry, SubscriberLoop, SubscriberState};

/// Observers of the two subscriber loops.
#[derive(Clone)]
pub struct SubscriberStates {
    pub events: watch::Receiver<SubscriberState>,
    pub chat: watch::Receiver<SubscriberState>,
}

/// The two broker bridges of a process, built but not yet running.
pub struct SubscriberLoops {
    events: SubscriberLoop<MainRegistry>,
    chat: SubscriberLoop<ChatRegistry>,
}

impl SubscriberLoops {
    pub fn spawn(self, shutdown: &Shutdown) -> [JoinHandle<()>; 2] {
        [
            self.events.spawn(shutdown.listener()),
            self.chat.spawn(shutdown.listener()),
        ]
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: MainRegistry,
    pub chat: ChatHub,
    pub chat_commands: ChatCommandHandler,
    pub notifications: NotificationService,
    pub validator: Arc<dyn TokenValidator>,
    pub subscribers: SubscriberStates,
    pub shutdown: Shutdown,
}

impl AppState {
    /// Wire registries, publishers and subscriber loops around one broker.
    pub fn build(
        config: Arc<Config>,
        broker: Arc<dyn Broker>,
        chat_store: Arc<dyn ChatStore>,
        validator: Arc<dyn TokenValidator>,
    ) -> (Self, SubscriberLoops) {
        let registry = MainRegistry::new("main");
        let chat_registry = ChatRegistry::new("chat");

        let events = EventPublisher::new(ChannelPublisher::new(
            broker.clone(),
            config.events_channel.clone(),
            config.publish_timeout,
        ));
        let chat = ChatHub::new(
            chat_registry.clone(),
            ChannelPublisher::new(
                broker.clone(),
                config.chat_channel.clone(),
                config.publish_timeout,
            ),
        );

        let events_loop = SubscriberLoop::new(
            broker.clone(),
            config.events_channel.clone(),
            registry.clone(),
            config.subscriber_backoff,
        );
        let chat_loop = SubscriberLoop::new(
            broker,
            config.chat_channel.clone(),
            chat_registry,
            config.subscriber_backoff,
        );

        let state = Self {
            subscribers: SubscriberStates {
                events: events_loop.state(),
                chat: chat_loop.state(),
            },
            chat_commands: ChatCommandHandler::new(chat.clone(), chat_store.clone()),
            notifications: NotificationService::new(events, chat_store),
            config,
            registry,
            chat,
            validator,
            shutdown: Shutdown::new(),
        };

        (
            state,
            SubscriberLoops {
                events: events_loop,
                chat: chat_loop,
            },
        )
    }

    pub fn chat_registry(&self) -> &ChatRegistry {
        self.chat.registry()
    }
}
