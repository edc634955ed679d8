pub mod chat_commands;
pub mod chat_hub;
pub mod chat_store;
pub mod event_publisher;
pub mod notification_service;
pub mod publisher;

pub use chat_commands::ChatCommandHandler;
pub use chat_hub::{ChatHub, FallbackStrategy};
pub use chat_store::{ChatStore, ChatStoreError, MemoryChatStore, NewMessage, PgChatStore};
pub use event_publisher::EventPublisher;
pub use notification_service::NotificationService;
pub use publisher::{ChannelPublisher, PublishOutcome};
