use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use super::chat_hub::ChatHub;
use super::chat_store::{ChatStore, NewMessage};
use super::publisher::PublishOutcome;
use crate::websocket::message_types::ChatCommand;

const ANONYMOUS_TYPIST: &str = "Someone";

/// Executes commands received on a chat socket on behalf of `user_id`.
///
/// Failures never close the socket. A failed `send` is reported back to the
/// sender as an `error` event; `typing` and `read` failures are only logged.
#[derive(Clone)]
pub struct ChatCommandHandler {
    hub: ChatHub,
    store: Arc<dyn ChatStore>,
}

impl ChatCommandHandler {
    pub fn new(hub: ChatHub, store: Arc<dyn ChatStore>) -> Self {
        Self { hub, store }
    }

    /// Returns the publish outcome for commands that fan out.
    pub async fn handle(&self, user_id: &str, command: ChatCommand) -> Option<PublishOutcome> {
        match command {
            ChatCommand::Send {
                conversation_id,
                content,
                reply_to_id,
            } => {
                let message = NewMessage {
                    conversation_id,
                    content: content.trim().to_string(),
                    reply_to_id: reply_to_id.filter(|id| !id.is_empty()),
                };
                self.send(user_id, message).await
            }
            ChatCommand::Typing { conversation_id } => self.typing(user_id, &conversation_id).await,
            ChatCommand::Read { conversation_id } => {
                self.read(user_id, &conversation_id).await;
                None
            }
            // Answered by the session itself.
            ChatCommand::Ping => None,
        }
    }

    async fn send(&self, user_id: &str, message: NewMessage) -> Option<PublishOutcome> {
        if message.conversation_id.is_empty() || message.content.is_empty() {
            return None;
        }
        let conversation_id = message.conversation_id.clone();

        let stored = match self.store.create_message(user_id, message).await {
            Ok(payload) => match self.store.participant_ids(&conversation_id).await {
                Ok(recipients) => Ok((payload, recipients)),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match stored {
            Ok((payload, recipients)) => Some(
                self.hub
                    .publish_to_recipients("new_message", payload, &recipients)
                    .await,
            ),
            Err(e) => {
                warn!(sender_id = %user_id, conversation_id = %conversation_id, error = %e, "ws_send_error");
                self.hub
                    .registry()
                    .broadcast_to_user(user_id, "error", json!({ "detail": e.to_string() }))
                    .await;
                None
            }
        }
    }

    async fn typing(&self, user_id: &str, conversation_id: &str) -> Option<PublishOutcome> {
        if conversation_id.is_empty() {
            return None;
        }

        let recipients = match self.store.participant_ids(conversation_id).await {
            Ok(ids) => ids.into_iter().filter(|id| id != user_id).collect::<Vec<_>>(),
            Err(e) => {
                debug!(sender_id = %user_id, error = %e, "ws_typing_error");
                return None;
            }
        };
        let user_name = match self.store.display_name(user_id).await {
            Ok(Some(name)) => name,
            Ok(None) => ANONYMOUS_TYPIST.to_string(),
            Err(e) => {
                debug!(sender_id = %user_id, error = %e, "ws_typing_error");
                return None;
            }
        };

        let payload = json!({
            "conversation_id": conversation_id,
            "user_id": user_id,
            "user_name": user_name,
        });
        Some(
            self.hub
                .publish_to_recipients("typing", payload, &recipients)
                .await,
        )
    }

    async fn read(&self, user_id: &str, conversation_id: &str) {
        if conversation_id.is_empty() {
            return;
        }
        if let Err(e) = self.store.mark_conversation_read(user_id, conversation_id).await {
            debug!(user_id = %user_id, conversation_id = %conversation_id, error = %e, "ws_read_error");
        }
    }
}
