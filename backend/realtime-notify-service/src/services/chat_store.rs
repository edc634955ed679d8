/// Chat persistence used by the chat WebSocket commands.
///
/// Only the operations the socket needs live here: unread totals for the
/// connect greeting, membership for fan-out, message creation, and read
/// receipts. History, editing and moderation belong to the HTTP API.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ChatStoreError {
    #[error("Not a participant of this conversation")]
    NotParticipant,

    #[error("You are banned from chat")]
    Banned,

    #[error("Message must have content")]
    EmptyMessage,

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for ChatStoreError {
    fn from(e: sqlx::Error) -> Self {
        ChatStoreError::Database(e.to_string())
    }
}

/// A message about to be stored. `content` is already trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: String,
    pub content: String,
    pub reply_to_id: Option<String>,
}

#[async_trait]
pub trait ChatStore: Send + Sync + 'static {
    /// Unread messages across every conversation of `user_id`.
    async fn total_unread(&self, user_id: &str) -> Result<i64, ChatStoreError>;

    async fn participant_ids(&self, conversation_id: &str) -> Result<Vec<String>, ChatStoreError>;

    async fn display_name(&self, user_id: &str) -> Result<Option<String>, ChatStoreError>;

    /// Store the message and return its client representation.
    async fn create_message(
        &self,
        sender_id: &str,
        message: NewMessage,
    ) -> Result<Value, ChatStoreError>;

    async fn mark_conversation_read(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<(), ChatStoreError>;
}

fn parse_id(raw: &str) -> Result<Uuid, ChatStoreError> {
    Uuid::parse_str(raw).map_err(|_| ChatStoreError::InvalidId(raw.to_string()))
}

fn message_json(
    id: &str,
    message: &NewMessage,
    sender_id: &str,
    sender_name: &str,
    sender_role: &str,
    created_at: DateTime<Utc>,
) -> Value {
    json!({
        "id": id,
        "conversation_id": message.conversation_id,
        "sender_id": sender_id,
        "sender_name": sender_name,
        "sender_role": sender_role,
        "content": message.content,
        "message_type": "text",
        "reply_to_id": message.reply_to_id,
        "is_edited": false,
        "is_deleted": false,
        "reactions": [],
        "read_by_count": 0,
        "created_at": created_at,
    })
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn is_participant(&self, conversation: Uuid, user: Uuid) -> Result<bool, ChatStoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM conversation_participants
                WHERE conversation_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(conversation)
        .bind(user)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn total_unread(&self, user_id: &str) -> Result<i64, ChatStoreError> {
        let user_id = parse_id(user_id)?;

        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(m.id)
            FROM chat_messages m
            JOIN conversation_participants p
              ON p.conversation_id = m.conversation_id
             AND p.user_id = $1
             AND p.is_archived = FALSE
            WHERE m.sender_id <> $1
              AND m.is_deleted = FALSE
              AND NOT EXISTS (
                  SELECT 1 FROM chat_message_reads r
                  WHERE r.message_id = m.id AND r.user_id = $1
              )
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn participant_ids(&self, conversation_id: &str) -> Result<Vec<String>, ChatStoreError> {
        let conversation_id = parse_id(conversation_id)?;

        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }

    async fn display_name(&self, user_id: &str) -> Result<Option<String>, ChatStoreError> {
        let user_id = parse_id(user_id)?;

        let name = sqlx::query_scalar::<_, Option<String>>(
            "SELECT full_name FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(name.flatten())
    }

    async fn create_message(
        &self,
        sender_id: &str,
        message: NewMessage,
    ) -> Result<Value, ChatStoreError> {
        if message.content.is_empty() {
            return Err(ChatStoreError::EmptyMessage);
        }
        let sender = parse_id(sender_id)?;
        let conversation = parse_id(&message.conversation_id)?;
        let reply_to = message.reply_to_id.as_deref().map(parse_id).transpose()?;

        if !self.is_participant(conversation, sender).await? {
            return Err(ChatStoreError::NotParticipant);
        }

        let is_banned = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM chat_bans
                WHERE user_id = $1
                  AND is_active = TRUE
                  AND (banned_until IS NULL OR banned_until > NOW())
            )
            "#,
        )
        .bind(sender)
        .fetch_one(&self.pool)
        .await?;
        if is_banned {
            return Err(ChatStoreError::Banned);
        }

        let mut tx = self.pool.begin().await?;

        let (id, created_at) = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            r#"
            INSERT INTO chat_messages (id, conversation_id, sender_id, content, message_type, reply_to_id)
            VALUES ($1, $2, $3, $4, 'text', $5)
            RETURNING id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation)
        .bind(sender)
        .bind(&message.content)
        .bind(reply_to)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation)
            .execute(&mut *tx)
            .await?;

        let sender_row = sqlx::query_as::<_, (Option<String>, String)>(
            "SELECT full_name, role::text FROM users WHERE id = $1",
        )
        .bind(sender)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        let (sender_name, sender_role) = match sender_row {
            Some((name, role)) => (name.unwrap_or_else(|| "Unknown".into()), role),
            None => ("Unknown".into(), "unknown".into()),
        };

        Ok(message_json(
            &id.to_string(),
            &message,
            sender_id,
            &sender_name,
            &sender_role,
            created_at,
        ))
    }

    async fn mark_conversation_read(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<(), ChatStoreError> {
        let user = parse_id(user_id)?;
        let conversation = parse_id(conversation_id)?;
        if !self.is_participant(conversation, user).await? {
            return Err(ChatStoreError::NotParticipant);
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chat_message_reads (id, message_id, user_id)
            SELECT gen_random_uuid(), m.id, $2
            FROM chat_messages m
            WHERE m.conversation_id = $1 AND m.sender_id <> $2
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(conversation)
        .bind(user)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE conversation_participants
            SET last_read_at = NOW()
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation)
        .bind(user)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, (String, String)>,
    participants: HashMap<String, Vec<String>>,
    banned: HashSet<String>,
    /// (conversation_id, sender_id, message_id)
    messages: Vec<(String, String, String)>,
    reads: HashSet<(String, String)>,
}

/// In-process store for single-node runs and tests.
#[derive(Clone, Default)]
pub struct MemoryChatStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: &str, full_name: &str, role: &str) {
        let mut state = self.state.lock().await;
        state
            .users
            .insert(user_id.to_string(), (full_name.to_string(), role.to_string()));
    }

    pub async fn add_conversation(&self, conversation_id: &str, participants: &[&str]) {
        let mut state = self.state.lock().await;
        state.participants.insert(
            conversation_id.to_string(),
            participants.iter().map(|p| p.to_string()).collect(),
        );
    }

    pub async fn ban(&self, user_id: &str) {
        self.state.lock().await.banned.insert(user_id.to_string());
    }

    pub async fn message_count(&self, conversation_id: &str) -> usize {
        let state = self.state.lock().await;
        state
            .messages
            .iter()
            .filter(|(conv, _, _)| conv == conversation_id)
            .count()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn total_unread(&self, user_id: &str) -> Result<i64, ChatStoreError> {
        let state = self.state.lock().await;
        let unread = state
            .messages
            .iter()
            .filter(|(conv, sender, id)| {
                sender != user_id
                    && state
                        .participants
                        .get(conv)
                        .map(|members| members.iter().any(|m| m == user_id))
                        .unwrap_or(false)
                    && !state.reads.contains(&(id.clone(), user_id.to_string()))
            })
            .count();
        Ok(unread as i64)
    }

    async fn participant_ids(&self, conversation_id: &str) -> Result<Vec<String>, ChatStoreError> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn display_name(&self, user_id: &str) -> Result<Option<String>, ChatStoreError> {
        let state = self.state.lock().await;
        Ok(state.users.get(user_id).map(|(name, _)| name.clone()))
    }

    async fn create_message(
        &self,
        sender_id: &str,
        message: NewMessage,
    ) -> Result<Value, ChatStoreError> {
        if message.content.is_empty() {
            return Err(ChatStoreError::EmptyMessage);
        }
        let mut state = self.state.lock().await;

        let is_participant = state
            .participants
            .get(&message.conversation_id)
            .map(|members| members.iter().any(|m| m == sender_id))
            .unwrap_or(false);
        if !is_participant {
            return Err(ChatStoreError::NotParticipant);
        }
        if state.banned.contains(sender_id) {
            return Err(ChatStoreError::Banned);
        }

        let id = Uuid::new_v4().to_string();
        state.messages.push((
            message.conversation_id.clone(),
            sender_id.to_string(),
            id.clone(),
        ));
        let (name, role) = state
            .users
            .get(sender_id)
            .cloned()
            .unwrap_or_else(|| ("Unknown".into(), "unknown".into()));

        Ok(message_json(&id, &message, sender_id, &name, &role, Utc::now()))
    }

    async fn mark_conversation_read(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<(), ChatStoreError> {
        let mut state = self.state.lock().await;
        let is_participant = state
            .participants
            .get(conversation_id)
            .map(|members| members.iter().any(|m| m == user_id))
            .unwrap_or(false);
        if !is_participant {
            return Err(ChatStoreError::NotParticipant);
        }
        let unread: Vec<String> = state
            .messages
            .iter()
            .filter(|(conv, sender, _)| conv == conversation_id && sender != user_id)
            .map(|(_, _, id)| id.clone())
            .collect();
        for id in unread {
            state.reads.insert((id, user_id.to_string()));
        }
        Ok(())
    }
}
