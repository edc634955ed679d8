/// Connection Registry
///
/// Tracks the live WebSocket connection of every user attached to this
/// process. One connection per user: a new connection for the same user
/// replaces the old one, whose transport is dropped.
///
/// The registry is generic over a secondary index:
/// - `RoleIndex` keeps role rooms for the main notification stream
/// - `DirectIndex` keeps nothing, chat only ever addresses users
///
/// All fan-out snapshots the target user ids under the lock and sends
/// outside of it, so a slow transport never blocks connect/disconnect.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::envelope::ServerEvent;
use super::transport::Transport;
use crate::metrics;

/// Unique identifier of one registration.
///
/// Guards releases: a session tearing down only removes the registration it
/// created, never a newer one for the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone)]
struct Connection {
    id: ConnectionId,
    transport: Arc<dyn Transport>,
}

/// Secondary index maintained alongside the connection map.
pub trait ConnectionIndex: Default + Send + Sync + 'static {
    type Key: ?Sized + Sync;

    fn insert(&mut self, user_id: &str, key: &Self::Key);

    /// Drop every trace of `user_id`.
    fn remove(&mut self, user_id: &str);
}

/// Role rooms: role name -> user ids.
#[derive(Debug, Default)]
pub struct RoleIndex {
    rooms: HashMap<String, HashSet<String>>,
}

impl RoleIndex {
    fn members(&self, role: &str) -> Vec<String> {
        self.rooms
            .get(role)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn role_of(&self, user_id: &str) -> Option<String> {
        self.rooms
            .iter()
            .find(|(_, members)| members.contains(user_id))
            .map(|(role, _)| role.clone())
    }
}

impl ConnectionIndex for RoleIndex {
    type Key = str;

    fn insert(&mut self, user_id: &str, role: &str) {
        self.rooms
            .entry(role.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    fn remove(&mut self, user_id: &str) {
        for members in self.rooms.values_mut() {
            members.remove(user_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());
    }
}

/// No secondary index.
#[derive(Debug, Default)]
pub struct DirectIndex;

impl ConnectionIndex for DirectIndex {
    type Key = ();

    fn insert(&mut self, _user_id: &str, _key: &()) {}

    fn remove(&mut self, _user_id: &str) {}
}

struct RegistryState<I> {
    connections: HashMap<String, Connection>,
    index: I,
}

pub struct ConnectionRegistry<I: ConnectionIndex> {
    name: &'static str,
    state: Arc<RwLock<RegistryState<I>>>,
}

/// Registry behind `/ws`, with role rooms.
pub type MainRegistry = ConnectionRegistry<RoleIndex>;

/// Registry behind `/ws/chat`, per-user only.
pub type ChatRegistry = ConnectionRegistry<DirectIndex>;

impl<I: ConnectionIndex> Clone for ConnectionRegistry<I> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            state: Arc::clone(&self.state),
        }
    }
}

impl<I: ConnectionIndex> ConnectionRegistry<I> {
    /// `name` labels log lines and metrics ("main", "chat").
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(RwLock::new(RegistryState {
                connections: HashMap::new(),
                index: I::default(),
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Insert or replace the connection for `user_id`.
    ///
    /// Any previous index entries for the user are cleared first, so a
    /// reconnect under a different role leaves no stale room membership.
    pub(crate) async fn register(
        &self,
        transport: Arc<dyn Transport>,
        user_id: &str,
        key: &I::Key,
    ) -> ConnectionId {
        let id = ConnectionId::new();
        let mut state = self.state.write().await;

        state.index.remove(user_id);
        let replaced = state
            .connections
            .insert(user_id.to_string(), Connection { id, transport })
            .is_some();
        state.index.insert(user_id, key);

        let total = state.connections.len();
        drop(state);

        metrics::set_active_connections(self.name, total);
        info!(
            registry = self.name,
            user_id = %user_id,
            connection_id = %id,
            replaced,
            total,
            "ws_connected"
        );
        id
    }

    /// Remove the user's connection and index entries. Unknown users are a no-op.
    pub async fn disconnect(&self, user_id: &str) {
        let mut state = self.state.write().await;
        let removed = state.connections.remove(user_id).is_some();
        state.index.remove(user_id);
        let total = state.connections.len();
        drop(state);

        if removed {
            metrics::set_active_connections(self.name, total);
            info!(registry = self.name, user_id = %user_id, total, "ws_disconnected");
        }
    }

    /// Remove the user's connection only if it is still `connection_id`.
    ///
    /// Returns whether anything was removed.
    pub async fn release(&self, user_id: &str, connection_id: ConnectionId) -> bool {
        let mut state = self.state.write().await;
        let current = state
            .connections
            .get(user_id)
            .map(|conn| conn.id == connection_id)
            .unwrap_or(false);
        if !current {
            return false;
        }

        state.connections.remove(user_id);
        state.index.remove(user_id);
        let total = state.connections.len();
        drop(state);

        metrics::set_active_connections(self.name, total);
        info!(
            registry = self.name,
            user_id = %user_id,
            connection_id = %connection_id,
            total,
            "ws_released"
        );
        true
    }

    /// Deliver one pre-serialized frame to `user_id`.
    ///
    /// A failed send releases that exact connection. Returns whether the
    /// frame was handed to a live transport.
    async fn send_text(&self, user_id: &str, text: String) -> bool {
        let connection = {
            let state = self.state.read().await;
            state.connections.get(user_id).cloned()
        };
        let Some(connection) = connection else {
            return false;
        };

        match connection.transport.send_text(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    registry = self.name,
                    user_id = %user_id,
                    error = %e,
                    "ws_send_failed"
                );
                metrics::record_send_failure(self.name);
                self.release(user_id, connection.id).await;
                false
            }
        }
    }

    /// Serialize once, send to each user in turn. Returns the delivered count.
    pub(crate) async fn fan_out<S: AsRef<str>>(&self, user_ids: &[S], event: &ServerEvent) -> usize {
        if user_ids.is_empty() {
            return 0;
        }
        let text = match event.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(registry = self.name, event_type = %event.event_type, error = %e, "event serialization failed");
                return 0;
            }
        };

        let mut delivered = 0;
        for user_id in user_ids {
            if self.send_text(user_id.as_ref(), text.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send an event to one user. Absent users are a no-op.
    pub async fn broadcast_to_user(&self, user_id: &str, event_type: &str, payload: Value) -> bool {
        let event = ServerEvent::new(event_type, payload);
        self.fan_out(&[user_id], &event).await == 1
    }

    /// Send an event to every connected user.
    pub async fn broadcast_to_all(&self, event_type: &str, payload: Value) -> usize {
        let user_ids = self.connected_user_ids().await;
        let event = ServerEvent::new(event_type, payload);
        let delivered = self.fan_out(&user_ids, &event).await;
        debug!(registry = self.name, event_type = %event_type, delivered, "broadcast to all");
        delivered
    }

    /// Heartbeat probe for one registration.
    ///
    /// Returns false once the registration is gone or superseded, or when
    /// the ping could not be sent (the connection is then released).
    pub async fn ping(&self, user_id: &str, connection_id: ConnectionId) -> bool {
        let connection = {
            let state = self.state.read().await;
            state.connections.get(user_id).cloned()
        };
        let Some(connection) = connection.filter(|conn| conn.id == connection_id) else {
            return false;
        };

        let text = match ServerEvent::ping().to_json() {
            Ok(text) => text,
            Err(_) => return false,
        };
        if connection.transport.send_text(text).await.is_err() {
            debug!(registry = self.name, user_id = %user_id, "heartbeat send failed");
            self.release(user_id, connection_id).await;
            return false;
        }
        true
    }

    pub async fn is_connected(&self, user_id: &str) -> bool {
        self.state.read().await.connections.contains_key(user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn connected_user_ids(&self) -> Vec<String> {
        self.state.read().await.connections.keys().cloned().collect()
    }
}

impl ConnectionRegistry<RoleIndex> {
    /// Register `user_id` under `role`, replacing any previous connection.
    pub async fn connect(
        &self,
        transport: Arc<dyn Transport>,
        user_id: &str,
        role: &str,
    ) -> ConnectionId {
        self.register(transport, user_id, role).await
    }

    /// Send an event to every member of `role`'s room.
    pub async fn broadcast_to_role(&self, role: &str, event_type: &str, payload: Value) -> usize {
        let members = self.role_members(role).await;
        let event = ServerEvent::new(event_type, payload);
        self.fan_out(&members, &event).await
    }

    pub async fn role_members(&self, role: &str) -> Vec<String> {
        self.state.read().await.index.members(role)
    }

    pub async fn role_of(&self, user_id: &str) -> Option<String> {
        self.state.read().await.index.role_of(user_id)
    }

    /// Member count per role room.
    pub async fn room_sizes(&self) -> HashMap<String, usize> {
        let state = self.state.read().await;
        state
            .index
            .rooms
            .iter()
            .map(|(role, members)| (role.clone(), members.len()))
            .collect()
    }
}

impl ConnectionRegistry<DirectIndex> {
    /// Register `user_id`, replacing any previous chat connection.
    pub async fn connect(&self, transport: Arc<dyn Transport>, user_id: &str) -> ConnectionId {
        self.register(transport, user_id, &()).await
    }
}
