//! Connection management for WebSocket clients.
//!
//! Tracks connected clients, the identity they declared and the session
//! channels they are subscribed to.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use tavern_domain::{Identity, PlayerId};
use tavern_shared::ServerMessage;

/// Frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    /// Send a close frame and stop writing.
    Close { code: u16, reason: String },
}

/// Information about a connected client.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Unique ID for this connection
    pub connection_id: Uuid,
    /// Declared identity, set by the first subscribe
    pub identity: Option<Identity>,
    /// Channels this connection currently listens on
    pub channels: HashSet<String>,
}

impl ConnectionInfo {
    pub fn is_gm(&self) -> bool {
        self.identity.as_ref().is_some_and(Identity::is_gm)
    }

    pub fn user_id(&self) -> Option<&PlayerId> {
        self.identity.as_ref().map(|identity| &identity.user_id)
    }
}

/// Manages all active WebSocket connections.
pub struct ConnectionManager {
    /// Map of connection_id -> (ConnectionInfo, sender channel)
    connections: RwLock<HashMap<Uuid, (ConnectionInfo, mpsc::Sender<Outbound>)>>,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    pub async fn register(&self, connection_id: Uuid, sender: mpsc::Sender<Outbound>) {
        let info = ConnectionInfo {
            connection_id,
            identity: None,
            channels: HashSet::new(),
        };
        let mut connections = self.connections.write().await;
        connections.insert(connection_id, (info, sender));
        tracing::debug!(connection_id = %connection_id, "Connection registered");
    }

    /// Unregister a connection, returning what it was subscribed to.
    pub async fn unregister(&self, connection_id: Uuid) -> Option<ConnectionInfo> {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(&connection_id).map(|(info, _)| info);
        if removed.is_some() {
            tracing::debug!(connection_id = %connection_id, "Connection unregistered");
        }
        removed
    }

    /// Get connection info by ID.
    pub async fn get(&self, connection_id: Uuid) -> Option<ConnectionInfo> {
        let connections = self.connections.read().await;
        connections.get(&connection_id).map(|(info, _)| info.clone())
    }

    /// Record a channel subscription and the identity it was made under.
    pub async fn subscribe(
        &self,
        connection_id: Uuid,
        channel: &str,
        identity: Identity,
    ) -> Result<(), ConnectionError> {
        let mut connections = self.connections.write().await;
        let (info, _) = connections
            .get_mut(&connection_id)
            .ok_or(ConnectionError::NotFound)?;

        tracing::info!(
            connection_id = %connection_id,
            channel = %channel,
            user_id = %identity.user_id,
            role = %identity.role,
            "Connection subscribed"
        );
        info.identity = Some(identity);
        info.channels.insert(channel.to_string());
        Ok(())
    }

    /// Drop a channel subscription. Returns false if it was not subscribed.
    pub async fn unsubscribe(&self, connection_id: Uuid, channel: &str) -> bool {
        let mut connections = self.connections.write().await;
        connections
            .get_mut(&connection_id)
            .is_some_and(|(info, _)| info.channels.remove(channel))
    }

    pub async fn is_subscribed(&self, connection_id: Uuid, channel: &str) -> bool {
        let connections = self.connections.read().await;
        connections
            .get(&connection_id)
            .is_some_and(|(info, _)| info.channels.contains(channel))
    }

    /// Whether any connection other than `except` is on `channel` as `user_id`.
    pub async fn has_user_on_channel(
        &self,
        channel: &str,
        user_id: &PlayerId,
        except: Uuid,
    ) -> bool {
        let connections = self.connections.read().await;
        connections.values().any(|(info, _)| {
            info.connection_id != except
                && info.channels.contains(channel)
                && info.user_id() == Some(user_id)
        })
    }

    /// All connections subscribed to a channel.
    pub async fn channel_connections(&self, channel: &str) -> Vec<ConnectionInfo> {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|(info, _)| info.channels.contains(channel))
            .map(|(info, _)| info.clone())
            .collect()
    }

    /// Queue a frame for one connection without waiting.
    pub async fn send_to(&self, connection_id: Uuid, frame: Outbound) -> bool {
        let connections = self.connections.read().await;
        let Some((_, sender)) = connections.get(&connection_id) else {
            return false;
        };
        match sender.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "Failed to queue frame for connection"
                );
                false
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during connection operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection not found")]
    NotFound,
}
