use crate::models::websocket::ServerEvent;
use crate::services::Presence;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Open websocket connections, by user. A user may have several tabs open.
#[derive(Clone, Default)]
pub struct WebSocketManager {
    // Map of user_id -> (connection id -> outgoing channel)
    connections: Arc<DashMap<String, DashMap<Uuid, UnboundedSender<ServerEvent>>>>,
}

impl WebSocketManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its id.
    pub fn connect(&self, user_id: &str, sender: UnboundedSender<ServerEvent>) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.connections
            .entry(user_id.to_string())
            .or_default()
            .insert(conn_id, sender);
        tracing::debug!(user_id, %conn_id, "Websocket connected");
        conn_id
    }

    pub fn disconnect(&self, user_id: &str, conn_id: Uuid) {
        if let Some(user_connections) = self.connections.get(user_id) {
            user_connections.remove(&conn_id);
        }
        // Drop the user entry once their last connection is gone
        self.connections
            .remove_if(user_id, |_, user_connections| user_connections.is_empty());
        tracing::debug!(user_id, %conn_id, "Websocket disconnected");
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.connections
            .get(user_id)
            .is_some_and(|user_connections| !user_connections.is_empty())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|entry| entry.len()).sum()
    }
}

impl Presence for WebSocketManager {
    fn is_reachable(&self, user_id: &str) -> bool {
        self.is_connected(user_id)
    }
}
