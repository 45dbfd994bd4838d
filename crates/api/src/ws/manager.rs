use std::collections::{HashMap, HashSet};

use axum::body::Bytes;
use axum::extract::ws::Message;
use pumpflix_core::types::{DbId, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single authenticated WebSocket connection.
pub struct WsConnection {
    pub user_id: DbId,
    pub organization_id: DbId,
    /// Channel names this connection is subscribed to, e.g. `workflow:12`.
    pub channels: HashSet<String>,
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Manages all active WebSocket connections and their channel
/// subscriptions.
///
/// Thread-safe via interior `RwLock`; shared as `Arc<WsManager>`.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection and return the receiver for its outbound
    /// messages.
    pub async fn add(
        &self,
        conn_id: String,
        user_id: DbId,
        organization_id: DbId,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            user_id,
            organization_id,
            channels: HashSet::new(),
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Add a channel to a connection. Returns the connection's full channel
    /// list afterwards, or `None` if the connection is gone.
    pub async fn subscribe(&self, conn_id: &str, channel: &str) -> Option<Vec<String>> {
        let mut conns = self.connections.write().await;
        let conn = conns.get_mut(conn_id)?;
        conn.channels.insert(channel.to_string());
        Some(sorted(&conn.channels))
    }

    pub async fn unsubscribe(&self, conn_id: &str, channel: &str) -> Option<Vec<String>> {
        let mut conns = self.connections.write().await;
        let conn = conns.get_mut(conn_id)?;
        conn.channels.remove(channel);
        Some(sorted(&conn.channels))
    }

    /// Send a message to one connection. Returns false if it is gone.
    pub async fn send_to(&self, conn_id: &str, message: Message) -> bool {
        match self.connections.read().await.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Deliver to every connection subscribed to any of `channels`.
    ///
    /// `channels` is ordered from least to most specific; each connection
    /// receives the event once, tagged with the most specific channel it
    /// subscribed to. Returns the number of connections reached.
    pub async fn publish<F>(&self, channels: &[String], render: F) -> usize
    where
        F: Fn(&str) -> Message,
    {
        if channels.is_empty() {
            return 0;
        }
        let conns = self.connections.read().await;
        let mut delivered = 0;
        for conn in conns.values() {
            let Some(channel) = channels.iter().rev().find(|c| conn.channels.contains(*c)) else {
                continue;
            };
            if conn.sender.send(render(channel)).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send a message to all connections belonging to a user.
    pub async fn send_to_user(&self, user_id: DbId, message: Message) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for conn in conns.values() {
            if conn.user_id == user_id {
                let _ = conn.sender.send(message.clone());
                count += 1;
            }
        }
        count
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Ping every client and drop connections whose socket task has ended.
    /// Returns `(pinged, reaped)`.
    pub async fn ping_and_reap(&self) -> (usize, Vec<String>) {
        let mut conns = self.connections.write().await;
        let dead: Vec<String> = conns
            .iter()
            .filter(|(_, conn)| conn.sender.send(Message::Ping(Bytes::new())).is_err())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &dead {
            conns.remove(id);
        }
        (conns.len(), dead)
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted(channels: &HashSet<String>) -> Vec<String> {
    let mut out: Vec<String> = channels.iter().cloned().collect();
    out.sort();
    out
}
