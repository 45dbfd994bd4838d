//! WebSocket connection bookkeeping.

use serde::Serialize;
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// A row from the `ws_sessions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WsSession {
    pub id: DbId,
    pub connection_id: String,
    pub user_id: DbId,
    pub organization_id: DbId,
    pub channels: serde_json::Value,
    pub connected_at: Timestamp,
    pub last_seen_at: Timestamp,
    pub disconnected_at: Option<Timestamp>,
}
