use pumpflix_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One user's copy of an in-app notification.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: DbId,
    pub organization_id: DbId,
    pub user_id: DbId,
    /// Event type, suffixed with the limit name for usage events.
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// A notice to deliver to several users of one organization.
#[derive(Debug, Clone)]
pub struct NewNotice {
    pub organization_id: DbId,
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationListQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}
