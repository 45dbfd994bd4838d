use serde::Serialize;
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// One audit trail entry.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Event {
    pub id: DbId,
    pub event_type: String,
    pub organization_id: Option<DbId>,
    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<DbId>,
    pub actor_user_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}
