//! Refresh sessions.

use serde::Serialize;
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserSession {
    pub id: DbId,
    pub user_id: DbId,
    /// SHA-256 of the refresh token; the token itself is never stored.
    #[serde(skip)]
    pub refresh_token_hash: String,
    pub expires_at: Timestamp,
    pub is_revoked: bool,
    pub user_agent: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: DbId,
    pub refresh_token_hash: String,
    pub expires_at: Timestamp,
    pub user_agent: Option<String>,
}
