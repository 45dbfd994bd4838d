//! User entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// A row from the `users` table. Includes the password hash, so never
/// serialize this directly in a response; use [`UserResponse`].
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: DbId,
    pub organization_id: DbId,
    pub tenant_id: DbId,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<Timestamp>,
    pub failed_login_count: i32,
    pub locked_until: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Safe user representation for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: DbId,
    pub organization_id: DbId,
    pub tenant_id: DbId,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            organization_id: u.organization_id,
            tenant_id: u.tenant_id,
            email: u.email,
            display_name: u.display_name,
            role: u.role,
            is_active: u.is_active,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
        }
    }
}

/// Insert payload for a new user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub organization_id: DbId,
    pub tenant_id: DbId,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: String,
}

/// DTO for `PUT /api/v1/users/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUser {
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub tenant_id: Option<DbId>,
}
