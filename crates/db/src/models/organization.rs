//! Organization and tenant models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// A row from the `organizations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Organization {
    pub id: DbId,
    pub name: String,
    pub slug: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `PUT /api/v1/org`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrganization {
    pub name: Option<String>,
}

/// A row from the `tenants` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Tenant {
    pub id: DbId,
    pub organization_id: DbId,
    pub name: String,
    pub slug: String,
    pub is_default: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a tenant. `slug` is derived from `name` when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub slug: Option<String>,
}

/// Everything needed to sign up a new organization.
#[derive(Debug, Clone)]
pub struct Registration {
    pub organization_name: String,
    pub organization_slug: String,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
}

/// Rows created by a successful registration.
#[derive(Debug, Clone)]
pub struct RegisteredOrganization {
    pub organization: Organization,
    pub tenant: Tenant,
    pub user_id: DbId,
}
