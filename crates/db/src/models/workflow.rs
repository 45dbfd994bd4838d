//! Workflow entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// A row from the `workflows` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Workflow {
    pub id: DbId,
    pub organization_id: DbId,
    pub tenant_id: DbId,
    pub created_by: Option<DbId>,
    pub name: String,
    pub description: Option<String>,
    pub definition: serde_json::Value,
    pub status: String,
    pub archived_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `POST /api/v1/workflows`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflow {
    pub name: String,
    pub description: Option<String>,
    pub definition: serde_json::Value,
    /// Defaults to `draft`.
    pub status: Option<String>,
}

/// DTO for `PUT /api/v1/workflows/{id}`. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWorkflow {
    pub name: Option<String>,
    pub description: Option<String>,
    pub definition: Option<serde_json::Value>,
    pub status: Option<String>,
}

/// Query parameters for `GET /api/v1/workflows`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowListQuery {
    pub status: Option<String>,
    pub tenant_id: Option<DbId>,
    /// Include archived workflows. Defaults to `false`.
    pub include_archived: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
