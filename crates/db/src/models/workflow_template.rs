//! Workflow templates and the instances created from them.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// A row from the `workflow_templates` table. `organization_id = None`
/// marks a global template visible to every organization.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowTemplate {
    pub id: DbId,
    pub organization_id: Option<DbId>,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub definition: serde_json::Value,
    pub is_public: bool,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowTemplate {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub definition: serde_json::Value,
    /// Defaults to `false`.
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWorkflowTemplate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub definition: Option<serde_json::Value>,
    pub is_public: Option<bool>,
}

/// A row from the `workflow_instances` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowInstance {
    pub id: DbId,
    pub template_id: DbId,
    pub workflow_id: DbId,
    pub tenant_id: DbId,
    pub config: serde_json::Value,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
}

/// DTO for `POST /api/v1/templates/{id}/instantiate`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstantiateTemplate {
    /// Name of the new workflow. Defaults to the template name.
    pub name: Option<String>,
    /// Per-node config overrides keyed by node id, merged into the
    /// template's node configs.
    #[serde(default)]
    pub config: serde_json::Value,
}
