//! Execution log model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// A row from the `execution_logs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExecutionLog {
    pub id: DbId,
    pub organization_id: DbId,
    pub tenant_id: DbId,
    pub workflow_id: DbId,
    pub triggered_by: Option<DbId>,
    pub trigger: String,
    pub status: String,
    pub input: serde_json::Value,
    pub steps: serde_json::Value,
    pub error_message: Option<String>,
    pub queued_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub duration_ms: Option<i64>,
}

/// One entry of the `steps` array recorded while walking a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub node_id: String,
    pub node_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

/// Body of `POST /api/v1/workflows/{id}/execute`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteWorkflow {
    #[serde(default)]
    pub input: serde_json::Value,
}

/// Query parameters for execution listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionListQuery {
    pub workflow_id: Option<DbId>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
