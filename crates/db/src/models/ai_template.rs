//! Stored AI-generated workflow drafts.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// A row from the `ai_templates` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AiTemplate {
    pub id: DbId,
    pub organization_id: DbId,
    pub tenant_id: DbId,
    pub title: String,
    pub prompt: String,
    pub model: String,
    pub generated_definition: serde_json::Value,
    pub promoted_template_id: Option<DbId>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
}

/// DTO for `POST /api/v1/ai-templates`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAiTemplate {
    pub title: String,
    pub prompt: String,
    pub model: String,
    pub generated_definition: serde_json::Value,
}
