//! Export template, version snapshot and run models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// A row from the `export_templates` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExportTemplate {
    pub id: DbId,
    pub organization_id: DbId,
    pub tenant_id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub format: String,
    pub schema: serde_json::Value,
    pub schedule_cron: Option<String>,
    pub schedule_timezone: String,
    pub schedule_enabled: bool,
    pub next_run_at: Option<Timestamp>,
    pub current_version: i32,
    pub archived_at: Option<Timestamp>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `POST /api/v1/export-templates`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateExportTemplate {
    pub name: String,
    pub description: Option<String>,
    pub format: String,
    pub schema: serde_json::Value,
    pub schedule_cron: Option<String>,
    /// Defaults to `UTC`.
    pub schedule_timezone: Option<String>,
    /// Defaults to `true` when a cron expression is given.
    pub schedule_enabled: Option<bool>,
}

/// DTO for `PUT /api/v1/export-templates/{id}`.
///
/// A `schema` that differs from the current one creates a new version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateExportTemplate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub format: Option<String>,
    pub schema: Option<serde_json::Value>,
    pub change_note: Option<String>,
    pub schedule_cron: Option<String>,
    pub schedule_timezone: Option<String>,
    pub schedule_enabled: Option<bool>,
}

/// Resolved schedule columns written alongside an update.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub schedule_cron: Option<String>,
    pub schedule_timezone: Option<String>,
    pub schedule_enabled: Option<bool>,
    pub next_run_at: Option<Timestamp>,
}

/// A row from the `export_template_versions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExportTemplateVersion {
    pub id: DbId,
    pub export_template_id: DbId,
    pub version: i32,
    pub schema: serde_json::Value,
    pub change_note: Option<String>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
}

/// Query parameters for `GET /api/v1/export-templates/{id}/compare`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompareQuery {
    pub from: i32,
    pub to: i32,
}

/// A row from the `export_runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExportRun {
    pub id: DbId,
    pub export_template_id: DbId,
    pub version: i32,
    pub status: String,
    pub row_count: Option<i64>,
    pub output: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub requested_by: Option<DbId>,
    pub created_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}
