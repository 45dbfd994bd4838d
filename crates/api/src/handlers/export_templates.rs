//! Handlers for `/export-templates`: versioned export schemas, schedules
//! and runs.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pumpflix_core::error::CoreError;
use pumpflix_core::export_template::{
    diff_schemas, parse_timezone, validate_format, validate_schedule, validate_schema, SchemaDiff,
};
use pumpflix_core::jobs::JOB_RUN_EXPORT;
use pumpflix_core::plans::LimitKind;
use pumpflix_core::types::{DbId, Timestamp};
use pumpflix_db::models::export_template::{
    CompareQuery, CreateExportTemplate, ExportRun, ExportTemplate, ExportTemplateVersion,
    ScheduleUpdate, UpdateExportTemplate,
};
use pumpflix_db::models::job::EnqueueJob;
use pumpflix_db::repositories::{ExportRunRepo, ExportTemplateRepo, JobRepo};
use serde::Serialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::limits::enforce_limit;
use crate::middleware::rbac::RequireEditor;
use crate::query::{IncludeArchivedParams, PaginationParams};
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_TIMEZONE: &str = "UTC";

/// Result of comparing two versions.
#[derive(Debug, Serialize)]
pub struct VersionComparison {
    pub from: i32,
    pub to: i32,
    pub identical: bool,
    pub diff: SchemaDiff,
}

/// GET /api/v1/export-templates
#[utoipa::path(get, path = "/api/v1/export-templates", tag = "export-templates",
    security(("bearer" = [])),
    params(
        ("include_archived" = Option<bool>, Query),
        ("limit" = Option<i64>, Query), ("offset" = Option<i64>, Query),
    ),
    responses((status = 200, description = "Export templates by name")))]
pub async fn list_export_templates(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<IncludeArchivedParams>,
) -> AppResult<Json<DataResponse<Vec<ExportTemplate>>>> {
    let (limit, offset) = PaginationParams {
        limit: params.limit,
        offset: params.offset,
    }
    .clamped();
    let items = ExportTemplateRepo::list(
        &state.pool,
        auth.organization_id,
        params.include_archived,
        limit,
        offset,
    )
    .await?;
    Ok(Json(DataResponse { data: items }))
}

/// POST /api/v1/export-templates
#[utoipa::path(post, path = "/api/v1/export-templates", tag = "export-templates",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Template created at version 1"),
        (status = 400, description = "Invalid schema, format or schedule"),
        (status = 403, description = "Export template limit reached"),
    ))]
pub async fn create_export_template(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Json(mut input): Json<CreateExportTemplate>,
) -> AppResult<(StatusCode, Json<DataResponse<ExportTemplate>>)> {
    input.name = validate_template_name(&input.name)?;
    validate_format(&input.format)?;
    validate_schema(&input.schema)?;

    let timezone = input
        .schedule_timezone
        .clone()
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    parse_timezone(&timezone)?;
    let (enabled, next_run_at) = match input.schedule_cron.as_deref() {
        Some(cron) => {
            let next = validate_schedule(cron, &timezone)?;
            let enabled = input.schedule_enabled.unwrap_or(true);
            (enabled, enabled.then_some(next))
        }
        None if input.schedule_enabled == Some(true) => {
            return Err(AppError::Core(CoreError::Validation(
                "Enabling a schedule requires schedule_cron".into(),
            )))
        }
        None => (false, None),
    };
    input.schedule_timezone = Some(timezone);

    enforce_limit(&state.pool, auth.organization_id, LimitKind::ExportTemplates).await?;

    let template = ExportTemplateRepo::create(
        &state.pool,
        auth.organization_id,
        auth.tenant_id,
        auth.user_id,
        &input,
        enabled,
        next_run_at,
    )
    .await?;
    tracing::info!(
        export_template_id = template.id,
        user_id = auth.user_id,
        scheduled = enabled,
        "Export template created"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: template })))
}

/// GET /api/v1/export-templates/{id}
#[utoipa::path(get, path = "/api/v1/export-templates/{id}", tag = "export-templates",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Export template id")),
    responses((status = 200, description = "The template"), (status = 404, description = "Not found")))]
pub async fn get_export_template(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ExportTemplate>>> {
    let template = find_template(&state, auth.organization_id, id).await?;
    Ok(Json(DataResponse { data: template }))
}

/// PUT /api/v1/export-templates/{id}
///
/// A schema that differs from the current one is stored as a new version.
#[utoipa::path(put, path = "/api/v1/export-templates/{id}", tag = "export-templates",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Export template id")),
    responses(
        (status = 200, description = "Template updated"),
        (status = 400, description = "Invalid schema, format or schedule"),
        (status = 409, description = "Template is archived"),
    ))]
pub async fn update_export_template(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(mut input): Json<UpdateExportTemplate>,
) -> AppResult<Json<DataResponse<ExportTemplate>>> {
    let existing = find_template(&state, auth.organization_id, id).await?;
    if existing.archived_at.is_some() {
        return Err(AppError::Core(CoreError::Conflict(
            "Archived export templates are read-only".into(),
        )));
    }

    if let Some(name) = input.name.as_deref() {
        input.name = Some(validate_template_name(name)?);
    }
    if let Some(format) = input.format.as_deref() {
        validate_format(format)?;
    }
    let schedule = resolve_schedule(&existing, &input)?;

    if let Some(schema) = input.schema.as_ref().filter(|s| **s != existing.schema) {
        validate_schema(schema)?;
        let updated = ExportTemplateRepo::update_schema(
            &state.pool,
            auth.organization_id,
            id,
            schema,
            input.change_note.as_deref(),
            auth.user_id,
        )
        .await?
        .ok_or_else(|| AppError::not_found("ExportTemplate", id))?;
        tracing::info!(
            export_template_id = id,
            version = updated.current_version,
            user_id = auth.user_id,
            "Export schema versioned"
        );
    }

    let template =
        ExportTemplateRepo::update_metadata(&state.pool, auth.organization_id, id, &input, &schedule)
            .await?
            .ok_or_else(|| AppError::not_found("ExportTemplate", id))?;
    Ok(Json(DataResponse { data: template }))
}

/// DELETE /api/v1/export-templates/{id}
#[utoipa::path(delete, path = "/api/v1/export-templates/{id}", tag = "export-templates",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Export template id")),
    responses((status = 204, description = "Template and its versions deleted"), (status = 404, description = "Not found")))]
pub async fn delete_export_template(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !ExportTemplateRepo::delete(&state.pool, auth.organization_id, id).await? {
        return Err(AppError::not_found("ExportTemplate", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/export-templates/{id}/archive
#[utoipa::path(post, path = "/api/v1/export-templates/{id}/archive", tag = "export-templates",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Export template id")),
    responses((status = 200, description = "Template archived"), (status = 409, description = "Already archived")))]
pub async fn archive_export_template(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ExportTemplate>>> {
    find_template(&state, auth.organization_id, id).await?;
    let template = ExportTemplateRepo::archive(&state.pool, auth.organization_id, id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Conflict("Export template is already archived".into()))
        })?;
    Ok(Json(DataResponse { data: template }))
}

/// GET /api/v1/export-templates/{id}/versions
#[utoipa::path(get, path = "/api/v1/export-templates/{id}/versions", tag = "export-templates",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Export template id")),
    responses((status = 200, description = "Version snapshots, newest first")))]
pub async fn list_versions(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<ExportTemplateVersion>>>> {
    find_template(&state, auth.organization_id, id).await?;
    let versions = ExportTemplateRepo::list_versions(&state.pool, id).await?;
    Ok(Json(DataResponse { data: versions }))
}

/// GET /api/v1/export-templates/{id}/versions/{version}
#[utoipa::path(get, path = "/api/v1/export-templates/{id}/versions/{version}", tag = "export-templates",
    security(("bearer" = [])),
    params(
        ("id" = i64, Path, description = "Export template id"),
        ("version" = i32, Path, description = "Version number"),
    ),
    responses((status = 200, description = "The snapshot"), (status = 404, description = "No such version")))]
pub async fn get_version(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, version)): Path<(DbId, i32)>,
) -> AppResult<Json<DataResponse<ExportTemplateVersion>>> {
    find_template(&state, auth.organization_id, id).await?;
    let snapshot = find_version(&state, id, version).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /api/v1/export-templates/{id}/compare?from=&to=
#[utoipa::path(get, path = "/api/v1/export-templates/{id}/compare", tag = "export-templates",
    security(("bearer" = [])),
    params(
        ("id" = i64, Path, description = "Export template id"),
        ("from" = i32, Query, description = "Base version"),
        ("to" = i32, Query, description = "Compared version"),
    ),
    responses((status = 200, description = "Added, removed and modified paths"), (status = 404, description = "No such version")))]
pub async fn compare_versions(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(query): Query<CompareQuery>,
) -> AppResult<Json<DataResponse<VersionComparison>>> {
    find_template(&state, auth.organization_id, id).await?;
    let from = find_version(&state, id, query.from).await?;
    let to = find_version(&state, id, query.to).await?;

    let diff = diff_schemas(&from.schema, &to.schema)?;
    Ok(Json(DataResponse {
        data: VersionComparison {
            from: query.from,
            to: query.to,
            identical: diff.is_empty(),
            diff,
        },
    }))
}

/// POST /api/v1/export-templates/{id}/run
///
/// Queues a run of the current version.
#[utoipa::path(post, path = "/api/v1/export-templates/{id}/run", tag = "export-templates",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Export template id")),
    responses((status = 202, description = "Run queued"), (status = 409, description = "Template is archived")))]
pub async fn run_export(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<(StatusCode, Json<DataResponse<ExportRun>>)> {
    let template = find_template(&state, auth.organization_id, id).await?;
    if template.archived_at.is_some() {
        return Err(AppError::Core(CoreError::Conflict(
            "Archived export templates cannot run".into(),
        )));
    }

    let run = ExportRunRepo::create_queued(
        &state.pool,
        template.id,
        template.current_version,
        Some(auth.user_id),
    )
    .await?;
    JobRepo::enqueue(
        &state.pool,
        &EnqueueJob {
            job_type: JOB_RUN_EXPORT.to_string(),
            organization_id: Some(auth.organization_id),
            payload: json!({ "run_id": run.id }),
            max_attempts: None,
            run_after: None,
        },
    )
    .await?;

    tracing::info!(export_template_id = id, run_id = run.id, "Export run queued");
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: run })))
}

/// GET /api/v1/export-templates/{id}/runs
#[utoipa::path(get, path = "/api/v1/export-templates/{id}/runs", tag = "export-templates",
    security(("bearer" = [])),
    params(
        ("id" = i64, Path, description = "Export template id"),
        ("limit" = Option<i64>, Query), ("offset" = Option<i64>, Query),
    ),
    responses((status = 200, description = "Runs, newest first")))]
pub async fn list_runs(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<ExportRun>>>> {
    find_template(&state, auth.organization_id, id).await?;
    let (limit, offset) = params.clamped();
    let runs = ExportRunRepo::list_for_template(&state.pool, id, limit, offset).await?;
    Ok(Json(DataResponse { data: runs }))
}

async fn find_template(state: &AppState, organization_id: DbId, id: DbId) -> AppResult<ExportTemplate> {
    ExportTemplateRepo::find_by_id(&state.pool, organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("ExportTemplate", id))
}

async fn find_version(
    state: &AppState,
    template_id: DbId,
    version: i32,
) -> AppResult<ExportTemplateVersion> {
    ExportTemplateRepo::find_version(&state.pool, template_id, version)
        .await?
        .ok_or_else(|| AppError::not_found("ExportTemplateVersion", DbId::from(version)))
}

fn validate_template_name(name: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Export template name must not be empty".into(),
        )));
    }
    Ok(trimmed.to_string())
}

/// Work out the schedule columns after an update, recomputing the next run
/// whenever the schedule is (re)enabled or its cron/timezone change.
fn resolve_schedule(
    existing: &ExportTemplate,
    input: &UpdateExportTemplate,
) -> AppResult<ScheduleUpdate> {
    let touched = input.schedule_cron.is_some()
        || input.schedule_timezone.is_some()
        || input.schedule_enabled.is_some();
    if !touched {
        return Ok(ScheduleUpdate::default());
    }

    let cron = input
        .schedule_cron
        .as_deref()
        .or(existing.schedule_cron.as_deref());
    let timezone = input
        .schedule_timezone
        .as_deref()
        .unwrap_or(&existing.schedule_timezone);
    parse_timezone(timezone)?;

    let enabled = input
        .schedule_enabled
        .or_else(|| input.schedule_cron.is_some().then_some(true))
        .unwrap_or(existing.schedule_enabled);

    let next_run_at: Option<Timestamp> = match (enabled, cron) {
        (true, Some(cron)) => Some(validate_schedule(cron, timezone)?),
        (true, None) => {
            return Err(AppError::Core(CoreError::Validation(
                "Enabling a schedule requires schedule_cron".into(),
            )))
        }
        (false, Some(cron)) => {
            validate_schedule(cron, timezone)?;
            None
        }
        (false, None) => None,
    };

    Ok(ScheduleUpdate {
        schedule_cron: input.schedule_cron.clone(),
        schedule_timezone: input.schedule_timezone.clone(),
        schedule_enabled: Some(enabled),
        next_run_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn template(cron: Option<&str>, enabled: bool) -> ExportTemplate {
        let now = Utc::now();
        ExportTemplate {
            id: 1,
            organization_id: 1,
            tenant_id: 1,
            name: "Weekly leads".into(),
            description: None,
            format: "csv".into(),
            schema: json!({ "fields": [{ "name": "email", "type": "string" }] }),
            schedule_cron: cron.map(str::to_string),
            schedule_timezone: "UTC".into(),
            schedule_enabled: enabled,
            next_run_at: None,
            current_version: 1,
            archived_at: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn untouched_schedule_is_left_alone() {
        let update = resolve_schedule(&template(None, false), &UpdateExportTemplate::default()).unwrap();
        assert!(update.schedule_enabled.is_none());
        assert!(update.next_run_at.is_none());
    }

    #[test]
    fn new_cron_enables_and_computes_next_run() {
        let input = UpdateExportTemplate {
            schedule_cron: Some("0 6 * * *".into()),
            ..Default::default()
        };
        let update = resolve_schedule(&template(None, false), &input).unwrap();
        assert_eq!(update.schedule_enabled, Some(true));
        assert!(update.next_run_at.is_some_and(|t| t > Utc::now()));
    }

    #[test]
    fn enabling_without_cron_is_rejected() {
        let input = UpdateExportTemplate {
            schedule_enabled: Some(true),
            ..Default::default()
        };
        assert!(resolve_schedule(&template(None, false), &input).is_err());
    }

    #[test]
    fn disabling_clears_next_run() {
        let input = UpdateExportTemplate {
            schedule_enabled: Some(false),
            ..Default::default()
        };
        let update = resolve_schedule(&template(Some("0 6 * * *"), true), &input).unwrap();
        assert_eq!(update.schedule_enabled, Some(false));
        assert!(update.next_run_at.is_none());
    }
}
