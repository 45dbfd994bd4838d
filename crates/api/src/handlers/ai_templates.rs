//! Handlers for `/ai-templates`: stored AI-generated workflow drafts that
//! can be promoted into regular workflow templates.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pumpflix_core::error::CoreError;
use pumpflix_core::types::DbId;
use pumpflix_core::workflow::{parse_and_validate, validate_name};
use pumpflix_db::models::ai_template::{AiTemplate, CreateAiTemplate};
use pumpflix_db::models::workflow_template::{CreateWorkflowTemplate, WorkflowTemplate};
use pumpflix_db::repositories::{AiTemplateRepo, WorkflowTemplateRepo};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireEditor;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// Optional body of `POST /ai-templates/{id}/promote`.
#[derive(Debug, Default, Deserialize)]
pub struct PromoteAiTemplate {
    /// Defaults to the draft's title.
    pub name: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

/// GET /api/v1/ai-templates
#[utoipa::path(get, path = "/api/v1/ai-templates", tag = "ai-templates", security(("bearer" = [])),
    params(("limit" = Option<i64>, Query), ("offset" = Option<i64>, Query)),
    responses((status = 200, description = "Drafts, newest first")))]
pub async fn list_ai_templates(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<AiTemplate>>>> {
    let (limit, offset) = params.clamped();
    let items = AiTemplateRepo::list(&state.pool, auth.organization_id, limit, offset).await?;
    Ok(Json(DataResponse { data: items }))
}

/// POST /api/v1/ai-templates
#[utoipa::path(post, path = "/api/v1/ai-templates", tag = "ai-templates", security(("bearer" = [])),
    responses((status = 201, description = "Draft stored"), (status = 400, description = "Invalid definition")))]
pub async fn create_ai_template(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Json(input): Json<CreateAiTemplate>,
) -> AppResult<(StatusCode, Json<DataResponse<AiTemplate>>)> {
    validate_name(&input.title)?;
    if input.prompt.trim().is_empty() || input.model.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Prompt and model must not be empty".into(),
        )));
    }
    parse_and_validate(&input.generated_definition)?;

    let item = AiTemplateRepo::create(
        &state.pool,
        auth.organization_id,
        auth.tenant_id,
        auth.user_id,
        &input,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: item })))
}

/// GET /api/v1/ai-templates/{id}
#[utoipa::path(get, path = "/api/v1/ai-templates/{id}", tag = "ai-templates", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Draft id")),
    responses((status = 200, description = "The draft"), (status = 404, description = "Not found")))]
pub async fn get_ai_template(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<AiTemplate>>> {
    let item = find_ai_template(&state, auth.organization_id, id).await?;
    Ok(Json(DataResponse { data: item }))
}

/// DELETE /api/v1/ai-templates/{id}
#[utoipa::path(delete, path = "/api/v1/ai-templates/{id}", tag = "ai-templates", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Draft id")),
    responses((status = 204, description = "Draft deleted"), (status = 404, description = "Not found")))]
pub async fn delete_ai_template(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !AiTemplateRepo::delete(&state.pool, auth.organization_id, id).await? {
        return Err(AppError::not_found("AiTemplate", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/ai-templates/{id}/promote
///
/// Copies the draft's definition into a new workflow template owned by the
/// organization and links the two.
#[utoipa::path(post, path = "/api/v1/ai-templates/{id}/promote", tag = "ai-templates",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Draft id")),
    responses(
        (status = 201, description = "Workflow template created"),
        (status = 409, description = "Draft already promoted"),
    ))]
pub async fn promote_ai_template(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<PromoteAiTemplate>,
) -> AppResult<(StatusCode, Json<DataResponse<WorkflowTemplate>>)> {
    let draft = find_ai_template(&state, auth.organization_id, id).await?;
    if let Some(template_id) = draft.promoted_template_id {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Draft was already promoted to template {template_id}"
        ))));
    }
    parse_and_validate(&draft.generated_definition)?;

    let name = input.name.unwrap_or(draft.title).trim().to_string();
    validate_name(&name)?;

    let template = WorkflowTemplateRepo::create(
        &state.pool,
        auth.organization_id,
        auth.user_id,
        &CreateWorkflowTemplate {
            name,
            description: Some(draft.prompt),
            category: input.category,
            definition: draft.generated_definition,
            is_public: Some(input.is_public),
        },
    )
    .await?;
    AiTemplateRepo::set_promoted(&state.pool, draft.id, template.id).await?;

    tracing::info!(ai_template_id = draft.id, template_id = template.id, "AI draft promoted");
    Ok((StatusCode::CREATED, Json(DataResponse { data: template })))
}

async fn find_ai_template(state: &AppState, organization_id: DbId, id: DbId) -> AppResult<AiTemplate> {
    AiTemplateRepo::find_by_id(&state.pool, organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("AiTemplate", id))
}
