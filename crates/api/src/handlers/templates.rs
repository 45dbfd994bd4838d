//! Handlers for the `/templates` resource (workflow templates and their
//! instances).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pumpflix_core::error::CoreError;
use pumpflix_core::types::DbId;
use pumpflix_core::workflow::{apply_config_overrides, parse_and_validate, validate, validate_name};
use pumpflix_db::models::workflow::Workflow;
use pumpflix_db::models::workflow_template::{
    CreateWorkflowTemplate, InstantiateTemplate, UpdateWorkflowTemplate, WorkflowInstance,
    WorkflowTemplate,
};
use pumpflix_db::repositories::{WorkflowInstanceRepo, WorkflowTemplateRepo};
use pumpflix_events::event_types::{ENTITY_WORKFLOW, WORKFLOW_CREATED};
use pumpflix_events::PlatformEvent;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireEditor;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TemplateListParams {
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Result of instantiating a template.
#[derive(Debug, Serialize)]
pub struct InstantiatedWorkflow {
    pub workflow: Workflow,
    pub instance: WorkflowInstance,
}

/// GET /api/v1/templates
#[utoipa::path(get, path = "/api/v1/templates", tag = "templates", security(("bearer" = [])),
    params(
        ("category" = Option<String>, Query),
        ("limit" = Option<i64>, Query), ("offset" = Option<i64>, Query),
    ),
    responses((status = 200, description = "Own, global and public templates")))]
pub async fn list_templates(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<TemplateListParams>,
) -> AppResult<Json<DataResponse<Vec<WorkflowTemplate>>>> {
    let (limit, offset) = PaginationParams {
        limit: params.limit,
        offset: params.offset,
    }
    .clamped();
    let templates = WorkflowTemplateRepo::list_visible(
        &state.pool,
        auth.organization_id,
        params.category.as_deref(),
        limit,
        offset,
    )
    .await?;
    Ok(Json(DataResponse { data: templates }))
}

/// POST /api/v1/templates
#[utoipa::path(post, path = "/api/v1/templates", tag = "templates", security(("bearer" = [])),
    responses((status = 201, description = "Template created"), (status = 400, description = "Invalid definition")))]
pub async fn create_template(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Json(mut input): Json<CreateWorkflowTemplate>,
) -> AppResult<(StatusCode, Json<DataResponse<WorkflowTemplate>>)> {
    validate_name(&input.name)?;
    input.name = input.name.trim().to_string();
    parse_and_validate(&input.definition)?;

    let template =
        WorkflowTemplateRepo::create(&state.pool, auth.organization_id, auth.user_id, &input)
            .await?;
    tracing::info!(template_id = template.id, user_id = auth.user_id, "Workflow template created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: template })))
}

/// GET /api/v1/templates/{id}
#[utoipa::path(get, path = "/api/v1/templates/{id}", tag = "templates", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Template id")),
    responses((status = 200, description = "The template"), (status = 404, description = "Not found")))]
pub async fn get_template(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<WorkflowTemplate>>> {
    let template = find_template(&state, auth.organization_id, id).await?;
    Ok(Json(DataResponse { data: template }))
}

/// PUT /api/v1/templates/{id}
#[utoipa::path(put, path = "/api/v1/templates/{id}", tag = "templates", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Template id")),
    responses(
        (status = 200, description = "Template updated"),
        (status = 403, description = "Template belongs to another organization"),
        (status = 404, description = "Not found"),
    ))]
pub async fn update_template(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(mut input): Json<UpdateWorkflowTemplate>,
) -> AppResult<Json<DataResponse<WorkflowTemplate>>> {
    let existing = find_template(&state, auth.organization_id, id).await?;
    ensure_owned(&existing, auth.organization_id)?;

    if let Some(name) = input.name.as_deref() {
        validate_name(name)?;
        input.name = Some(name.trim().to_string());
    }
    if let Some(definition) = input.definition.as_ref() {
        parse_and_validate(definition)?;
    }

    let template = WorkflowTemplateRepo::update(&state.pool, auth.organization_id, id, &input)
        .await?
        .ok_or_else(|| AppError::not_found("WorkflowTemplate", id))?;
    Ok(Json(DataResponse { data: template }))
}

/// DELETE /api/v1/templates/{id}
#[utoipa::path(delete, path = "/api/v1/templates/{id}", tag = "templates", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Template id")),
    responses((status = 204, description = "Template deleted"), (status = 403, description = "Not owned")))]
pub async fn delete_template(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let existing = find_template(&state, auth.organization_id, id).await?;
    ensure_owned(&existing, auth.organization_id)?;
    if !WorkflowTemplateRepo::delete(&state.pool, auth.organization_id, id).await? {
        return Err(AppError::not_found("WorkflowTemplate", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/templates/{id}/instantiate
///
/// Creates a draft workflow in the caller's tenant from the template,
/// with per-node config overrides applied.
#[utoipa::path(post, path = "/api/v1/templates/{id}/instantiate", tag = "templates",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Template id")),
    responses(
        (status = 201, description = "Workflow and instance created"),
        (status = 400, description = "Overrides produce an invalid definition"),
        (status = 409, description = "Workflow name already used in this tenant"),
    ))]
pub async fn instantiate_template(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<InstantiateTemplate>,
) -> AppResult<(StatusCode, Json<DataResponse<InstantiatedWorkflow>>)> {
    let template = find_template(&state, auth.organization_id, id).await?;

    let name = input.name.as_deref().unwrap_or(&template.name).trim().to_string();
    validate_name(&name)?;

    let mut def = parse_and_validate(&template.definition)?;
    apply_config_overrides(&mut def, &input.config)?;
    validate(&def)?;
    let definition = serde_json::to_value(&def)
        .map_err(|e| AppError::InternalError(format!("Definition serialization failed: {e}")))?;

    let (workflow, instance) = WorkflowTemplateRepo::instantiate(
        &state.pool,
        template.id,
        auth.organization_id,
        auth.tenant_id,
        auth.user_id,
        &name,
        template.description.as_deref(),
        &definition,
        &input.config,
    )
    .await?;

    tracing::info!(
        template_id = template.id,
        workflow_id = workflow.id,
        user_id = auth.user_id,
        "Template instantiated"
    );
    state.event_bus.publish(
        PlatformEvent::new(WORKFLOW_CREATED)
            .with_organization(auth.organization_id)
            .with_source(ENTITY_WORKFLOW, workflow.id)
            .with_actor(auth.user_id)
            .with_payload(json!({ "name": workflow.name, "template_id": template.id })),
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: InstantiatedWorkflow { workflow, instance },
        }),
    ))
}

/// GET /api/v1/templates/{id}/instances
#[utoipa::path(get, path = "/api/v1/templates/{id}/instances", tag = "templates",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Template id")),
    responses((status = 200, description = "Instances created in this organization")))]
pub async fn list_instances(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<WorkflowInstance>>>> {
    find_template(&state, auth.organization_id, id).await?;
    let instances =
        WorkflowInstanceRepo::list_for_template(&state.pool, auth.organization_id, id).await?;
    Ok(Json(DataResponse { data: instances }))
}

async fn find_template(
    state: &AppState,
    organization_id: DbId,
    id: DbId,
) -> AppResult<WorkflowTemplate> {
    WorkflowTemplateRepo::find_visible(&state.pool, organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("WorkflowTemplate", id))
}

fn ensure_owned(template: &WorkflowTemplate, organization_id: DbId) -> AppResult<()> {
    if template.organization_id != Some(organization_id) {
        return Err(AppError::Core(CoreError::Forbidden(
            "Shared templates are read-only".into(),
        )));
    }
    Ok(())
}
