//! Handlers for the `/workflows` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pumpflix_core::error::CoreError;
use pumpflix_core::jobs::JOB_EXECUTE_WORKFLOW;
use pumpflix_core::plans::{crossed_warning, LimitKind, Plan};
use pumpflix_core::types::DbId;
use pumpflix_core::workflow::{
    execution_order, parse_and_validate, required_credentials, validate_name, validate_status,
    CredentialRequirement, WORKFLOW_STATUS_ACTIVE, WORKFLOW_STATUS_PAUSED,
};
use pumpflix_db::models::execution::{ExecuteWorkflow, ExecutionListQuery, ExecutionLog};
use pumpflix_db::models::job::EnqueueJob;
use pumpflix_db::models::workflow::{CreateWorkflow, UpdateWorkflow, Workflow, WorkflowListQuery};
use pumpflix_db::repositories::{ExecutionLogRepo, JobRepo, WorkflowRepo};
use pumpflix_events::event_types::{
    ENTITY_EXECUTION, ENTITY_WORKFLOW, EXECUTION_QUEUED, USAGE_LIMIT_REACHED, USAGE_THRESHOLD,
    WORKFLOW_ARCHIVED, WORKFLOW_CREATED, WORKFLOW_DELETED, WORKFLOW_UPDATED,
};
use pumpflix_events::PlatformEvent;
use serde::Serialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::limits::enforce_limit;
use crate::middleware::rbac::RequireEditor;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// Trigger recorded on executions started through the API.
const TRIGGER_MANUAL: &str = "manual";

/// Result of `POST /workflows/{id}/validate`.
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Node ids in the order they would run.
    pub execution_order: Vec<String>,
    pub required_credentials: Vec<CredentialRequirement>,
}

/// GET /api/v1/workflows
#[utoipa::path(get, path = "/api/v1/workflows", tag = "workflows", security(("bearer" = [])),
    params(
        ("status" = Option<String>, Query, description = "draft, active or paused"),
        ("tenant_id" = Option<i64>, Query, description = "Restrict to one tenant"),
        ("include_archived" = Option<bool>, Query, description = "Include archived workflows"),
        ("limit" = Option<i64>, Query), ("offset" = Option<i64>, Query),
    ),
    responses((status = 200, description = "Workflows of the organization")))]
pub async fn list_workflows(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<WorkflowListQuery>,
) -> AppResult<Json<DataResponse<Vec<Workflow>>>> {
    let (limit, offset) = PaginationParams {
        limit: params.limit,
        offset: params.offset,
    }
    .clamped();
    let workflows =
        WorkflowRepo::list(&state.pool, auth.organization_id, &params, limit, offset).await?;
    Ok(Json(DataResponse { data: workflows }))
}

/// POST /api/v1/workflows
#[utoipa::path(post, path = "/api/v1/workflows", tag = "workflows", security(("bearer" = [])),
    responses(
        (status = 201, description = "Workflow created"),
        (status = 400, description = "Invalid definition"),
        (status = 403, description = "Active workflow limit reached"),
        (status = 409, description = "Name already used in this tenant"),
    ))]
pub async fn create_workflow(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Json(mut input): Json<CreateWorkflow>,
) -> AppResult<(StatusCode, Json<DataResponse<Workflow>>)> {
    validate_name(&input.name)?;
    input.name = input.name.trim().to_string();
    parse_and_validate(&input.definition)?;
    if let Some(status) = input.status.as_deref() {
        validate_status(status)?;
        if status == WORKFLOW_STATUS_ACTIVE {
            enforce_limit(&state.pool, auth.organization_id, LimitKind::ActiveWorkflows).await?;
        }
    }

    let workflow = WorkflowRepo::create(
        &state.pool,
        auth.organization_id,
        auth.tenant_id,
        auth.user_id,
        &input,
    )
    .await?;

    publish_workflow_event(&state, &auth, WORKFLOW_CREATED, &workflow);
    Ok((StatusCode::CREATED, Json(DataResponse { data: workflow })))
}

/// GET /api/v1/workflows/{id}
#[utoipa::path(get, path = "/api/v1/workflows/{id}", tag = "workflows", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Workflow id")),
    responses((status = 200, description = "The workflow"), (status = 404, description = "Not found")))]
pub async fn get_workflow(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Workflow>>> {
    let workflow = find_workflow(&state, auth.organization_id, id).await?;
    Ok(Json(DataResponse { data: workflow }))
}

/// PUT /api/v1/workflows/{id}
#[utoipa::path(put, path = "/api/v1/workflows/{id}", tag = "workflows", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Workflow id")),
    responses(
        (status = 200, description = "Workflow updated"),
        (status = 403, description = "Active workflow limit reached"),
        (status = 404, description = "Not found"),
    ))]
pub async fn update_workflow(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(mut input): Json<UpdateWorkflow>,
) -> AppResult<Json<DataResponse<Workflow>>> {
    let existing = find_workflow(&state, auth.organization_id, id).await?;
    if existing.archived_at.is_some() {
        return Err(AppError::Core(CoreError::Conflict(
            "Archived workflows must be unarchived before editing".into(),
        )));
    }

    if let Some(name) = input.name.as_deref() {
        validate_name(name)?;
        input.name = Some(name.trim().to_string());
    }
    if let Some(definition) = input.definition.as_ref() {
        parse_and_validate(definition)?;
    }
    if let Some(status) = input.status.as_deref() {
        validate_status(status)?;
        if status == WORKFLOW_STATUS_ACTIVE && existing.status != WORKFLOW_STATUS_ACTIVE {
            enforce_limit(&state.pool, auth.organization_id, LimitKind::ActiveWorkflows).await?;
        }
    }

    let workflow = WorkflowRepo::update(&state.pool, auth.organization_id, id, &input)
        .await?
        .ok_or_else(|| AppError::not_found("Workflow", id))?;

    publish_workflow_event(&state, &auth, WORKFLOW_UPDATED, &workflow);
    Ok(Json(DataResponse { data: workflow }))
}

/// DELETE /api/v1/workflows/{id}
#[utoipa::path(delete, path = "/api/v1/workflows/{id}", tag = "workflows", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Workflow id")),
    responses((status = 204, description = "Workflow deleted"), (status = 404, description = "Not found")))]
pub async fn delete_workflow(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let workflow = find_workflow(&state, auth.organization_id, id).await?;
    if !WorkflowRepo::delete(&state.pool, auth.organization_id, id).await? {
        return Err(AppError::not_found("Workflow", id));
    }
    publish_workflow_event(&state, &auth, WORKFLOW_DELETED, &workflow);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/workflows/{id}/archive
#[utoipa::path(post, path = "/api/v1/workflows/{id}/archive", tag = "workflows",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Workflow id")),
    responses((status = 200, description = "Workflow archived"), (status = 409, description = "Already archived")))]
pub async fn archive_workflow(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Workflow>>> {
    find_workflow(&state, auth.organization_id, id).await?;
    let workflow = WorkflowRepo::archive(&state.pool, auth.organization_id, id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Conflict("Workflow is already archived".into())))?;
    publish_workflow_event(&state, &auth, WORKFLOW_ARCHIVED, &workflow);
    Ok(Json(DataResponse { data: workflow }))
}

/// POST /api/v1/workflows/{id}/unarchive
#[utoipa::path(post, path = "/api/v1/workflows/{id}/unarchive", tag = "workflows",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Workflow id")),
    responses((status = 200, description = "Workflow restored"), (status = 409, description = "Not archived")))]
pub async fn unarchive_workflow(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Workflow>>> {
    let existing = find_workflow(&state, auth.organization_id, id).await?;
    if existing.archived_at.is_some() && existing.status == WORKFLOW_STATUS_ACTIVE {
        enforce_limit(&state.pool, auth.organization_id, LimitKind::ActiveWorkflows).await?;
    }
    let workflow = WorkflowRepo::unarchive(&state.pool, auth.organization_id, id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Conflict("Workflow is not archived".into())))?;
    publish_workflow_event(&state, &auth, WORKFLOW_UPDATED, &workflow);
    Ok(Json(DataResponse { data: workflow }))
}

/// POST /api/v1/workflows/{id}/validate
///
/// Re-validates the stored definition and reports the run order and the
/// credentials it needs.
#[utoipa::path(post, path = "/api/v1/workflows/{id}/validate", tag = "workflows",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Workflow id")),
    responses((status = 200, description = "Definition is valid"), (status = 400, description = "Definition is invalid")))]
pub async fn validate_workflow(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ValidationReport>>> {
    let workflow = find_workflow(&state, auth.organization_id, id).await?;
    let def = parse_and_validate(&workflow.definition)?;
    let order = execution_order(&def)?
        .into_iter()
        .map(|n| n.id.clone())
        .collect();
    Ok(Json(DataResponse {
        data: ValidationReport {
            valid: true,
            execution_order: order,
            required_credentials: required_credentials(&def),
        },
    }))
}

/// POST /api/v1/workflows/{id}/execute
///
/// Queues an execution for the worker. Counts against the monthly
/// execution quota.
#[utoipa::path(post, path = "/api/v1/workflows/{id}/execute", tag = "workflows",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Workflow id")),
    responses(
        (status = 202, description = "Execution queued"),
        (status = 403, description = "PLAN_LIMIT_EXCEEDED, or executions paused for the subscription"),
        (status = 409, description = "Workflow is archived or paused"),
    ))]
pub async fn execute_workflow(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ExecuteWorkflow>,
) -> AppResult<(StatusCode, Json<DataResponse<ExecutionLog>>)> {
    let workflow = find_workflow(&state, auth.organization_id, id).await?;
    if workflow.archived_at.is_some() {
        return Err(AppError::Core(CoreError::Conflict(
            "Archived workflows cannot be executed".into(),
        )));
    }
    if workflow.status == WORKFLOW_STATUS_PAUSED {
        return Err(AppError::Core(CoreError::Conflict(
            "Paused workflows cannot be executed".into(),
        )));
    }
    parse_and_validate(&workflow.definition)?;

    let (plan, used) =
        enforce_limit(&state.pool, auth.organization_id, LimitKind::MonthlyExecutions).await?;

    let execution = ExecutionLogRepo::create_queued(
        &state.pool,
        auth.organization_id,
        workflow.tenant_id,
        workflow.id,
        Some(auth.user_id),
        TRIGGER_MANUAL,
        &input.input,
    )
    .await?;

    JobRepo::enqueue(
        &state.pool,
        &EnqueueJob {
            job_type: JOB_EXECUTE_WORKFLOW.to_string(),
            organization_id: Some(auth.organization_id),
            payload: json!({ "execution_id": execution.id }),
            max_attempts: None,
            run_after: None,
        },
    )
    .await?;

    tracing::info!(
        execution_id = execution.id,
        workflow_id = workflow.id,
        user_id = auth.user_id,
        "Execution queued"
    );

    state.event_bus.publish(
        PlatformEvent::new(EXECUTION_QUEUED)
            .with_organization(auth.organization_id)
            .with_source(ENTITY_EXECUTION, execution.id)
            .with_actor(auth.user_id)
            .with_payload(json!({ "workflow_id": workflow.id, "status": execution.status })),
    );

    let kind = LimitKind::MonthlyExecutions;
    let max = kind.max_for(plan.effective);
    let now_used = used + 1;
    if crossed_warning(used, now_used, max) {
        state
            .event_bus
            .publish(usage_event(USAGE_THRESHOLD, &auth, plan.effective, kind, now_used, max));
    }
    if max == Some(now_used) {
        state
            .event_bus
            .publish(usage_event(USAGE_LIMIT_REACHED, &auth, plan.effective, kind, now_used, max));
    }

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: execution })))
}

/// GET /api/v1/workflows/{id}/executions
#[utoipa::path(get, path = "/api/v1/workflows/{id}/executions", tag = "workflows",
    security(("bearer" = [])),
    params(
        ("id" = i64, Path, description = "Workflow id"),
        ("status" = Option<String>, Query), ("limit" = Option<i64>, Query), ("offset" = Option<i64>, Query),
    ),
    responses((status = 200, description = "Executions of the workflow, newest first")))]
pub async fn list_workflow_executions(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(mut params): Query<ExecutionListQuery>,
) -> AppResult<Json<DataResponse<Vec<ExecutionLog>>>> {
    find_workflow(&state, auth.organization_id, id).await?;
    params.workflow_id = Some(id);
    let (limit, offset) = PaginationParams {
        limit: params.limit,
        offset: params.offset,
    }
    .clamped();
    let executions =
        ExecutionLogRepo::list(&state.pool, auth.organization_id, &params, limit, offset).await?;
    Ok(Json(DataResponse { data: executions }))
}

async fn find_workflow(state: &AppState, organization_id: DbId, id: DbId) -> AppResult<Workflow> {
    WorkflowRepo::find_by_id(&state.pool, organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Workflow", id))
}

fn publish_workflow_event(state: &AppState, auth: &AuthUser, event_type: &str, workflow: &Workflow) {
    state.event_bus.publish(
        PlatformEvent::new(event_type)
            .with_organization(auth.organization_id)
            .with_source(ENTITY_WORKFLOW, workflow.id)
            .with_actor(auth.user_id)
            .with_payload(json!({ "name": workflow.name, "status": workflow.status })),
    );
}

fn usage_event(
    event_type: &str,
    auth: &AuthUser,
    plan: Plan,
    kind: LimitKind,
    current: i64,
    max: Option<i64>,
) -> PlatformEvent {
    PlatformEvent::new(event_type)
        .with_organization(auth.organization_id)
        .with_actor(auth.user_id)
        .with_payload(json!({
            "limit": kind.as_str(),
            "current": current,
            "max": max,
            "plan": plan.as_str(),
        }))
}
