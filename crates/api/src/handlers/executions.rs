//! Handlers for the `/executions` resource.

use axum::extract::{Path, Query, State};
use axum::Json;
use pumpflix_core::error::CoreError;
use pumpflix_core::types::DbId;
use pumpflix_core::workflow::is_terminal_execution_status;
use pumpflix_db::models::execution::{ExecutionListQuery, ExecutionLog};
use pumpflix_db::repositories::ExecutionLogRepo;
use pumpflix_events::event_types::{ENTITY_EXECUTION, EXECUTION_CANCELLED};
use pumpflix_events::PlatformEvent;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireEditor;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/executions
#[utoipa::path(get, path = "/api/v1/executions", tag = "executions", security(("bearer" = [])),
    params(
        ("workflow_id" = Option<i64>, Query), ("status" = Option<String>, Query),
        ("limit" = Option<i64>, Query), ("offset" = Option<i64>, Query),
    ),
    responses((status = 200, description = "Executions, newest first")))]
pub async fn list_executions(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ExecutionListQuery>,
) -> AppResult<Json<DataResponse<Vec<ExecutionLog>>>> {
    let (limit, offset) = PaginationParams {
        limit: params.limit,
        offset: params.offset,
    }
    .clamped();
    let executions =
        ExecutionLogRepo::list(&state.pool, auth.organization_id, &params, limit, offset).await?;
    Ok(Json(DataResponse { data: executions }))
}

/// GET /api/v1/executions/{id}
#[utoipa::path(get, path = "/api/v1/executions/{id}", tag = "executions", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Execution id")),
    responses((status = 200, description = "Execution with its step log"), (status = 404, description = "Not found")))]
pub async fn get_execution(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ExecutionLog>>> {
    let execution = ExecutionLogRepo::find_by_id(&state.pool, auth.organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Execution", id))?;
    Ok(Json(DataResponse { data: execution }))
}

/// POST /api/v1/executions/{id}/cancel
///
/// Only queued or running executions can be cancelled. A running one stops
/// at the next step boundary.
#[utoipa::path(post, path = "/api/v1/executions/{id}/cancel", tag = "executions",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Execution cancelled"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Execution already finished"),
    ))]
pub async fn cancel_execution(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ExecutionLog>>> {
    let existing = ExecutionLogRepo::find_by_id(&state.pool, auth.organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Execution", id))?;
    if is_terminal_execution_status(&existing.status) {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Execution already {}",
            existing.status
        ))));
    }

    let execution = ExecutionLogRepo::cancel(&state.pool, auth.organization_id, id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Conflict("Execution already finished".into())))?;

    tracing::info!(execution_id = id, user_id = auth.user_id, "Execution cancelled");
    state.event_bus.publish(
        PlatformEvent::new(EXECUTION_CANCELLED)
            .with_organization(auth.organization_id)
            .with_source(ENTITY_EXECUTION, execution.id)
            .with_actor(auth.user_id)
            .with_payload(json!({ "workflow_id": execution.workflow_id, "status": execution.status })),
    );
    Ok(Json(DataResponse { data: execution }))
}
