//! Route definitions for `/workflows` and `/executions`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{executions, workflows};
use crate::state::AppState;

/// Routes mounted at `/workflows`.
///
/// ```text
/// GET    /                  -> list_workflows
/// POST   /                  -> create_workflow
/// GET    /{id}              -> get_workflow
/// PUT    /{id}              -> update_workflow
/// DELETE /{id}              -> delete_workflow
/// POST   /{id}/archive      -> archive_workflow
/// POST   /{id}/unarchive    -> unarchive_workflow
/// POST   /{id}/validate     -> validate_workflow
/// POST   /{id}/execute      -> execute_workflow
/// GET    /{id}/executions   -> list_workflow_executions
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(workflows::list_workflows).post(workflows::create_workflow),
        )
        .route(
            "/{id}",
            get(workflows::get_workflow)
                .put(workflows::update_workflow)
                .delete(workflows::delete_workflow),
        )
        .route("/{id}/archive", post(workflows::archive_workflow))
        .route("/{id}/unarchive", post(workflows::unarchive_workflow))
        .route("/{id}/validate", post(workflows::validate_workflow))
        .route("/{id}/execute", post(workflows::execute_workflow))
        .route("/{id}/executions", get(workflows::list_workflow_executions))
}

/// Routes mounted at `/executions`.
pub fn executions_router() -> Router<AppState> {
    Router::new()
        .route("/", get(executions::list_executions))
        .route("/{id}", get(executions::get_execution))
        .route("/{id}/cancel", post(executions::cancel_execution))
}
