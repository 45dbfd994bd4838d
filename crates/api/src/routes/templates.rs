//! Route definitions for `/templates` and `/ai-templates`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{ai_templates, templates};
use crate::state::AppState;

/// Routes mounted at `/templates`.
///
/// ```text
/// GET    /                   -> list_templates
/// POST   /                   -> create_template
/// GET    /{id}               -> get_template
/// PUT    /{id}               -> update_template
/// DELETE /{id}               -> delete_template
/// POST   /{id}/instantiate   -> instantiate_template
/// GET    /{id}/instances     -> list_instances
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(templates::list_templates).post(templates::create_template),
        )
        .route(
            "/{id}",
            get(templates::get_template)
                .put(templates::update_template)
                .delete(templates::delete_template),
        )
        .route("/{id}/instantiate", post(templates::instantiate_template))
        .route("/{id}/instances", get(templates::list_instances))
}

/// Routes mounted at `/ai-templates`.
pub fn ai_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(ai_templates::list_ai_templates).post(ai_templates::create_ai_template),
        )
        .route(
            "/{id}",
            get(ai_templates::get_ai_template).delete(ai_templates::delete_ai_template),
        )
        .route("/{id}/promote", post(ai_templates::promote_ai_template))
}
