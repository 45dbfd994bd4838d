//! Route definitions for the `/export-templates` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::export_templates;
use crate::state::AppState;

/// Routes mounted at `/export-templates`.
///
/// ```text
/// GET    /                          -> list_export_templates
/// POST   /                          -> create_export_template
/// GET    /{id}                      -> get_export_template
/// PUT    /{id}                      -> update_export_template
/// DELETE /{id}                      -> delete_export_template
/// POST   /{id}/archive              -> archive_export_template
/// GET    /{id}/versions             -> list_versions
/// GET    /{id}/versions/{version}   -> get_version
/// GET    /{id}/compare?from=&to=    -> compare_versions
/// POST   /{id}/run                  -> run_export
/// GET    /{id}/runs                 -> list_runs
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(export_templates::list_export_templates)
                .post(export_templates::create_export_template),
        )
        .route(
            "/{id}",
            get(export_templates::get_export_template)
                .put(export_templates::update_export_template)
                .delete(export_templates::delete_export_template),
        )
        .route("/{id}/archive", post(export_templates::archive_export_template))
        .route("/{id}/versions", get(export_templates::list_versions))
        .route("/{id}/versions/{version}", get(export_templates::get_version))
        .route("/{id}/compare", get(export_templates::compare_versions))
        .route("/{id}/run", post(export_templates::run_export))
        .route("/{id}/runs", get(export_templates::list_runs))
}
