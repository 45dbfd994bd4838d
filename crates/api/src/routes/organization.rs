//! Route definitions for the organization, its tenants and its users.
//!
//! All endpoints require the admin role.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::organization;
use crate::state::AppState;

/// Routes mounted at `/org`.
pub fn org_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(organization::get_organization).put(organization::update_organization),
        )
        .route("/events", get(organization::list_events))
}

/// Routes mounted at `/tenants`.
pub fn tenants_router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(organization::list_tenants).post(organization::create_tenant),
    )
}

/// Routes mounted at `/users`.
///
/// ```text
/// GET  /                 -> list_users
/// POST /                 -> create_user
/// PUT  /{id}             -> update_user
/// POST /{id}/deactivate  -> deactivate_user
/// ```
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(organization::list_users).post(organization::create_user),
        )
        .route("/{id}", put(organization::update_user))
        .route("/{id}/deactivate", post(organization::deactivate_user))
}
