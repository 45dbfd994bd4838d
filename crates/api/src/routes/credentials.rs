//! Route definitions for the `/credentials` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::credentials;
use crate::state::AppState;

/// Routes mounted at `/credentials`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(credentials::list_credentials).post(credentials::create_credential),
        )
        .route(
            "/{id}",
            get(credentials::get_credential)
                .put(credentials::update_credential)
                .delete(credentials::delete_credential),
        )
}
