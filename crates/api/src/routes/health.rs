//! Unversioned operational routes: liveness, readiness and the OpenAPI
//! document.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use utoipa::OpenApi;

use crate::openapi::ApiDoc;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while the database is unreachable.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    /// Live WebSocket connections held by this process.
    pub ws_connections: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = pumpflix_db::health_check(&state.pool).await.is_ok();
    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        ws_connections: state.ws_manager.connection_count().await,
    })
}

/// 503 until the database answers, for load balancer checks.
async fn ready(State(state): State<AppState>) -> StatusCode {
    match pumpflix_db::health_check(&state.pool).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .route("/api-docs/openapi.json", get(openapi_json))
}
