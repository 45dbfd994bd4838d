//! Operator endpoints: request metrics and WebSocket session bookkeeping.
//!
//! Admin only.

use axum::extract::{Query, State};
use axum::Json;
use pumpflix_core::pagination::clamp_limit;
use pumpflix_db::models::ws_session::WsSession;
use pumpflix_db::repositories::WsSessionRepo;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::metrics::MetricsSnapshot;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsSessionParams {
    /// Only connections that are still open. Defaults to `true`.
    pub active_only: Option<bool>,
    pub limit: Option<i64>,
}

/// GET /api/v1/metrics
#[utoipa::path(get, path = "/api/v1/metrics", tag = "system",
    security(("bearer" = [])),
    responses((status = 200, description = "Request counters by method, route and status class")))]
pub async fn metrics(
    RequireAdmin(_auth): RequireAdmin,
    State(state): State<AppState>,
) -> Json<DataResponse<MetricsSnapshot>> {
    Json(DataResponse {
        data: state.metrics.snapshot(),
    })
}

/// GET /api/v1/ws/sessions
#[utoipa::path(get, path = "/api/v1/ws/sessions", tag = "system",
    security(("bearer" = [])),
    params(("active_only" = Option<bool>, Query), ("limit" = Option<i64>, Query)),
    responses((status = 200, description = "WebSocket sessions of the organization")))]
pub async fn ws_sessions(
    RequireAdmin(auth): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<WsSessionParams>,
) -> AppResult<Json<DataResponse<Vec<WsSession>>>> {
    let limit = clamp_limit(params.limit, 100, 500);
    let sessions = WsSessionRepo::list(
        &state.pool,
        auth.organization_id,
        params.active_only.unwrap_or(true),
        limit,
    )
    .await?;
    Ok(Json(DataResponse { data: sessions }))
}
