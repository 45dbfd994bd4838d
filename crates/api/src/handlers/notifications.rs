//! Handlers for the `/notifications` resource.
//!
//! Notifications are per-user; every query is scoped to the caller.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pumpflix_core::pagination::{clamp_limit, clamp_offset, DEFAULT_LIMIT, MAX_LIMIT};
use pumpflix_core::types::DbId;
use pumpflix_db::models::notification::{Notification, NotificationListQuery, UnreadCount};
use pumpflix_db::repositories::NotificationRepo;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

/// GET /api/v1/notifications
#[utoipa::path(get, path = "/api/v1/notifications", tag = "notifications",
    security(("bearer" = [])),
    params(
        ("unread_only" = Option<bool>, Query),
        ("limit" = Option<i64>, Query), ("offset" = Option<i64>, Query),
    ),
    responses((status = 200, description = "The caller's notifications, newest first")))]
pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<NotificationListQuery>,
) -> AppResult<Json<DataResponse<Vec<Notification>>>> {
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let offset = clamp_offset(params.offset);
    let unread_only = params.unread_only.unwrap_or(false);

    let items =
        NotificationRepo::list_for_user(&state.pool, auth.user_id, unread_only, limit, offset)
            .await?;
    Ok(Json(DataResponse { data: items }))
}

/// GET /api/v1/notifications/unread-count
#[utoipa::path(get, path = "/api/v1/notifications/unread-count", tag = "notifications",
    security(("bearer" = [])),
    responses((status = 200, description = "Number of unread notifications")))]
pub async fn unread_count(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<UnreadCount>>> {
    let count = NotificationRepo::unread_count(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse {
        data: UnreadCount { count },
    }))
}

/// POST /api/v1/notifications/{id}/read
///
/// 404 when the notification does not belong to the caller.
#[utoipa::path(post, path = "/api/v1/notifications/{id}/read", tag = "notifications",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Notification id")),
    responses((status = 204, description = "Marked as read"), (status = 404, description = "Not found")))]
pub async fn mark_read(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !NotificationRepo::mark_read(&state.pool, id, auth.user_id).await? {
        return Err(AppError::not_found("Notification", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/notifications/read-all
#[utoipa::path(post, path = "/api/v1/notifications/read-all", tag = "notifications",
    security(("bearer" = [])),
    responses((status = 200, description = "Number of notifications marked")))]
pub async fn mark_all_read(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<MarkedRead>>> {
    let updated = NotificationRepo::mark_all_read(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse {
        data: MarkedRead { updated },
    }))
}
