//! Handlers for `/analytics`.

use axum::extract::{Query, State};
use axum::Json;
use pumpflix_db::models::analytics::{UsageAnalytics, UsageQuery};
use pumpflix_db::repositories::AnalyticsRepo;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_DAYS: i64 = 30;
const MAX_DAYS: i64 = 365;

/// GET /api/v1/analytics/usage?days=
#[utoipa::path(get, path = "/api/v1/analytics/usage", tag = "analytics",
    security(("bearer" = [])),
    params(("days" = Option<i64>, Query, description = "Trailing window, 1-365 (default 30)")),
    responses((status = 200, description = "Executions per day, totals and top workflows")))]
pub async fn usage(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> AppResult<Json<DataResponse<UsageAnalytics>>> {
    let days = window_days(query.days);
    let analytics = AnalyticsRepo::usage(&state.pool, auth.organization_id, days).await?;
    Ok(Json(DataResponse { data: analytics }))
}

fn window_days(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_clamped() {
        assert_eq!(window_days(None), 30);
        assert_eq!(window_days(Some(0)), 1);
        assert_eq!(window_days(Some(7)), 7);
        assert_eq!(window_days(Some(10_000)), 365);
    }
}
