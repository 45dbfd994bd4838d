//! Route definitions for the `/billing` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::billing;
use crate::state::AppState;

/// Routes mounted at `/billing`.
///
/// ```text
/// GET  /plans                  -> list_plans (public)
/// GET  /subscription           -> get_subscription
/// POST /checkout               -> create_checkout (admin)
/// POST /subscription/change    -> change_plan (admin)
/// POST /subscription/cancel    -> cancel_subscription (admin)
/// GET  /usage                  -> get_usage
/// POST /webhook                -> webhook (public, signed)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plans", get(billing::list_plans))
        .route("/subscription", get(billing::get_subscription))
        .route("/checkout", post(billing::create_checkout))
        .route("/subscription/change", post(billing::change_plan))
        .route("/subscription/cancel", post(billing::cancel_subscription))
        .route("/usage", get(billing::get_usage))
        .route("/webhook", post(billing::webhook))
}
