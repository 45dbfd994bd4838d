pub mod auth;
pub mod billing;
pub mod credentials;
pub mod export_templates;
pub mod health;
pub mod notifications;
pub mod organization;
pub mod templates;
pub mod workflows;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                        WebSocket (?token=<jwt>)
/// /ws/sessions                               connection bookkeeping (admin)
///
/// /auth/register                             register organization (public)
/// /auth/login                                login (public)
/// /auth/refresh                              refresh (public)
/// /auth/logout                               logout
/// /auth/me                                   current user
///
/// /org                                       get, update (admin)
/// /tenants                                   list, create (admin)
/// /users                                     list, create (admin)
/// /users/{id}                                update (admin)
/// /users/{id}/deactivate                     deactivate (admin)
///
/// /workflows                                 list, create
/// /workflows/{id}                            get, update, delete
/// /workflows/{id}/archive|unarchive          soft archive
/// /workflows/{id}/validate                   dry-run validation
/// /workflows/{id}/execute                    queue an execution
/// /workflows/{id}/executions                 execution history
/// /executions                                list
/// /executions/{id}                           get
/// /executions/{id}/cancel                    cancel
///
/// /templates                                 list, create
/// /templates/{id}                            get, update, delete
/// /templates/{id}/instantiate                create workflow from template
/// /templates/{id}/instances                  list instances
/// /ai-templates                              list, create
/// /ai-templates/{id}                         get, delete
/// /ai-templates/{id}/promote                 promote to workflow template
///
/// /credentials                               list, create
/// /credentials/{id}                          get, update, delete
///
/// /billing/plans                             plan catalogue (public)
/// /billing/subscription                      current subscription
/// /billing/checkout                          checkout session (admin)
/// /billing/subscription/change|cancel        plan changes (admin)
/// /billing/usage                             usage against limits
/// /billing/webhook                           provider webhook (public, signed)
///
/// /export-templates                          list, create
/// /export-templates/{id}                     get, update, delete
/// /export-templates/{id}/archive             archive
/// /export-templates/{id}/versions[/{v}]      version snapshots
/// /export-templates/{id}/compare             schema diff between versions
/// /export-templates/{id}/run                 queue a run
/// /export-templates/{id}/runs                run history
///
/// /notifications                             list
/// /notifications/unread-count                unread count
/// /notifications/{id}/read                   mark read
/// /notifications/read-all                    mark all read
///
/// /analytics/usage                           execution statistics
/// /metrics                                   request counters (admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket endpoint and session bookkeeping.
        .route("/ws", get(ws::ws_handler))
        .route("/ws/sessions", get(handlers::system::ws_sessions))
        // Authentication.
        .nest("/auth", auth::router())
        // Organization administration.
        .nest("/org", organization::org_router())
        .nest("/tenants", organization::tenants_router())
        .nest("/users", organization::users_router())
        // Workflows and their executions.
        .nest("/workflows", workflows::router())
        .nest("/executions", workflows::executions_router())
        // Workflow templates and AI drafts.
        .nest("/templates", templates::router())
        .nest("/ai-templates", templates::ai_router())
        // Integration credentials.
        .nest("/credentials", credentials::router())
        // Subscription billing.
        .nest("/billing", billing::router())
        // Export templates, versions and runs.
        .nest("/export-templates", export_templates::router())
        // In-app notifications.
        .nest("/notifications", notifications::router())
        // Analytics and operator metrics.
        .route("/analytics/usage", get(handlers::analytics::usage))
        .route("/metrics", get(handlers::system::metrics))
}
