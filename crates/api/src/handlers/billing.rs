//! Handlers for `/billing`: plan catalogue, subscription management, usage
//! and the payment-provider webhook.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use pumpflix_core::billing::{
    map_provider_status, verify_signature, DEFAULT_TOLERANCE_SECS, EVENT_CHECKOUT_COMPLETED,
    EVENT_INVOICE_PAID, EVENT_INVOICE_PAYMENT_FAILED, EVENT_SUBSCRIPTION_CREATED,
    EVENT_SUBSCRIPTION_DELETED, EVENT_SUBSCRIPTION_UPDATED, SIGNATURE_HEADER,
};
use pumpflix_core::error::CoreError;
use pumpflix_core::plans::{
    usage_ratio, LimitKind, Plan, PlanInfo, PlanLimits, SubscriptionStatus, ALL_PLANS,
};
use pumpflix_core::types::{DbId, Timestamp};
use pumpflix_db::models::analytics::UsageCounters;
use pumpflix_db::models::subscription::{PlanRequest, Subscription, SubscriptionSync};
use pumpflix_db::repositories::{
    AnalyticsRepo, BillingEventRepo, OrganizationRepo, SubscriptionRepo, UserRepo,
};
use pumpflix_db::DbPool;
use pumpflix_events::event_types::{ENTITY_SUBSCRIPTION, PAYMENT_FAILED, SUBSCRIPTION_CHANGED};
use pumpflix_events::PlatformEvent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::limits::{load_plan, PlanContext};
use crate::middleware::rbac::RequireAdmin;
use crate::payments::CheckoutRequest;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
    /// True when the plan was applied immediately (no live provider).
    pub applied: bool,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default = "default_true")]
    pub at_period_end: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct UsageReport {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    /// The plan whose limits currently apply.
    pub effective_plan: Plan,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub usage: UsageCounters,
    pub limits: PlanLimits,
    /// Fraction of each quota in use; `null` for unlimited quotas.
    pub ratios: BTreeMap<&'static str, Option<f64>>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}

/// The parts of a provider event envelope we read.
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: Value,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/billing/plans
#[utoipa::path(get, path = "/api/v1/billing/plans", tag = "billing",
    responses((status = 200, description = "Plan catalogue with prices and limits")))]
pub async fn list_plans() -> Json<DataResponse<Vec<PlanInfo>>> {
    Json(DataResponse {
        data: ALL_PLANS.iter().map(Plan::info).collect(),
    })
}

/// GET /api/v1/billing/subscription
#[utoipa::path(get, path = "/api/v1/billing/subscription", tag = "billing", security(("bearer" = [])),
    responses((status = 200, description = "The organization's subscription")))]
pub async fn get_subscription(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Subscription>>> {
    let ctx = load_plan(&state.pool, auth.organization_id).await?;
    Ok(Json(DataResponse {
        data: ctx.subscription,
    }))
}

/// POST /api/v1/billing/checkout
///
/// Starts a hosted checkout for a paid plan. Without a live provider the
/// plan is applied immediately.
#[utoipa::path(post, path = "/api/v1/billing/checkout", tag = "billing", security(("bearer" = [])),
    responses(
        (status = 200, description = "Checkout session created"),
        (status = 400, description = "Plan is free or has no configured price"),
        (status = 409, description = "Already subscribed to this plan"),
        (status = 502, description = "Payment provider error"),
    ))]
pub async fn create_checkout(
    RequireAdmin(auth): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<PlanRequest>,
) -> AppResult<Json<DataResponse<CheckoutResponse>>> {
    let plan = Plan::parse(&input.plan)?;
    if !plan.is_paid() {
        return Err(AppError::BadRequest(
            "The free plan needs no checkout; use subscription change instead".into(),
        ));
    }
    let ctx = load_plan(&state.pool, auth.organization_id).await?;
    if ctx.plan == plan && ctx.status == SubscriptionStatus::Active {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Organization is already on the {} plan",
            plan.as_str()
        ))));
    }

    let live = state.payments.is_live();
    let price_id = match state.config.billing.price_for(plan) {
        Some(price) => price.to_string(),
        None if live => {
            return Err(AppError::BadRequest(format!(
                "No provider price configured for the {} plan",
                plan.as_str()
            )))
        }
        None => plan.as_str().to_string(),
    };

    let customer_id = ensure_customer(&state, &auth, &ctx.subscription).await?;
    let session = state
        .payments
        .create_checkout_session(&CheckoutRequest {
            organization_id: auth.organization_id,
            customer_id: &customer_id,
            price_id: &price_id,
            plan: plan.as_str(),
            success_url: &state.config.billing.success_url,
            cancel_url: &state.config.billing.cancel_url,
        })
        .await?;

    if !live {
        let subscription = sync_subscription(
            &state.pool,
            auth.organization_id,
            &SubscriptionSync {
                plan: Some(plan.as_str().into()),
                status: Some(SubscriptionStatus::Active.as_str().into()),
                cancel_at_period_end: Some(false),
                ..Default::default()
            },
        )
        .await?;
        publish_subscription_changed(&state, &subscription, Some(auth.user_id));
    }

    tracing::info!(
        organization_id = auth.organization_id,
        plan = plan.as_str(),
        session_id = %session.id,
        live,
        "Checkout session created"
    );
    Ok(Json(DataResponse {
        data: CheckoutResponse {
            checkout_url: session.url,
            session_id: session.id,
            applied: !live,
        },
    }))
}

/// POST /api/v1/billing/subscription/change
///
/// Upgrades apply at once; downgrades are refused while current usage
/// exceeds the target plan's limits.
#[utoipa::path(post, path = "/api/v1/billing/subscription/change", tag = "billing",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Plan changed"),
        (status = 400, description = "A provider subscription is required; use checkout"),
        (status = 409, description = "Usage exceeds the target plan"),
    ))]
pub async fn change_plan(
    RequireAdmin(auth): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<PlanRequest>,
) -> AppResult<Json<DataResponse<Subscription>>> {
    let target = Plan::parse(&input.plan)?;
    let ctx = load_plan(&state.pool, auth.organization_id).await?;
    if ctx.plan == target {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Organization is already on the {} plan",
            target.as_str()
        ))));
    }

    let usage = AnalyticsRepo::counters(&state.pool, auth.organization_id).await?;
    ensure_usage_fits(target, &usage)?;

    let live = state.payments.is_live();
    let sync = match (live, ctx.subscription.provider_subscription_id.as_deref()) {
        (true, Some(sub_id)) => {
            if target.is_paid() {
                let price_id = state.config.billing.price_for(target).ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "No provider price configured for the {} plan",
                        target.as_str()
                    ))
                })?;
                state.payments.change_subscription_price(sub_id, price_id).await?;
                SubscriptionSync {
                    plan: Some(target.as_str().into()),
                    cancel_at_period_end: Some(false),
                    ..Default::default()
                }
            } else {
                // The paid plan stays in force until the period ends; the
                // deletion webhook moves the organization to free.
                state.payments.cancel_subscription(sub_id, true).await?;
                SubscriptionSync {
                    cancel_at_period_end: Some(true),
                    ..Default::default()
                }
            }
        }
        (true, None) if target.is_paid() => {
            return Err(AppError::BadRequest(
                "No active provider subscription; use checkout to subscribe".into(),
            ));
        }
        _ => SubscriptionSync {
            plan: Some(target.as_str().into()),
            status: Some(SubscriptionStatus::Active.as_str().into()),
            cancel_at_period_end: Some(false),
            ..Default::default()
        },
    };

    let subscription = sync_subscription(&state.pool, auth.organization_id, &sync).await?;
    tracing::info!(
        organization_id = auth.organization_id,
        from = ctx.plan.as_str(),
        to = target.as_str(),
        "Plan change requested"
    );
    publish_subscription_changed(&state, &subscription, Some(auth.user_id));
    Ok(Json(DataResponse { data: subscription }))
}

/// POST /api/v1/billing/subscription/cancel
#[utoipa::path(post, path = "/api/v1/billing/subscription/cancel", tag = "billing",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Subscription canceled or scheduled to cancel"),
        (status = 409, description = "Nothing to cancel"),
    ))]
pub async fn cancel_subscription(
    RequireAdmin(auth): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CancelRequest>,
) -> AppResult<Json<DataResponse<Subscription>>> {
    let ctx = load_plan(&state.pool, auth.organization_id).await?;
    if !ctx.plan.is_paid() || ctx.status == SubscriptionStatus::Canceled {
        return Err(AppError::Core(CoreError::Conflict(
            "There is no paid subscription to cancel".into(),
        )));
    }

    if state.payments.is_live() {
        if let Some(sub_id) = ctx.subscription.provider_subscription_id.as_deref() {
            state
                .payments
                .cancel_subscription(sub_id, input.at_period_end)
                .await?;
        }
    }

    let sync = if input.at_period_end {
        SubscriptionSync {
            cancel_at_period_end: Some(true),
            ..Default::default()
        }
    } else {
        SubscriptionSync {
            plan: Some(Plan::Free.as_str().into()),
            status: Some(SubscriptionStatus::Canceled.as_str().into()),
            cancel_at_period_end: Some(false),
            ..Default::default()
        }
    };
    let subscription = sync_subscription(&state.pool, auth.organization_id, &sync).await?;
    tracing::info!(
        organization_id = auth.organization_id,
        at_period_end = input.at_period_end,
        "Subscription cancellation requested"
    );
    publish_subscription_changed(&state, &subscription, Some(auth.user_id));
    Ok(Json(DataResponse { data: subscription }))
}

/// GET /api/v1/billing/usage
#[utoipa::path(get, path = "/api/v1/billing/usage", tag = "billing", security(("bearer" = [])),
    responses((status = 200, description = "Current usage against plan limits")))]
pub async fn get_usage(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<UsageReport>>> {
    let PlanContext {
        subscription,
        plan,
        status,
        effective,
    } = load_plan(&state.pool, auth.organization_id).await?;
    let usage = AnalyticsRepo::counters(&state.pool, auth.organization_id).await?;

    let ratios = [
        (LimitKind::MonthlyExecutions, usage.monthly_executions),
        (LimitKind::ActiveWorkflows, usage.active_workflows),
        (LimitKind::Credentials, usage.credentials),
        (LimitKind::ExportTemplates, usage.export_templates),
    ]
    .into_iter()
    .map(|(kind, current)| (kind.as_str(), usage_ratio(current, kind.max_for(effective))))
    .collect();

    Ok(Json(DataResponse {
        data: UsageReport {
            plan,
            status,
            effective_plan: effective,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            usage,
            limits: effective.limits(),
            ratios,
        },
    }))
}

/// POST /api/v1/billing/webhook
///
/// Public; authenticated by the provider signature over the raw body.
/// Each provider event id is processed at most once.
#[utoipa::path(post, path = "/api/v1/billing/webhook", tag = "billing",
    responses(
        (status = 200, description = "Event accepted (or already processed)"),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Missing or invalid signature"),
    ))]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let secret = state.config.billing.webhook_secret.as_deref().ok_or_else(|| {
        AppError::Core(CoreError::Unauthorized("Webhooks are not configured".into()))
    })?;
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("Missing signature header".into())))?;
    verify_signature(&body, header, secret, Utc::now().timestamp(), DEFAULT_TOLERANCE_SECS)?;

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook JSON: {e}")))?;
    let envelope: WebhookEnvelope = serde_json::from_value(payload.clone())
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook envelope: {e}")))?;

    if BillingEventRepo::record(&state.pool, &envelope.id, &envelope.event_type, &payload)
        .await?
        .is_none()
    {
        tracing::debug!(event_id = %envelope.id, "Duplicate webhook ignored");
        return Ok(Json(WebhookAck {
            received: true,
            duplicate: true,
        }));
    }

    if let Err(e) = apply_webhook(&state, &envelope).await {
        BillingEventRepo::forget(&state.pool, &envelope.id).await?;
        return Err(e);
    }

    Ok(Json(WebhookAck {
        received: true,
        duplicate: false,
    }))
}

// ---------------------------------------------------------------------------
// Webhook processing
// ---------------------------------------------------------------------------

async fn apply_webhook(state: &AppState, envelope: &WebhookEnvelope) -> AppResult<()> {
    let object = &envelope.data.object;
    let event_type = envelope.event_type.as_str();

    let Some(organization_id) = resolve_organization(&state.pool, object).await? else {
        tracing::warn!(
            event_id = %envelope.id,
            event_type,
            "Webhook does not match any organization; ignored"
        );
        return Ok(());
    };

    let sync = match event_type {
        EVENT_SUBSCRIPTION_CREATED | EVENT_SUBSCRIPTION_UPDATED => {
            subscription_sync(&state.config.billing, object)
        }
        EVENT_SUBSCRIPTION_DELETED => SubscriptionSync {
            plan: Some(Plan::Free.as_str().into()),
            status: Some(SubscriptionStatus::Canceled.as_str().into()),
            cancel_at_period_end: Some(false),
            ..Default::default()
        },
        EVENT_INVOICE_PAID => SubscriptionSync {
            status: Some(SubscriptionStatus::Active.as_str().into()),
            ..Default::default()
        },
        EVENT_INVOICE_PAYMENT_FAILED => SubscriptionSync {
            status: Some(SubscriptionStatus::PastDue.as_str().into()),
            ..Default::default()
        },
        EVENT_CHECKOUT_COMPLETED => SubscriptionSync {
            plan: object
                .pointer("/metadata/plan")
                .and_then(Value::as_str)
                .and_then(|p| Plan::parse(p).ok())
                .map(|p| p.as_str().to_string()),
            status: Some(SubscriptionStatus::Active.as_str().into()),
            provider_customer_id: str_field(object, "customer"),
            provider_subscription_id: str_field(object, "subscription"),
            cancel_at_period_end: Some(false),
            ..Default::default()
        },
        other => {
            tracing::debug!(event_type = other, "Unhandled webhook event type");
            return Ok(());
        }
    };

    let subscription = sync_subscription(&state.pool, organization_id, &sync).await?;
    tracing::info!(
        organization_id,
        event_type,
        plan = %subscription.plan,
        status = %subscription.status,
        "Subscription synced from webhook"
    );

    if event_type == EVENT_INVOICE_PAYMENT_FAILED {
        state.event_bus.publish(
            PlatformEvent::new(PAYMENT_FAILED)
                .with_organization(organization_id)
                .with_source(ENTITY_SUBSCRIPTION, subscription.id)
                .with_payload(json!({
                    "plan": subscription.plan,
                    "invoice_id": object.get("id").and_then(Value::as_str),
                })),
        );
    }
    publish_subscription_changed(state, &subscription, None);
    Ok(())
}

/// Find the organization a provider object belongs to: explicit metadata
/// or checkout reference first, then the stored provider ids.
async fn resolve_organization(pool: &DbPool, object: &Value) -> AppResult<Option<DbId>> {
    let explicit = object
        .pointer("/metadata/organization_id")
        .or_else(|| object.get("client_reference_id"))
        .and_then(|v| v.as_i64().or_else(|| v.as_str()?.parse().ok()));
    if let Some(id) = explicit {
        return Ok(Some(id));
    }

    let object_kind = object.get("object").and_then(Value::as_str);
    let subscription_id = if object_kind == Some("subscription") {
        str_field(object, "id")
    } else {
        str_field(object, "subscription")
    };
    if let Some(sub_id) = subscription_id {
        if let Some(sub) = SubscriptionRepo::find_by_provider_subscription(pool, &sub_id).await? {
            return Ok(Some(sub.organization_id));
        }
    }
    if let Some(customer) = str_field(object, "customer") {
        if let Some(sub) = SubscriptionRepo::find_by_provider_customer(pool, &customer).await? {
            return Ok(Some(sub.organization_id));
        }
    }
    Ok(None)
}

/// Translate a provider subscription object into column updates.
fn subscription_sync(billing: &crate::config::BillingConfig, object: &Value) -> SubscriptionSync {
    let plan = object
        .pointer("/items/data/0/price/id")
        .and_then(Value::as_str)
        .and_then(|price| billing.plan_for_price(price))
        .map(|p| p.as_str().to_string());
    SubscriptionSync {
        plan,
        status: object
            .get("status")
            .and_then(Value::as_str)
            .map(|s| map_provider_status(s).as_str().to_string()),
        provider_customer_id: str_field(object, "customer"),
        provider_subscription_id: str_field(object, "id"),
        current_period_start: unix_field(object, "current_period_start"),
        current_period_end: unix_field(object, "current_period_end"),
        cancel_at_period_end: object.get("cancel_at_period_end").and_then(Value::as_bool),
    }
}

fn str_field(object: &Value, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn unix_field(object: &Value, key: &str) -> Option<Timestamp> {
    object
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Return the provider customer id, creating the customer on first use.
async fn ensure_customer(
    state: &AppState,
    auth: &AuthUser,
    subscription: &Subscription,
) -> AppResult<String> {
    if let Some(existing) = subscription.provider_customer_id.clone() {
        return Ok(existing);
    }
    let user = UserRepo::find_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User", auth.user_id))?;
    let org = OrganizationRepo::find_by_id(&state.pool, auth.organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("Organization", auth.organization_id))?;

    let customer_id = state
        .payments
        .create_customer(auth.organization_id, &user.email, &org.name)
        .await?;
    sync_subscription(
        &state.pool,
        auth.organization_id,
        &SubscriptionSync {
            provider_customer_id: Some(customer_id.clone()),
            ..Default::default()
        },
    )
    .await?;
    Ok(customer_id)
}

async fn sync_subscription(
    pool: &DbPool,
    organization_id: DbId,
    sync: &SubscriptionSync,
) -> AppResult<Subscription> {
    SubscriptionRepo::sync(pool, organization_id, sync)
        .await?
        .ok_or_else(|| AppError::not_found("Subscription", organization_id))
}

/// Refuse a plan whose limits are already exceeded by current usage.
/// Monthly executions are not checked; the new cap applies going forward.
fn ensure_usage_fits(target: Plan, usage: &UsageCounters) -> AppResult<()> {
    let checks = [
        (LimitKind::ActiveWorkflows, usage.active_workflows),
        (LimitKind::Credentials, usage.credentials),
        (LimitKind::ExportTemplates, usage.export_templates),
    ];
    for (kind, current) in checks {
        if let Some(max) = kind.max_for(target) {
            if current > max {
                return Err(AppError::Core(CoreError::Conflict(format!(
                    "The {} plan allows {max} {}; the organization has {current}",
                    target.as_str(),
                    kind.as_str().replace('_', " ")
                ))));
            }
        }
    }
    Ok(())
}

fn publish_subscription_changed(state: &AppState, subscription: &Subscription, actor: Option<DbId>) {
    let mut event = PlatformEvent::new(SUBSCRIPTION_CHANGED)
        .with_organization(subscription.organization_id)
        .with_source(ENTITY_SUBSCRIPTION, subscription.id)
        .with_payload(json!({
            "plan": subscription.plan,
            "status": subscription.status,
            "cancel_at_period_end": subscription.cancel_at_period_end,
        }));
    if let Some(user_id) = actor {
        event = event.with_actor(user_id);
    }
    state.event_bus.publish(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BillingConfig;

    #[test]
    fn subscription_object_maps_to_sync() {
        let billing = BillingConfig {
            price_pro: Some("price_pro".into()),
            ..Default::default()
        };
        let object = json!({
            "id": "sub_1",
            "object": "subscription",
            "customer": "cus_9",
            "status": "past_due",
            "cancel_at_period_end": false,
            "current_period_start": 1_767_225_600,
            "current_period_end": 1_769_904_000,
            "items": { "data": [ { "price": { "id": "price_pro" } } ] }
        });
        let sync = subscription_sync(&billing, &object);
        assert_eq!(sync.plan.as_deref(), Some("pro"));
        assert_eq!(sync.status.as_deref(), Some("past_due"));
        assert_eq!(sync.provider_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(sync.provider_customer_id.as_deref(), Some("cus_9"));
        assert_eq!(
            sync.current_period_start.map(|t| t.timestamp()),
            Some(1_767_225_600)
        );
    }

    #[test]
    fn unknown_price_leaves_plan_untouched() {
        let object = json!({ "id": "sub_1", "items": { "data": [ { "price": { "id": "price_x" } } ] } });
        assert!(subscription_sync(&BillingConfig::default(), &object).plan.is_none());
    }

    #[test]
    fn downgrade_blocked_by_usage() {
        let usage = UsageCounters {
            monthly_executions: 5_000,
            active_workflows: 6,
            credentials: 1,
            export_templates: 0,
        };
        assert!(ensure_usage_fits(Plan::Pro, &usage).is_ok());
        let err = ensure_usage_fits(Plan::Free, &usage).unwrap_err();
        assert!(err.to_string().contains("active workflows"));
    }
}
