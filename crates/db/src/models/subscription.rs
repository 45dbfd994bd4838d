//! Subscription and billing-event models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// A row from the `subscriptions` table. One per organization.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subscription {
    pub id: DbId,
    pub organization_id: DbId,
    pub plan: String,
    pub status: String,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields a provider webhook may change on a subscription.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSync {
    pub plan: Option<String>,
    pub status: Option<String>,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: Option<bool>,
}

/// A row from the `billing_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BillingEvent {
    pub id: DbId,
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed_at: Timestamp,
}

/// Body of `POST /api/v1/billing/checkout` and `/billing/subscription/change`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    pub plan: String,
}
