//! Repository for the `subscriptions` and `billing_events` tables.

use sqlx::PgPool;
use pumpflix_core::types::DbId;

use crate::models::subscription::{BillingEvent, Subscription, SubscriptionSync};

/// Column list for `subscriptions` queries.
const COLUMNS: &str = "id, organization_id, plan, status, provider_customer_id, \
                        provider_subscription_id, current_period_start, current_period_end, \
                        cancel_at_period_end, created_at, updated_at";

/// Provides access to organization subscriptions.
pub struct SubscriptionRepo;

impl SubscriptionRepo {
    pub async fn find_by_organization(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subscriptions WHERE organization_id = $1");
        sqlx::query_as::<_, Subscription>(&query)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_provider_subscription(
        pool: &PgPool,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM subscriptions WHERE provider_subscription_id = $1");
        sqlx::query_as::<_, Subscription>(&query)
            .bind(provider_subscription_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_provider_customer(
        pool: &PgPool,
        provider_customer_id: &str,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subscriptions WHERE provider_customer_id = $1");
        sqlx::query_as::<_, Subscription>(&query)
            .bind(provider_customer_id)
            .fetch_optional(pool)
            .await
    }

    /// Apply provider-side changes. Only non-`None` fields are written.
    pub async fn sync(
        pool: &PgPool,
        organization_id: DbId,
        input: &SubscriptionSync,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let query = format!(
            "UPDATE subscriptions SET
                plan = COALESCE($2, plan),
                status = COALESCE($3, status),
                provider_customer_id = COALESCE($4, provider_customer_id),
                provider_subscription_id = COALESCE($5, provider_subscription_id),
                current_period_start = COALESCE($6, current_period_start),
                current_period_end = COALESCE($7, current_period_end),
                cancel_at_period_end = COALESCE($8, cancel_at_period_end)
             WHERE organization_id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subscription>(&query)
            .bind(organization_id)
            .bind(&input.plan)
            .bind(&input.status)
            .bind(&input.provider_customer_id)
            .bind(&input.provider_subscription_id)
            .bind(input.current_period_start)
            .bind(input.current_period_end)
            .bind(input.cancel_at_period_end)
            .fetch_optional(pool)
            .await
    }

    /// Roll free subscriptions whose period has ended into the next month.
    /// Paid subscriptions are advanced by provider webhooks instead.
    pub async fn roll_free_periods(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subscriptions SET
                current_period_start = current_period_end,
                current_period_end = current_period_end + INTERVAL '1 month'
             WHERE provider_subscription_id IS NULL AND current_period_end <= NOW()",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Idempotency log of processed provider webhooks.
pub struct BillingEventRepo;

impl BillingEventRepo {
    /// Record a provider event. Returns `None` if it was already recorded,
    /// which callers treat as "already processed".
    pub async fn record(
        pool: &PgPool,
        provider_event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Option<BillingEvent>, sqlx::Error> {
        sqlx::query_as::<_, BillingEvent>(
            "INSERT INTO billing_events (provider_event_id, event_type, payload) \
             VALUES ($1, $2, $3) \
             ON CONFLICT ON CONSTRAINT uq_billing_events_provider_event DO NOTHING \
             RETURNING id, provider_event_id, event_type, payload, processed_at",
        )
        .bind(provider_event_id)
        .bind(event_type)
        .bind(payload)
        .fetch_optional(pool)
        .await
    }

    /// Drop a recorded event so a redelivery is processed again. Used when
    /// handling fails after [`Self::record`].
    pub async fn forget(pool: &PgPool, provider_event_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM billing_events WHERE provider_event_id = $1")
            .bind(provider_event_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
