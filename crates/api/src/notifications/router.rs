//! Event-to-notification routing engine.

use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::{Duration, Utc};
use pumpflix_core::types::{DbId, Timestamp};
use pumpflix_db::models::notification::{NewNotice, Notification};
use pumpflix_db::repositories::{NotificationRepo, SubscriptionRepo, UserRepo};
use pumpflix_db::DbPool;
use pumpflix_events::event_types::{
    EXECUTION_FAILED, EXPORT_FAILED, PAYMENT_FAILED, SUBSCRIPTION_CHANGED, USAGE_LIMIT_REACHED,
    USAGE_THRESHOLD,
};
use pumpflix_events::PlatformEvent;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::ws::WsManager;

/// Who receives a notification for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    /// The user who triggered it, falling back to the admins.
    ActorOrAdmins,
    /// Every active owner/admin of the organization.
    Admins,
}

/// Routes platform events to user notifications.
pub struct NotificationRouter {
    pool: DbPool,
    ws_manager: Arc<WsManager>,
}

impl NotificationRouter {
    pub fn new(pool: DbPool, ws_manager: Arc<WsManager>) -> Self {
        Self { pool, ws_manager }
    }

    /// Run the main routing loop until the event bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = self.route_event(&event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            "Failed to route event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification router lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification router shutting down");
                    break;
                }
            }
        }
    }

    /// Route a single event to all affected users.
    pub async fn route_event(&self, event: &PlatformEvent) -> Result<usize, sqlx::Error> {
        let (Some(audience), Some(organization_id)) = (audience(&event.event_type), event.organization_id)
        else {
            return Ok(0);
        };
        let kind = notification_kind(event);

        // Usage warnings go out once per billing period.
        if is_usage_event(&event.event_type) {
            let since = self.period_start(organization_id).await?;
            if NotificationRepo::exists_since(&self.pool, organization_id, &kind, since).await? {
                tracing::debug!(kind = %kind, organization_id, "Usage notification already sent");
                return Ok(0);
            }
        }

        let targets = match (audience, event.actor_user_id) {
            (Audience::ActorOrAdmins, Some(actor)) => vec![actor],
            _ => UserRepo::list_admin_ids(&self.pool, organization_id).await?,
        };

        let (title, body) = describe(event);
        let notice = NewNotice {
            organization_id,
            kind,
            title,
            body,
            data: json!({
                "event_type": event.event_type,
                "source_entity_type": event.source_entity_type,
                "source_entity_id": event.source_entity_id,
                "payload": event.payload,
            }),
        };
        let delivered = NotificationRepo::fan_out(&self.pool, &notice, &targets).await?;
        for notification in &delivered {
            self.push(notification).await;
        }
        Ok(delivered.len())
    }

    /// Start of the organization's current billing period, or the last 30
    /// days when it has no subscription row.
    async fn period_start(&self, organization_id: DbId) -> Result<Timestamp, sqlx::Error> {
        Ok(SubscriptionRepo::find_by_organization(&self.pool, organization_id)
            .await?
            .map(|s| s.current_period_start)
            .unwrap_or_else(|| Utc::now() - Duration::days(30)))
    }

    async fn push(&self, notification: &Notification) {
        let msg = json!({
            "type": "notification",
            "notification": notification,
        });
        self.ws_manager
            .send_to_user(notification.user_id, Message::Text(msg.to_string().into()))
            .await;
    }
}

fn audience(event_type: &str) -> Option<Audience> {
    match event_type {
        EXECUTION_FAILED | EXPORT_FAILED => Some(Audience::ActorOrAdmins),
        USAGE_THRESHOLD | USAGE_LIMIT_REACHED | PAYMENT_FAILED | SUBSCRIPTION_CHANGED => {
            Some(Audience::Admins)
        }
        _ => None,
    }
}

fn is_usage_event(event_type: &str) -> bool {
    matches!(event_type, USAGE_THRESHOLD | USAGE_LIMIT_REACHED)
}

/// Stored `kind`. Usage events are keyed per limit so each limit warns
/// independently.
fn notification_kind(event: &PlatformEvent) -> String {
    match event.payload.get("limit").and_then(Value::as_str) {
        Some(limit) if is_usage_event(&event.event_type) => format!("{}:{limit}", event.event_type),
        _ => event.event_type.clone(),
    }
}

fn describe(event: &PlatformEvent) -> (String, Option<String>) {
    let payload = &event.payload;
    let str_field = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);
    let limit = str_field("limit").map(|l| l.replace('_', " "));

    match event.event_type.as_str() {
        EXECUTION_FAILED => (
            "Workflow execution failed".into(),
            str_field("error").or_else(|| {
                event
                    .source_entity_id
                    .map(|id| format!("Execution {id} did not complete"))
            }),
        ),
        EXPORT_FAILED => ("Export run failed".into(), str_field("error")),
        USAGE_THRESHOLD => (
            "Approaching plan limit".into(),
            Some(format!(
                "You have used {} of {} {} this period",
                payload.get("current").unwrap_or(&Value::Null),
                payload.get("max").unwrap_or(&Value::Null),
                limit.unwrap_or_default()
            )),
        ),
        USAGE_LIMIT_REACHED => (
            "Plan limit reached".into(),
            Some(format!(
                "The {} limit of your plan is reached. Upgrade to continue.",
                limit.unwrap_or_default()
            )),
        ),
        PAYMENT_FAILED => (
            "Payment failed".into(),
            Some("Update your payment method to keep your subscription active".into()),
        ),
        SUBSCRIPTION_CHANGED => (
            "Subscription updated".into(),
            match (str_field("plan"), str_field("status")) {
                (Some(plan), Some(status)) => Some(format!("Plan {plan}, status {status}")),
                _ => None,
            },
        ),
        other => (other.to_string(), None),
    }
}
