//! `usage.check`: compare an organization's counters with its plan and
//! raise usage events. Repeat events within a billing period are
//! collapsed by the API's notification router.

use pumpflix_core::plans::{
    effective_plan, usage_ratio, LimitKind, Plan, SubscriptionStatus, WARNING_THRESHOLD,
};
use pumpflix_core::types::DbId;
use pumpflix_db::models::analytics::UsageCounters;
use pumpflix_db::repositories::{AnalyticsRepo, SubscriptionRepo};
use pumpflix_db::DbPool;
use pumpflix_events::event_types::{USAGE_LIMIT_REACHED, USAGE_THRESHOLD};
use pumpflix_events::PlatformEvent;
use serde_json::json;

use super::notify;
use crate::error::JobError;

const LIMITS: [LimitKind; 4] = [
    LimitKind::MonthlyExecutions,
    LimitKind::ActiveWorkflows,
    LimitKind::Credentials,
    LimitKind::ExportTemplates,
];

/// One quota at or past the warning line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageAlert {
    pub event_type: &'static str,
    pub limit: LimitKind,
    pub current: i64,
    pub max: i64,
}

pub async fn check_usage(pool: &DbPool, organization_id: DbId) -> Result<(), JobError> {
    let Some(subscription) = SubscriptionRepo::find_by_organization(pool, organization_id).await?
    else {
        return Err(JobError::NotFound { entity: "Subscription", id: organization_id });
    };
    let plan = effective_plan(
        Plan::parse(&subscription.plan)?,
        SubscriptionStatus::parse(&subscription.status)?,
    );
    let counters = AnalyticsRepo::counters(pool, organization_id).await?;

    let alerts = usage_alerts(plan, &counters);
    tracing::debug!(organization_id, plan = plan.as_str(), alerts = alerts.len(), "Usage checked");

    for alert in alerts {
        notify(
            pool,
            PlatformEvent::new(alert.event_type)
                .with_organization(organization_id)
                .with_payload(json!({
                    "limit": alert.limit.as_str(),
                    "current": alert.current,
                    "max": alert.max,
                    "plan": plan.as_str(),
                })),
        )
        .await;
    }
    Ok(())
}

/// Quotas at their maximum raise `usage.limit_reached`; quotas past the
/// warning ratio raise `usage.threshold`. Unlimited quotas never alert.
pub fn usage_alerts(plan: Plan, counters: &UsageCounters) -> Vec<UsageAlert> {
    LIMITS
        .iter()
        .filter_map(|&limit| {
            let max = limit.max_for(plan)?;
            let current = match limit {
                LimitKind::MonthlyExecutions => counters.monthly_executions,
                LimitKind::ActiveWorkflows => counters.active_workflows,
                LimitKind::Credentials => counters.credentials,
                LimitKind::ExportTemplates => counters.export_templates,
            };
            let event_type = if current >= max {
                USAGE_LIMIT_REACHED
            } else if usage_ratio(current, Some(max))? >= WARNING_THRESHOLD {
                USAGE_THRESHOLD
            } else {
                return None;
            };
            Some(UsageAlert { event_type, limit, current, max })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_below_the_warning_line() {
        assert!(usage_alerts(Plan::Free, &UsageCounters::default()).is_empty());
    }

    #[test]
    fn threshold_then_limit() {
        // Free allows 5 active workflows and 3 credentials.
        let near = UsageCounters { active_workflows: 4, credentials: 1, ..Default::default() };
        let alerts = usage_alerts(Plan::Free, &near);
        assert_eq!(
            alerts,
            vec![UsageAlert {
                event_type: USAGE_THRESHOLD,
                limit: LimitKind::ActiveWorkflows,
                current: 4,
                max: 5,
            }]
        );

        let full = UsageCounters { active_workflows: 5, credentials: 3, ..Default::default() };
        let alerts = usage_alerts(Plan::Free, &full);
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.event_type == USAGE_LIMIT_REACHED));
    }

    #[test]
    fn business_plan_has_unlimited_workflows() {
        let counters = UsageCounters { active_workflows: 10_000, ..Default::default() };
        assert!(LimitKind::ActiveWorkflows.max_for(Plan::Business).is_none());
        assert!(usage_alerts(Plan::Business, &counters)
            .iter()
            .all(|a| a.limit != LimitKind::ActiveWorkflows));
    }
}
