//! Billing plans, subscription statuses, and usage limits.
//!
//! Plans are a fixed catalogue compiled into the binary; the payment
//! provider only knows about the price ids configured per plan. Limits are
//! checked by the API before creating workflows, credentials, export
//! templates and before enqueueing executions.

use serde::Serialize;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Pro,
    Business,
}

/// Quotas attached to a plan. `None` means unlimited.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlanLimits {
    pub monthly_executions: Option<i64>,
    pub active_workflows: Option<i64>,
    pub credentials: Option<i64>,
    pub export_templates: Option<i64>,
}

/// Public description of a plan returned by `GET /billing/plans`.
#[derive(Debug, Clone, Serialize)]
pub struct PlanInfo {
    pub plan: Plan,
    pub name: &'static str,
    pub monthly_price_cents: i64,
    pub limits: PlanLimits,
}

pub const ALL_PLANS: &[Plan] = &[Plan::Free, Plan::Pro, Plan::Business];

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Business => "business",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "business" => Ok(Self::Business),
            other => Err(CoreError::Validation(format!("Unknown plan '{other}'"))),
        }
    }

    pub fn limits(&self) -> PlanLimits {
        match self {
            Self::Free => PlanLimits {
                monthly_executions: Some(100),
                active_workflows: Some(5),
                credentials: Some(3),
                export_templates: Some(2),
            },
            Self::Pro => PlanLimits {
                monthly_executions: Some(10_000),
                active_workflows: Some(100),
                credentials: Some(50),
                export_templates: Some(25),
            },
            Self::Business => PlanLimits {
                monthly_executions: None,
                active_workflows: None,
                credentials: None,
                export_templates: None,
            },
        }
    }

    pub fn monthly_price_cents(&self) -> i64 {
        match self {
            Self::Free => 0,
            Self::Pro => 2_900,
            Self::Business => 19_900,
        }
    }

    pub fn info(&self) -> PlanInfo {
        PlanInfo {
            plan: *self,
            name: match self {
                Self::Free => "Free",
                Self::Pro => "Pro",
                Self::Business => "Business",
            },
            monthly_price_cents: self.monthly_price_cents(),
            limits: self.limits(),
        }
    }

    /// Whether the plan requires a payment-provider subscription.
    pub fn is_paid(&self) -> bool {
        self.monthly_price_cents() > 0
    }
}

// ---------------------------------------------------------------------------
// Subscription status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw {
            "trialing" => Ok(Self::Trialing),
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            other => Err(CoreError::Validation(format!(
                "Unknown subscription status '{other}'"
            ))),
        }
    }

    /// Whether new workflow executions may be started. Only an unpaid
    /// invoice blocks them; a canceled subscription runs on the free tier.
    pub fn allows_execution(&self) -> bool {
        !matches!(self, Self::PastDue)
    }
}

/// The plan whose limits actually apply. A canceled subscription falls back
/// to the free tier.
pub fn effective_plan(plan: Plan, status: SubscriptionStatus) -> Plan {
    match status {
        SubscriptionStatus::Canceled => Plan::Free,
        _ => plan,
    }
}

// ---------------------------------------------------------------------------
// Limit checks
// ---------------------------------------------------------------------------

/// A quota that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    MonthlyExecutions,
    ActiveWorkflows,
    Credentials,
    ExportTemplates,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MonthlyExecutions => "monthly_executions",
            Self::ActiveWorkflows => "active_workflows",
            Self::Credentials => "credentials",
            Self::ExportTemplates => "export_templates",
        }
    }

    pub fn max_for(&self, plan: Plan) -> Option<i64> {
        let limits = plan.limits();
        match self {
            Self::MonthlyExecutions => limits.monthly_executions,
            Self::ActiveWorkflows => limits.active_workflows,
            Self::Credentials => limits.credentials,
            Self::ExportTemplates => limits.export_templates,
        }
    }
}

/// Usage fraction at which a "usage.threshold" warning is sent.
pub const WARNING_THRESHOLD: f64 = 0.8;

/// Check whether one more unit of `kind` fits into `plan` given `current`
/// usage.
pub fn check_limit(plan: Plan, kind: LimitKind, current: i64) -> Result<(), CoreError> {
    match kind.max_for(plan) {
        Some(max) if current >= max => Err(CoreError::PlanLimitExceeded {
            limit: kind.as_str(),
            current,
            max,
            plan: plan.as_str(),
        }),
        _ => Ok(()),
    }
}

/// Fraction of the quota in use, or `None` for unlimited quotas.
pub fn usage_ratio(current: i64, max: Option<i64>) -> Option<f64> {
    match max {
        Some(m) if m > 0 => Some(current as f64 / m as f64),
        Some(_) => Some(1.0),
        None => None,
    }
}

/// True exactly when this increment moved usage across the warning line.
pub fn crossed_warning(previous: i64, current: i64, max: Option<i64>) -> bool {
    match (usage_ratio(previous, max), usage_ratio(current, max)) {
        (Some(before), Some(after)) => before < WARNING_THRESHOLD && after >= WARNING_THRESHOLD,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn free_plan_blocks_at_execution_cap() {
        assert!(check_limit(Plan::Free, LimitKind::MonthlyExecutions, 99).is_ok());
        assert_matches!(
            check_limit(Plan::Free, LimitKind::MonthlyExecutions, 100),
            Err(CoreError::PlanLimitExceeded { limit: "monthly_executions", max: 100, plan: "free", .. })
        );
    }

    #[test]
    fn business_plan_is_unlimited() {
        assert!(check_limit(Plan::Business, LimitKind::MonthlyExecutions, i64::MAX - 1).is_ok());
        assert!(check_limit(Plan::Business, LimitKind::Credentials, 1_000_000).is_ok());
    }

    #[test]
    fn canceled_falls_back_to_free() {
        assert_eq!(effective_plan(Plan::Pro, SubscriptionStatus::Canceled), Plan::Free);
        assert_eq!(effective_plan(Plan::Pro, SubscriptionStatus::PastDue), Plan::Pro);
    }

    #[test]
    fn past_due_blocks_execution() {
        assert!(!SubscriptionStatus::PastDue.allows_execution());
        assert!(SubscriptionStatus::Trialing.allows_execution());
        assert!(SubscriptionStatus::Canceled.allows_execution());
    }

    #[test]
    fn parse_round_trips() {
        for plan in ALL_PLANS {
            assert_eq!(Plan::parse(plan.as_str()).unwrap(), *plan);
        }
        assert!(Plan::parse("platinum").is_err());
        assert_eq!(
            SubscriptionStatus::parse("past_due").unwrap(),
            SubscriptionStatus::PastDue
        );
    }

    #[test]
    fn warning_crossed_once() {
        assert!(crossed_warning(79, 80, Some(100)));
        assert!(!crossed_warning(80, 81, Some(100)));
        assert!(!crossed_warning(10, 11, Some(100)));
        assert!(!crossed_warning(10, 11, None));
    }
}
