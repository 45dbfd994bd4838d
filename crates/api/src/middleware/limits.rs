//! Subscription plan checks applied before creating metered resources.

use pumpflix_core::error::CoreError;
use pumpflix_core::plans::{check_limit, effective_plan, LimitKind, Plan, SubscriptionStatus};
use pumpflix_core::types::DbId;
use pumpflix_db::models::subscription::Subscription;
use pumpflix_db::repositories::{
    CredentialRepo, ExecutionLogRepo, ExportTemplateRepo, SubscriptionRepo, WorkflowRepo,
};
use pumpflix_db::DbPool;

use crate::error::{AppError, AppResult};

/// The organization's subscription resolved into typed plan data.
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub subscription: Subscription,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    /// The plan whose limits apply right now.
    pub effective: Plan,
}

pub async fn load_plan(pool: &DbPool, organization_id: DbId) -> AppResult<PlanContext> {
    let subscription = SubscriptionRepo::find_by_organization(pool, organization_id)
        .await?
        .ok_or_else(|| {
            AppError::InternalError(format!(
                "Organization {organization_id} has no subscription row"
            ))
        })?;
    let plan = Plan::parse(&subscription.plan)?;
    let status = SubscriptionStatus::parse(&subscription.status)?;
    Ok(PlanContext {
        effective: effective_plan(plan, status),
        subscription,
        plan,
        status,
    })
}

/// Current usage of a metered resource.
pub async fn current_usage(pool: &DbPool, organization_id: DbId, kind: LimitKind) -> AppResult<i64> {
    let count = match kind {
        LimitKind::MonthlyExecutions => ExecutionLogRepo::count_this_month(pool, organization_id).await?,
        LimitKind::ActiveWorkflows => WorkflowRepo::count_active(pool, organization_id).await?,
        LimitKind::Credentials => CredentialRepo::count(pool, organization_id).await?,
        LimitKind::ExportTemplates => ExportTemplateRepo::count_active(pool, organization_id).await?,
    };
    Ok(count)
}

/// Fail with `PlanLimitExceeded` if one more unit of `kind` would not fit.
///
/// Returns the resolved plan and the usage before the new unit.
pub async fn enforce_limit(
    pool: &DbPool,
    organization_id: DbId,
    kind: LimitKind,
) -> AppResult<(PlanContext, i64)> {
    let ctx = load_plan(pool, organization_id).await?;
    if kind == LimitKind::MonthlyExecutions && !ctx.status.allows_execution() {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Executions are paused while the subscription is {}",
            ctx.status.as_str()
        ))));
    }
    let current = current_usage(pool, organization_id, kind).await?;
    check_limit(ctx.effective, kind, current)?;
    Ok((ctx, current))
}
