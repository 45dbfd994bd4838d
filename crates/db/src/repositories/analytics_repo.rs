//! Read-only aggregate queries for the analytics endpoints and plan
//! limit checks.

use sqlx::PgPool;
use pumpflix_core::types::DbId;
use pumpflix_core::workflow::{EXECUTION_FAILED, EXECUTION_SUCCEEDED};

use crate::models::analytics::{DailyExecutions, TopWorkflow, UsageAnalytics, UsageCounters};
use crate::repositories::{CredentialRepo, ExecutionLogRepo, ExportTemplateRepo, WorkflowRepo};

/// Number of workflows returned in `top_workflows`.
const TOP_WORKFLOWS: i64 = 5;

pub struct AnalyticsRepo;

impl AnalyticsRepo {
    /// Execution statistics over the trailing `days` days.
    pub async fn usage(
        pool: &PgPool,
        organization_id: DbId,
        days: i64,
    ) -> Result<UsageAnalytics, sqlx::Error> {
        let daily = sqlx::query_as::<_, DailyExecutions>(
            "SELECT (queued_at AT TIME ZONE 'UTC')::DATE AS day, \
                    COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE status = $3) AS succeeded, \
                    COUNT(*) FILTER (WHERE status = $4) AS failed \
             FROM execution_logs \
             WHERE organization_id = $1 AND queued_at >= NOW() - make_interval(days => $2::INT) \
             GROUP BY day \
             ORDER BY day ASC",
        )
        .bind(organization_id)
        .bind(days)
        .bind(EXECUTION_SUCCEEDED)
        .bind(EXECUTION_FAILED)
        .fetch_all(pool)
        .await?;

        let top_workflows = sqlx::query_as::<_, TopWorkflow>(
            "SELECT e.workflow_id, w.name, COUNT(*) AS executions \
             FROM execution_logs e \
             JOIN workflows w ON w.id = e.workflow_id \
             WHERE e.organization_id = $1 AND e.queued_at >= NOW() - make_interval(days => $2::INT) \
             GROUP BY e.workflow_id, w.name \
             ORDER BY executions DESC, e.workflow_id ASC \
             LIMIT $3",
        )
        .bind(organization_id)
        .bind(days)
        .bind(TOP_WORKFLOWS)
        .fetch_all(pool)
        .await?;

        let total_executions = daily.iter().map(|d| d.total).sum();
        let succeeded = daily.iter().map(|d| d.succeeded).sum();
        let failed = daily.iter().map(|d| d.failed).sum();

        Ok(UsageAnalytics {
            days,
            total_executions,
            succeeded,
            failed,
            daily,
            top_workflows,
        })
    }

    /// Current counters for every plan-limited resource.
    pub async fn counters(pool: &PgPool, organization_id: DbId) -> Result<UsageCounters, sqlx::Error> {
        Ok(UsageCounters {
            monthly_executions: ExecutionLogRepo::count_this_month(pool, organization_id).await?,
            active_workflows: WorkflowRepo::count_active(pool, organization_id).await?,
            credentials: CredentialRepo::count(pool, organization_id).await?,
            export_templates: ExportTemplateRepo::count_active(pool, organization_id).await?,
        })
    }
}
