//! Repository for the `execution_logs` table.

use sqlx::PgPool;
use pumpflix_core::types::DbId;
use pumpflix_core::workflow::{
    EXECUTION_CANCELLED, EXECUTION_FAILED, EXECUTION_QUEUED, EXECUTION_RUNNING,
    EXECUTION_SUCCEEDED,
};

use crate::models::execution::{ExecutionListQuery, ExecutionLog};

/// Column list for `execution_logs` queries.
const COLUMNS: &str = "id, organization_id, tenant_id, workflow_id, triggered_by, trigger, \
                        status, input, steps, error_message, queued_at, started_at, \
                        finished_at, duration_ms";

/// Provides persistence for workflow executions.
pub struct ExecutionLogRepo;

impl ExecutionLogRepo {
    /// Record a new queued execution.
    pub async fn create_queued(
        pool: &PgPool,
        organization_id: DbId,
        tenant_id: DbId,
        workflow_id: DbId,
        triggered_by: Option<DbId>,
        trigger: &str,
        input: &serde_json::Value,
    ) -> Result<ExecutionLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO execution_logs (organization_id, tenant_id, workflow_id, triggered_by, trigger, status, input)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExecutionLog>(&query)
            .bind(organization_id)
            .bind(tenant_id)
            .bind(workflow_id)
            .bind(triggered_by)
            .bind(trigger)
            .bind(EXECUTION_QUEUED)
            .bind(input)
            .fetch_one(pool)
            .await
    }

    /// Find an execution by id within an organization.
    pub async fn find_by_id(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<ExecutionLog>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM execution_logs WHERE id = $1 AND organization_id = $2");
        sqlx::query_as::<_, ExecutionLog>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Find an execution by id without organization scoping (worker use).
    pub async fn find_unscoped(pool: &PgPool, id: DbId) -> Result<Option<ExecutionLog>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM execution_logs WHERE id = $1");
        sqlx::query_as::<_, ExecutionLog>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List executions, newest first.
    pub async fn list(
        pool: &PgPool,
        organization_id: DbId,
        params: &ExecutionListQuery,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExecutionLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM execution_logs \
             WHERE organization_id = $1 \
               AND ($2::BIGINT IS NULL OR workflow_id = $2) \
               AND ($3::TEXT IS NULL OR status = $3) \
             ORDER BY queued_at DESC, id DESC \
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, ExecutionLog>(&query)
            .bind(organization_id)
            .bind(params.workflow_id)
            .bind(&params.status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Move an execution to `running`, starting its step log afresh. An
    /// execution already `running` belongs to an interrupted attempt and is
    /// restarted. Returns `false` once it is cancelled or finished.
    pub async fn mark_running(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE execution_logs SET status = $2, started_at = NOW(), \
                 steps = '[]'::jsonb, error_message = NULL \
             WHERE id = $1 AND status IN ($3, $2)",
        )
        .bind(id)
        .bind(EXECUTION_RUNNING)
        .bind(EXECUTION_QUEUED)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fail an unfinished execution whose job gave up. Returns `None` when
    /// it had already finished or been cancelled.
    pub async fn abandon(
        pool: &PgPool,
        id: DbId,
        error_message: &str,
    ) -> Result<Option<ExecutionLog>, sqlx::Error> {
        let query = format!(
            "UPDATE execution_logs SET
                status = $2,
                error_message = $3,
                finished_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - COALESCE(started_at, queued_at))) * 1000)::BIGINT
             WHERE id = $1 AND status IN ($4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExecutionLog>(&query)
            .bind(id)
            .bind(EXECUTION_FAILED)
            .bind(error_message)
            .bind(EXECUTION_QUEUED)
            .bind(EXECUTION_RUNNING)
            .fetch_optional(pool)
            .await
    }

    /// Finish a running execution with its step log.
    ///
    /// `error_message = None` marks success. Returns the updated row, or
    /// `None` if the execution was not running anymore.
    pub async fn finish(
        pool: &PgPool,
        id: DbId,
        steps: &serde_json::Value,
        error_message: Option<&str>,
    ) -> Result<Option<ExecutionLog>, sqlx::Error> {
        let status = if error_message.is_some() {
            EXECUTION_FAILED
        } else {
            EXECUTION_SUCCEEDED
        };
        let query = format!(
            "UPDATE execution_logs SET
                status = $2,
                steps = $3,
                error_message = $4,
                finished_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - COALESCE(started_at, queued_at))) * 1000)::BIGINT
             WHERE id = $1 AND status = $5
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExecutionLog>(&query)
            .bind(id)
            .bind(status)
            .bind(steps)
            .bind(error_message)
            .bind(EXECUTION_RUNNING)
            .fetch_optional(pool)
            .await
    }

    /// Cancel an execution that has not finished yet.
    pub async fn cancel(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<ExecutionLog>, sqlx::Error> {
        let query = format!(
            "UPDATE execution_logs SET status = $3, finished_at = NOW() \
             WHERE id = $1 AND organization_id = $2 AND status IN ($4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExecutionLog>(&query)
            .bind(id)
            .bind(organization_id)
            .bind(EXECUTION_CANCELLED)
            .bind(EXECUTION_QUEUED)
            .bind(EXECUTION_RUNNING)
            .fetch_optional(pool)
            .await
    }

    /// Executions queued since the start of the current calendar month (UTC).
    ///
    /// Reads the `execution_usage` counter, which a trigger bumps on every
    /// insert, so deleting workflows or their history does not lower it.
    pub async fn count_this_month(pool: &PgPool, organization_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(executions), 0)::bigint FROM execution_usage \
             WHERE organization_id = $1 \
               AND period_start = date_trunc('month', NOW() AT TIME ZONE 'UTC')::date",
        )
        .bind(organization_id)
        .fetch_one(pool)
        .await
    }
}
