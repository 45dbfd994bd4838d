//! Repository for the `jobs` table, the Postgres-backed work queue.

use chrono::Utc;
use sqlx::PgPool;
use pumpflix_core::jobs::{
    backoff_secs, DEFAULT_MAX_ATTEMPTS, JOB_STATUS_COMPLETED, JOB_STATUS_FAILED,
    JOB_STATUS_PENDING, JOB_STATUS_RUNNING,
};
use pumpflix_core::types::DbId;

use crate::models::job::{EnqueueJob, FailOutcome, Job};

/// Column list for `jobs` queries.
const COLUMNS: &str = "id, job_type, organization_id, payload, status, attempts, max_attempts, \
                        run_after, locked_at, locked_by, last_error, created_at, updated_at, \
                        completed_at";

/// `last_error` of a job whose worker vanished during its final attempt.
pub const STALE_EXHAUSTED_ERROR: &str = "Worker stopped responding on the final attempt";

/// Provides queue operations for background jobs.
pub struct JobRepo;

impl JobRepo {
    /// Enqueue a new pending job.
    pub async fn enqueue(pool: &PgPool, input: &EnqueueJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (job_type, organization_id, payload, max_attempts, run_after) \
             VALUES ($1, $2, $3, $4, COALESCE($5, NOW())) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.job_type)
            .bind(input.organization_id)
            .bind(&input.payload)
            .bind(input.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS))
            .bind(input.run_after)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the next due pending job for a worker.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
    /// claim the same job. Claiming counts as an attempt.
    pub async fn claim_next(pool: &PgPool, worker_id: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $2, locked_at = NOW(), locked_by = $1, attempts = attempts + 1 \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = $3 AND run_after <= NOW() \
                 ORDER BY run_after ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(worker_id)
            .bind(JOB_STATUS_RUNNING)
            .bind(JOB_STATUS_PENDING)
            .fetch_optional(pool)
            .await
    }

    /// Mark a running job as completed.
    pub async fn complete(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET status = $2, completed_at = NOW(), locked_at = NULL, locked_by = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(JOB_STATUS_COMPLETED)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// While attempts remain the job goes back to `pending` with
    /// `run_after` pushed out by `2^attempts` seconds (capped). Once
    /// `max_attempts` is reached it is marked `failed`.
    pub async fn fail(pool: &PgPool, job: &Job, error: &str) -> Result<FailOutcome, sqlx::Error> {
        if job.attempts >= job.max_attempts {
            sqlx::query(
                "UPDATE jobs SET status = $2, last_error = $3, completed_at = NOW(), \
                 locked_at = NULL, locked_by = NULL WHERE id = $1",
            )
            .bind(job.id)
            .bind(JOB_STATUS_FAILED)
            .bind(error)
            .execute(pool)
            .await?;
            return Ok(FailOutcome::Exhausted);
        }

        let run_after = Utc::now() + chrono::Duration::seconds(backoff_secs(job.attempts));
        sqlx::query(
            "UPDATE jobs SET status = $2, last_error = $3, run_after = $4, \
             locked_at = NULL, locked_by = NULL WHERE id = $1",
        )
        .bind(job.id)
        .bind(JOB_STATUS_PENDING)
        .bind(error)
        .bind(run_after)
        .execute(pool)
        .await?;
        Ok(FailOutcome::Retrying { run_after })
    }

    /// Mark a job `failed` regardless of remaining attempts, for errors a
    /// retry cannot fix (bad payload, missing rows).
    pub async fn fail_permanently(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET status = $2, last_error = $3, completed_at = NOW(), \
             locked_at = NULL, locked_by = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(JOB_STATUS_FAILED)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Return jobs whose worker died mid-run to the queue. A job counts as
    /// stale when it has been locked for longer than `stale_after_secs`.
    /// Jobs with no attempts left are left for [`JobRepo::fail_stale_exhausted`].
    pub async fn requeue_stale(pool: &PgPool, stale_after_secs: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status = $1, locked_at = NULL, locked_by = NULL \
             WHERE status = $2 AND attempts < max_attempts \
               AND locked_at < NOW() - make_interval(secs => $3::DOUBLE PRECISION)",
        )
        .bind(JOB_STATUS_PENDING)
        .bind(JOB_STATUS_RUNNING)
        .bind(stale_after_secs as f64)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Fail stale jobs whose last attempt was the one that died, returning
    /// them so their executions and runs can be closed too.
    pub async fn fail_stale_exhausted(
        pool: &PgPool,
        stale_after_secs: i64,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET status = $1, last_error = $2, completed_at = NOW(), \
                 locked_at = NULL, locked_by = NULL \
             WHERE status = $3 AND attempts >= max_attempts \
               AND locked_at < NOW() - make_interval(secs => $4::DOUBLE PRECISION) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JOB_STATUS_FAILED)
            .bind(STALE_EXHAUSTED_ERROR)
            .bind(JOB_STATUS_RUNNING)
            .bind(stale_after_secs as f64)
            .fetch_all(pool)
            .await
    }

    /// Delete completed and failed jobs finished more than
    /// `retention_days` ago.
    pub async fn purge_finished(pool: &PgPool, retention_days: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ($1, $2) \
               AND completed_at < NOW() - make_interval(days => $3::INT)",
        )
        .bind(JOB_STATUS_COMPLETED)
        .bind(JOB_STATUS_FAILED)
        .bind(retention_days as i32)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Count jobs by status, for the metrics endpoint.
    pub async fn count_by_status(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")
            .fetch_all(pool)
            .await
    }
}
