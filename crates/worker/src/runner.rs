//! Job runner loop.
//!
//! Each runner claims one job at a time via [`JobRepo::claim_next`]
//! (`SELECT FOR UPDATE SKIP LOCKED`), so any number of runners across any
//! number of processes can share the queue.

use std::time::Duration;

use pumpflix_db::models::job::FailOutcome;
use pumpflix_db::repositories::JobRepo;
use pumpflix_db::DbPool;
use tokio_util::sync::CancellationToken;

use crate::handlers;

/// A single job loop.
pub struct JobRunner {
    pool: DbPool,
    worker_id: String,
    poll_interval: Duration,
}

impl JobRunner {
    pub fn new(pool: DbPool, worker_id: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            pool,
            worker_id: worker_id.into(),
            poll_interval,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until the cancellation token is triggered. A job already in
    /// progress is finished before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker_id = %self.worker_id,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Job runner started",
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let idle = match self.run_once().await {
                Ok(true) => false,
                Ok(false) => true,
                Err(e) => {
                    tracing::error!(worker_id = %self.worker_id, error = %e, "Job cycle failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        tracing::info!(worker_id = %self.worker_id, "Job runner shutting down");
    }

    /// Claim and process at most one job. Returns whether a job was claimed.
    pub async fn run_once(&self) -> Result<bool, sqlx::Error> {
        let Some(job) = JobRepo::claim_next(&self.pool, &self.worker_id).await? else {
            return Ok(false);
        };
        tracing::debug!(
            job_id = job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            worker_id = %self.worker_id,
            "Job claimed",
        );

        match handlers::dispatch(&self.pool, &job).await {
            Ok(()) => {
                JobRepo::complete(&self.pool, job.id).await?;
                tracing::info!(job_id = job.id, job_type = %job.job_type, "Job completed");
            }
            Err(e) if e.is_retryable() => {
                match JobRepo::fail(&self.pool, &job, &e.to_string()).await? {
                    FailOutcome::Retrying { run_after } => tracing::warn!(
                        job_id = job.id,
                        job_type = %job.job_type,
                        attempt = job.attempts,
                        %run_after,
                        error = %e,
                        "Job failed, will retry",
                    ),
                    FailOutcome::Exhausted => {
                        tracing::error!(
                            job_id = job.id,
                            job_type = %job.job_type,
                            attempts = job.attempts,
                            error = %e,
                            "Job failed, out of attempts",
                        );
                        handlers::abandon(&self.pool, &job, &e.to_string()).await?;
                    }
                }
            }
            Err(e) => {
                JobRepo::fail_permanently(&self.pool, job.id, &e.to_string()).await?;
                tracing::error!(
                    job_id = job.id,
                    job_type = %job.job_type,
                    error = %e,
                    "Job failed permanently",
                );
                handlers::abandon(&self.pool, &job, &e.to_string()).await?;
            }
        }
        Ok(true)
    }
}
