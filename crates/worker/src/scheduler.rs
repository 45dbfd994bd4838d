//! Periodic queue maintenance: due export schedules, stale job recovery
//! and usage checks.

use std::time::{Duration, Instant};

use chrono::Utc;
use pumpflix_core::export_template::next_run;
use pumpflix_core::jobs::{JOB_RUN_EXPORT, JOB_USAGE_CHECK};
use pumpflix_db::models::job::EnqueueJob;
use pumpflix_db::repositories::job_repo::STALE_EXHAUSTED_ERROR;
use pumpflix_db::repositories::{ExportRunRepo, ExportTemplateRepo, JobRepo, OrganizationRepo};
use pumpflix_db::DbPool;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::handlers;

/// Templates claimed per tick.
pub const DUE_EXPORT_BATCH: i64 = 50;

/// What one scheduler tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub exports_queued: usize,
    pub jobs_requeued: u64,
    pub jobs_abandoned: usize,
    pub usage_checks_queued: usize,
}

pub struct Scheduler {
    pool: DbPool,
    stale_after_secs: i64,
    usage_check_interval: Duration,
    last_usage_check: Option<Instant>,
}

impl Scheduler {
    pub fn new(pool: DbPool, stale_after_secs: i64, usage_check_interval: Duration) -> Self {
        Self {
            pool,
            stale_after_secs,
            usage_check_interval,
            last_usage_check: None,
        }
    }

    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        tracing::info!(interval_secs = interval.as_secs(), "Scheduler started");
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(summary) if summary == TickSummary::default() => {}
                        Ok(summary) => tracing::info!(
                            exports_queued = summary.exports_queued,
                            jobs_requeued = summary.jobs_requeued,
                            jobs_abandoned = summary.jobs_abandoned,
                            usage_checks_queued = summary.usage_checks_queued,
                            "Scheduler tick",
                        ),
                        Err(e) => tracing::error!(error = %e, "Scheduler tick failed"),
                    }
                }
            }
        }
    }

    /// One pass over every periodic duty. Usage checks are only queued once
    /// per `usage_check_interval`.
    pub async fn tick(&mut self) -> Result<TickSummary, sqlx::Error> {
        let exports_queued = enqueue_due_exports(&self.pool).await?;
        let jobs_requeued = JobRepo::requeue_stale(&self.pool, self.stale_after_secs).await?;
        let exhausted = JobRepo::fail_stale_exhausted(&self.pool, self.stale_after_secs).await?;
        for job in &exhausted {
            tracing::error!(job_id = job.id, job_type = %job.job_type, "Stale job out of attempts");
            handlers::abandon(&self.pool, job, STALE_EXHAUSTED_ERROR).await?;
        }

        let usage_due = match self.last_usage_check {
            None => true,
            Some(at) => at.elapsed() >= self.usage_check_interval,
        };
        let usage_checks_queued = if usage_due {
            let queued = enqueue_usage_checks(&self.pool).await?;
            self.last_usage_check = Some(Instant::now());
            queued
        } else {
            0
        };

        Ok(TickSummary {
            exports_queued,
            jobs_requeued,
            jobs_abandoned: exhausted.len(),
            usage_checks_queued,
        })
    }
}

/// Queue a run for every scheduled export template whose `next_run_at` has
/// passed, advancing each schedule. A cron expression that no longer parses
/// disables its schedule.
pub async fn enqueue_due_exports(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let now = Utc::now();
    let due = ExportTemplateRepo::claim_due(pool, DUE_EXPORT_BATCH, |cron, tz| {
        next_run(cron, tz, now).ok()
    })
    .await?;

    for template in &due {
        let run = ExportRunRepo::create_queued(pool, template.id, template.current_version, None)
            .await?;
        JobRepo::enqueue(
            pool,
            &EnqueueJob {
                job_type: JOB_RUN_EXPORT.to_string(),
                organization_id: Some(template.organization_id),
                payload: json!({ "run_id": run.id }),
                max_attempts: None,
                run_after: None,
            },
        )
        .await?;
        tracing::debug!(
            export_template_id = template.id,
            run_id = run.id,
            version = template.current_version,
            "Scheduled export queued",
        );
    }
    Ok(due.len())
}

/// Queue one `usage.check` job per organization.
pub async fn enqueue_usage_checks(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let organizations = OrganizationRepo::list_ids(pool).await?;
    for organization_id in &organizations {
        JobRepo::enqueue(
            pool,
            &EnqueueJob {
                job_type: JOB_USAGE_CHECK.to_string(),
                organization_id: Some(*organization_id),
                payload: json!({ "organization_id": organization_id }),
                max_attempts: None,
                run_after: None,
            },
        )
        .await?;
    }
    Ok(organizations.len())
}
