//! Periodic cleanup of expired refresh sessions, closed WebSocket
//! bookkeeping rows and finished background jobs.

use std::time::Duration;

use pumpflix_db::repositories::{JobRepo, SessionRepo, WsSessionRepo};
use pumpflix_db::DbPool;
use tokio_util::sync::CancellationToken;

/// Default retention for closed WebSocket sessions.
const DEFAULT_WS_RETENTION_DAYS: i64 = 7;

/// Default retention for completed and failed jobs.
const DEFAULT_JOB_RETENTION_DAYS: i64 = 14;

/// How often the cleanup job runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Run the cleanup loop until `cancel` is triggered.
pub async fn run(pool: DbPool, cancel: CancellationToken) {
    let ws_retention_days: i64 = std::env::var("WS_SESSION_RETENTION_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_WS_RETENTION_DAYS);
    let job_retention_days =
        crate::config::parsed_var("JOB_RETENTION_DAYS", DEFAULT_JOB_RETENTION_DAYS);

    tracing::info!(
        ws_retention_days,
        job_retention_days,
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Session cleanup job started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session cleanup job stopping");
                break;
            }
            _ = interval.tick() => {
                match SessionRepo::purge_dead(&pool).await {
                    Ok(0) => tracing::debug!("Session cleanup: no expired sessions"),
                    Ok(deleted) => tracing::info!(deleted, "Session cleanup: purged refresh sessions"),
                    Err(e) => tracing::error!(error = %e, "Session cleanup failed"),
                }
                match WsSessionRepo::purge_closed(&pool, ws_retention_days).await {
                    Ok(0) => {}
                    Ok(deleted) => tracing::info!(deleted, "Session cleanup: purged WebSocket sessions"),
                    Err(e) => tracing::error!(error = %e, "WebSocket session cleanup failed"),
                }
                match JobRepo::purge_finished(&pool, job_retention_days).await {
                    Ok(0) => {}
                    Ok(deleted) => tracing::info!(deleted, "Session cleanup: purged finished jobs"),
                    Err(e) => tracing::error!(error = %e, "Job cleanup failed"),
                }
            }
        }
    }
}
