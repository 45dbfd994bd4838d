//! Job type and status names for the Postgres-backed job queue.
//!
//! Must match the `CHECK` constraint on `jobs.status` and the handlers
//! registered by the worker.

/// Execute a queued workflow run (payload: `execution_id`).
pub const JOB_EXECUTE_WORKFLOW: &str = "workflow.execute";

/// Produce an export from an export template (payload: `run_id`).
pub const JOB_RUN_EXPORT: &str = "export.run";

/// Check an organization's usage against plan thresholds (payload: `organization_id`).
pub const JOB_USAGE_CHECK: &str = "usage.check";

pub const JOB_STATUS_PENDING: &str = "pending";
pub const JOB_STATUS_RUNNING: &str = "running";
pub const JOB_STATUS_COMPLETED: &str = "completed";
pub const JOB_STATUS_FAILED: &str = "failed";

/// Default attempts before a job is left in `failed`.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Upper bound on the requeue delay.
pub const MAX_BACKOFF_SECS: i64 = 300;

/// Requeue delay after `attempts` failed attempts: `2^attempts` seconds,
/// capped at [`MAX_BACKOFF_SECS`].
pub fn backoff_secs(attempts: i32) -> i64 {
    let exp = attempts.clamp(0, 16) as u32;
    2_i64.pow(exp).min(MAX_BACKOFF_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_secs(0), 1);
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(3), 8);
        assert_eq!(backoff_secs(9), MAX_BACKOFF_SECS);
        assert_eq!(backoff_secs(100), MAX_BACKOFF_SECS);
    }
}
