use std::time::Duration;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent job loops.
    pub concurrency: usize,
    /// Sleep between claim attempts when the queue is empty.
    pub poll_interval: Duration,
    /// How often due export schedules and stale jobs are checked.
    pub scheduler_interval: Duration,
    /// A running job locked for longer than this is returned to the queue.
    pub stale_after_secs: i64,
    /// How often a usage check is enqueued for every organization.
    pub usage_check_interval: Duration,
    /// Prefix of the `locked_by` value written on claimed jobs.
    pub worker_name: String,
    /// Time allowed for in-flight jobs to finish on shutdown.
    pub shutdown_timeout: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default            |
    /// |-------------------------------|--------------------|
    /// | `WORKER_CONCURRENCY`          | `4`                |
    /// | `WORKER_POLL_INTERVAL_MS`     | `1000`             |
    /// | `SCHEDULER_INTERVAL_SECS`     | `30`               |
    /// | `JOB_STALE_AFTER_SECS`        | `600`              |
    /// | `USAGE_CHECK_INTERVAL_SECS`   | `3600`             |
    /// | `WORKER_NAME`                 | `worker-<pid>`     |
    /// | `SHUTDOWN_TIMEOUT_SECS`       | `30`               |
    pub fn from_env() -> Self {
        let concurrency: usize = parse_var("WORKER_CONCURRENCY", "4");
        assert!(concurrency > 0, "WORKER_CONCURRENCY must be at least 1");

        Self {
            concurrency,
            poll_interval: Duration::from_millis(parse_var("WORKER_POLL_INTERVAL_MS", "1000")),
            scheduler_interval: Duration::from_secs(parse_var("SCHEDULER_INTERVAL_SECS", "30")),
            stale_after_secs: parse_var("JOB_STALE_AFTER_SECS", "600"),
            usage_check_interval: Duration::from_secs(parse_var(
                "USAGE_CHECK_INTERVAL_SECS",
                "3600",
            )),
            worker_name: std::env::var("WORKER_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| format!("worker-{}", std::process::id())),
            shutdown_timeout: Duration::from_secs(parse_var("SHUTDOWN_TIMEOUT_SECS", "30")),
        }
    }
}

fn parse_var<T>(name: &str, default: &str) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .unwrap_or_else(|e| panic!("{name} must be a valid number, got '{raw}': {e}"))
}
