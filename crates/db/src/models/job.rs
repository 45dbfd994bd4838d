//! Background job queue model.

use serde::Serialize;
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub job_type: String,
    pub organization_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_after: Timestamp,
    pub locked_at: Option<Timestamp>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Insert payload for a new job.
#[derive(Debug, Clone)]
pub struct EnqueueJob {
    pub job_type: String,
    pub organization_id: Option<DbId>,
    pub payload: serde_json::Value,
    /// Defaults to the queue-wide maximum.
    pub max_attempts: Option<i32>,
    /// Delay before the job becomes claimable. Defaults to now.
    pub run_after: Option<Timestamp>,
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Requeued; claimable again at the given time.
    Retrying { run_after: Timestamp },
    /// Out of attempts; the job is now `failed`.
    Exhausted,
}
