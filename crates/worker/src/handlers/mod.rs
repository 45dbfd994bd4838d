//! Job handlers, one per job type.

pub mod execute;
pub mod export;
pub mod usage;

use pumpflix_core::jobs::{JOB_EXECUTE_WORKFLOW, JOB_RUN_EXPORT, JOB_USAGE_CHECK};
use pumpflix_core::types::DbId;
use pumpflix_db::models::job::Job;
use pumpflix_db::DbPool;
use pumpflix_events::{publish_notify, PlatformEvent};
use serde_json::Value;

use crate::error::JobError;

/// Route a claimed job to its handler.
pub async fn dispatch(pool: &DbPool, job: &Job) -> Result<(), JobError> {
    match job.job_type.as_str() {
        JOB_EXECUTE_WORKFLOW => {
            execute::execute_workflow(pool, payload_id(&job.payload, "execution_id")?).await
        }
        JOB_RUN_EXPORT => export::run_export(pool, payload_id(&job.payload, "run_id")?).await,
        JOB_USAGE_CHECK => {
            usage::check_usage(pool, payload_id(&job.payload, "organization_id")?).await
        }
        other => Err(JobError::UnknownType(other.to_string())),
    }
}

/// Close the execution or export run behind a job that will not be
/// attempted again, so it does not stay `running`.
pub async fn abandon(pool: &DbPool, job: &Job, reason: &str) -> Result<(), sqlx::Error> {
    match job.job_type.as_str() {
        JOB_EXECUTE_WORKFLOW => match payload_id(&job.payload, "execution_id") {
            Ok(id) => execute::abandon_execution(pool, id, reason).await,
            Err(_) => Ok(()),
        },
        JOB_RUN_EXPORT => match payload_id(&job.payload, "run_id") {
            Ok(id) => export::abandon_run(pool, id, reason).await,
            Err(_) => Ok(()),
        },
        _ => Ok(()),
    }
}

/// Read a numeric id from a job payload.
pub fn payload_id(payload: &Value, key: &str) -> Result<DbId, JobError> {
    payload
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| JobError::InvalidPayload(format!("missing numeric '{key}'")))
}

/// Publish a status event to the API process. A lost event must not fail
/// the job, so errors are only logged.
pub(crate) async fn notify(pool: &DbPool, event: PlatformEvent) {
    if let Err(e) = publish_notify(pool, &event).await {
        tracing::warn!(event_type = %event.event_type, error = %e, "Failed to publish event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn payload_id_requires_a_number() {
        assert_eq!(payload_id(&json!({ "run_id": 7 }), "run_id").unwrap(), 7);
        assert_matches!(
            payload_id(&json!({ "run_id": "7" }), "run_id"),
            Err(JobError::InvalidPayload(m)) if m.contains("run_id")
        );
        assert_matches!(payload_id(&json!({}), "execution_id"), Err(JobError::InvalidPayload(_)));
    }
}
