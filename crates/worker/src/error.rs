use pumpflix_core::error::CoreError;
use pumpflix_core::types::DbId;

/// Why a job attempt failed.
///
/// A business-level failure (a node erroring, an export source missing) is
/// not a `JobError`: it is recorded on the execution or run and the job
/// completes. `JobError` covers attempts that did not get that far.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Unknown job type '{0}'")]
    UnknownType(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl JobError {
    /// Whether another attempt could succeed. Only database errors are
    /// treated as transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_database_errors_retry() {
        assert!(JobError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!JobError::InvalidPayload("missing run_id".into()).is_retryable());
        assert!(!JobError::NotFound { entity: "ExportRun", id: 3 }.is_retryable());
        assert!(!JobError::UnknownType("video.render".into()).is_retryable());
        assert!(!JobError::Core(CoreError::Validation("cycle".into())).is_retryable());
    }

    #[test]
    fn messages_name_the_entity() {
        let err = JobError::NotFound { entity: "ExecutionLog", id: 12 };
        assert_eq!(err.to_string(), "ExecutionLog with id 12 not found");
    }
}
