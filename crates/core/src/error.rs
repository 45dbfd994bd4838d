use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The organization's plan does not allow another unit of `limit`.
    #[error("Plan limit exceeded: {limit} ({current}/{max}) on plan {plan}")]
    PlanLimitExceeded {
        limit: &'static str,
        current: i64,
        max: i64,
        plan: &'static str,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}
