use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pumpflix_core::error::CoreError;
use pumpflix_core::types::DbId;
use serde::Serialize;

/// Errors a handler can return.
///
/// Rendered as `{ "error": CODE, "message": text }`; plan-limit failures
/// add `"action": "upgrade"`. Server-side failures are logged and reach the
/// client only as a generic message.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The payment provider rejected or failed a call.
    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        AppError::Core(CoreError::NotFound { entity, id })
    }
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(skip)]
    status: StatusCode,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'static str>,
}

impl ErrorBody {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self { status, error, message: message.into(), action: None }
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match &self {
            AppError::Core(core) => core_body(core),
            AppError::Database(err) => database_body(err),
            AppError::BadRequest(msg) => ErrorBody::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::Provider(msg) => {
                tracing::warn!(error = %msg, "Payment provider call failed");
                ErrorBody::new(
                    StatusCode::BAD_GATEWAY,
                    "PAYMENT_PROVIDER_ERROR",
                    "The payment provider could not complete the request",
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ErrorBody::internal()
            }
        };
        (body.status, axum::Json(body)).into_response()
    }
}

fn core_body(err: &CoreError) -> ErrorBody {
    match err {
        CoreError::NotFound { entity, id } => ErrorBody::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => {
            ErrorBody::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg)
        }
        CoreError::Conflict(msg) => ErrorBody::new(StatusCode::CONFLICT, "CONFLICT", msg),
        CoreError::Unauthorized(msg) => {
            ErrorBody::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
        }
        CoreError::Forbidden(msg) => ErrorBody::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg),
        CoreError::PlanLimitExceeded { limit, current, max, plan } => ErrorBody {
            action: Some("upgrade"),
            ..ErrorBody::new(
                StatusCode::FORBIDDEN,
                "PLAN_LIMIT_EXCEEDED",
                format!(
                    "The {plan} plan allows {max} {}; currently at {current}",
                    limit.replace('_', " ")
                ),
            )
        },
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            ErrorBody::internal()
        }
    }
}

/// Missing rows are 404 and violations of `uq_*` constraints are 409.
/// Anything else is logged and hidden.
fn database_body(err: &sqlx::Error) -> ErrorBody {
    if let sqlx::Error::RowNotFound = err {
        return ErrorBody::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found");
    }
    if let sqlx::Error::Database(db_err) = err {
        let unique_violation = db_err.code().as_deref() == Some("23505");
        let constraint = db_err.constraint().filter(|c| c.starts_with("uq_"));
        if let (true, Some(constraint)) = (unique_violation, constraint) {
            return ErrorBody::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                format!("Duplicate value violates unique constraint: {constraint}"),
            );
        }
    }
    tracing::error!(error = %err, "Database error");
    ErrorBody::internal()
}
