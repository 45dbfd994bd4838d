//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server or
//! database is involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use pumpflix_api::error::AppError;
use pumpflix_api::payments::PaymentError;
use pumpflix_core::error::CoreError;

/// Convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: CoreError::NotFound maps to 404 with NOT_FOUND code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::not_found("Workflow", 42);

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "NOT_FOUND");
    assert_eq!(json["message"], "Workflow with id 42 not found");
}

// ---------------------------------------------------------------------------
// Test: validation and bad-request errors are both 400 with distinct codes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_and_bad_request_return_400() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Validation("cycle".into()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "VALIDATION_ERROR");
    assert_eq!(json["message"], "cycle");

    let (status, json) = error_to_response(AppError::BadRequest("bad json".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// Test: CoreError::Conflict maps to 409 with CONFLICT code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn conflict_error_returns_409() {
    let err = AppError::Core(CoreError::Conflict("Workflow is archived".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "CONFLICT");
    assert_eq!(json["message"], "Workflow is archived");
}

// ---------------------------------------------------------------------------
// Test: auth errors map to 401 and 403
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auth_errors_map_to_401_and_403() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Unauthorized("expired".into()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "UNAUTHORIZED");

    let (status, json) =
        error_to_response(AppError::Core(CoreError::Forbidden("viewer".into()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "FORBIDDEN");
    assert!(json.get("action").is_none());
}

// ---------------------------------------------------------------------------
// Test: plan limits are 403 with an upgrade action
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plan_limit_returns_403_with_upgrade_action() {
    let err = AppError::Core(CoreError::PlanLimitExceeded {
        limit: "active_workflows",
        current: 5,
        max: 5,
        plan: "free",
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "PLAN_LIMIT_EXCEEDED");
    assert_eq!(json["action"], "upgrade");
    assert_eq!(
        json["message"],
        "The free plan allows 5 active workflows; currently at 5"
    );
}

// ---------------------------------------------------------------------------
// Test: payment provider failures are 502 without provider details
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provider_error_returns_502() {
    let err: AppError = PaymentError::Api {
        status: 402,
        message: "card_declined: sk_live_secret".into(),
    }
    .into();

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "PAYMENT_PROVIDER_ERROR");
    assert!(!json["message"].as_str().unwrap().contains("sk_live"));
}

// ---------------------------------------------------------------------------
// Test: internal errors are 500 with a sanitized message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let err = AppError::Core(CoreError::Internal("connection string leaked".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "INTERNAL_ERROR");
    assert_eq!(json["message"], "An internal error occurred");
}
