mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, get};
use sqlx::PgPool;
use tower::ServiceExt;

#[sqlx::test(migrations = "../../db/migrations")]
async fn health_reports_database_and_sockets(pool: PgPool) {
    let response = get(common::build_test_app(pool), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["db_healthy"], true);
    assert_eq!(json["ws_connections"], 0);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn ready_is_empty_204(pool: PgPool) {
    let response = get(common::build_test_app(pool), "/health/ready").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn openapi_lists_versioned_paths(pool: PgPool) {
    let response = get(common::build_test_app(pool), "/api-docs/openapi.json").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["openapi"].as_str().unwrap().starts_with("3."));
    assert!(json["paths"]["/api/v1/workflows"].is_object());
    assert!(json["paths"]["/api/v1/billing/webhook"]["post"].is_object());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_path_is_404(pool: PgPool) {
    let response = get(common::build_test_app(pool), "/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn request_id_is_generated_or_echoed(pool: PgPool) {
    let app = common::build_test_app(pool);

    let generated = get(app.clone(), "/health").await;
    let id = generated.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok(), "not a uuid: {id}");

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "trace-abc")
        .body(Body::empty())
        .unwrap();
    let echoed = app.oneshot(request).await.unwrap();
    assert_eq!(echoed.headers()["x-request-id"], "trace-abc");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cors_preflight_allows_dashboard_origin(pool: PgPool) {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/workflows")
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .body(Body::empty())
        .unwrap();
    let response = common::build_test_app(pool).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "http://localhost:5173");
    let methods = headers["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("POST"), "got: {methods}");
}

/// CORS wraps the whole stack, so rejected requests still carry the
/// allow-origin header the browser needs to read the error.
#[sqlx::test(migrations = "../../db/migrations")]
async fn cors_headers_on_unauthorized_response(pool: PgPool) {
    let request = Request::builder()
        .uri("/api/v1/workflows")
        .header("Origin", "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let response = common::build_test_app(pool).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );
    assert!(response.headers().contains_key("x-request-id"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn metrics_count_requests(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = common::register_org(app.clone(), "Metrics", "metrics@acme.test").await;

    get(app.clone(), "/health").await;
    let response = common::get_auth(app, "/api/v1/metrics", &org.access_token).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["data"]["total_requests"].as_u64().unwrap() >= 2);
}
