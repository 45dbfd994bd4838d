#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

use pumpflix_api::auth::jwt::JwtConfig;
use pumpflix_api::config::{BillingConfig, ServerConfig};
use pumpflix_api::middleware::metrics::RequestMetrics;
use pumpflix_api::payments::NoopPaymentProvider;
use pumpflix_api::router::build_app_router;
use pumpflix_api::state::AppState;
use pumpflix_api::ws::WsManager;
use pumpflix_core::crypto::CredentialCipher;
use pumpflix_events::EventBus;

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const PASSWORD: &str = "correct-horse-42";

/// Build a test `ServerConfig` with safe defaults and no live payment
/// provider.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: "test-secret-with-enough-entropy-0123456789".to_string(),
            access_token_expiry_mins: 15,
            refresh_token_expiry_days: 7,
        },
        credentials_key: String::new(),
        billing: BillingConfig {
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            api_base: "http://127.0.0.1:9".to_string(),
            price_pro: Some("price_pro_test".to_string()),
            price_business: Some("price_business_test".to_string()),
            success_url: "http://localhost:5173/billing/success".to_string(),
            cancel_url: "http://localhost:5173/billing".to_string(),
            ..Default::default()
        },
    }
}

pub fn test_state(pool: PgPool) -> AppState {
    AppState {
        pool,
        config: Arc::new(test_config()),
        ws_manager: Arc::new(WsManager::new()),
        event_bus: Arc::new(EventBus::default()),
        cipher: Arc::new(CredentialCipher::new(&[7u8; 32]).unwrap()),
        payments: Arc::new(NoopPaymentProvider),
        metrics: Arc::new(RequestMetrics::new()),
    }
}

/// Build the full application router with the production middleware stack.
pub fn build_test_app(pool: PgPool) -> Router {
    build_app_router(test_state(pool), &test_config())
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, None, Some(body)).await
}

pub async fn post_json_auth(app: Router, uri: &str, token: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn put_json_auth(app: Router, uri: &str, token: &str, body: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A registered organization with its owner signed in.
pub struct TestOrg {
    pub organization_id: i64,
    pub tenant_id: i64,
    pub user_id: i64,
    pub access_token: String,
    pub refresh_token: String,
}

/// Register a new organization through the API.
pub async fn register_org(app: Router, name: &str, email: &str) -> TestOrg {
    let response = post_json(
        app,
        "/api/v1/auth/register",
        json!({
            "organization_name": name,
            "email": email,
            "display_name": "Owner",
            "password": PASSWORD,
        }),
    )
    .await;
    assert_eq!(response.status(), 201, "registration should succeed");
    let json = body_json(response).await;
    TestOrg {
        organization_id: json["user"]["organization_id"].as_i64().unwrap(),
        tenant_id: json["user"]["tenant_id"].as_i64().unwrap(),
        user_id: json["user"]["id"].as_i64().unwrap(),
        access_token: json["access_token"].as_str().unwrap().to_string(),
        refresh_token: json["refresh_token"].as_str().unwrap().to_string(),
    }
}

/// A valid two-node definition.
pub fn simple_definition() -> Value {
    json!({
        "nodes": [
            { "id": "start", "type": "trigger.manual" },
            { "id": "call", "type": "http.request",
              "config": { "url": "https://example.com/hook", "method": "POST" } }
        ],
        "edges": [ { "from": "start", "to": "call" } ]
    })
}

/// Create a workflow through the API and return its id.
pub async fn create_workflow(app: Router, token: &str, name: &str) -> i64 {
    let response = post_json_auth(
        app,
        "/api/v1/workflows",
        token,
        json!({ "name": name, "definition": simple_definition() }),
    )
    .await;
    assert_eq!(response.status(), 201);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}
