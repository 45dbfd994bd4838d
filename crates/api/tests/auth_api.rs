//! HTTP-level integration tests for registration, login, token refresh
//! and organization user management.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, get_auth, post_json, post_json_auth, register_org, PASSWORD};
use serde_json::json;
use sqlx::PgPool;

/// Registration creates the organization, a default tenant, an owner and
/// a trialing free subscription.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_register_creates_owner_and_subscription(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let org = register_org(app.clone(), "Acme Corp", "owner@acme.test").await;

    let me = body_json(get_auth(app.clone(), "/api/v1/auth/me", &org.access_token).await).await;
    assert_eq!(me["data"]["email"], "owner@acme.test");
    assert_eq!(me["data"]["role"], "owner");

    let sub = body_json(
        get_auth(app, "/api/v1/billing/subscription", &org.access_token).await,
    )
    .await;
    assert_eq!(sub["data"]["plan"], "free");
    assert_eq!(sub["data"]["status"], "trialing");
}

/// The same email cannot register twice.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_register_duplicate_email_conflicts(pool: PgPool) {
    let app = common::build_test_app(pool);
    register_org(app.clone(), "First", "dup@acme.test").await;

    let response = post_json(
        app,
        "/api/v1/auth/register",
        json!({
            "organization_name": "Second",
            "email": "dup@acme.test",
            "display_name": "Other",
            "password": PASSWORD,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

/// Weak passwords are rejected before anything is written.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_register_rejects_weak_password(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/auth/register",
        json!({
            "organization_name": "Weak",
            "email": "weak@acme.test",
            "display_name": "Weak",
            "password": "short",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_login_success_and_wrong_password(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = register_org(app.clone(), "Login Co", "login@acme.test").await;

    let ok = post_json(
        app.clone(),
        "/api/v1/auth/login",
        json!({ "email": "Login@Acme.test", "password": PASSWORD }),
    )
    .await;
    assert_eq!(ok.status(), StatusCode::OK);
    let json = body_json(ok).await;
    assert!(json["access_token"].is_string());
    assert_eq!(json["user"]["id"], org.user_id);

    let bad = post_json(
        app,
        "/api/v1/auth/login",
        json!({ "email": "login@acme.test", "password": "not-the-password-1" }),
    )
    .await;
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
}

/// Refresh tokens rotate: the presented token cannot be used twice.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_refresh_rotates_tokens(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = register_org(app.clone(), "Rotate", "rotate@acme.test").await;

    let first = post_json(
        app.clone(),
        "/api/v1/auth/refresh",
        json!({ "refresh_token": org.refresh_token }),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    let json = body_json(first).await;
    assert_ne!(json["refresh_token"], org.refresh_token.as_str());

    let replay = post_json(
        app,
        "/api/v1/auth/refresh",
        json!({ "refresh_token": org.refresh_token }),
    )
    .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_protected_route_requires_token(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = get(app.clone(), "/api/v1/workflows").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get_auth(app, "/api/v1/workflows", "not-a-jwt").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Viewers can read but not write; only admins manage users.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_role_enforcement(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = register_org(app.clone(), "Roles", "admin@roles.test").await;

    let created = post_json_auth(
        app.clone(),
        "/api/v1/users",
        &org.access_token,
        json!({
            "email": "viewer@roles.test",
            "display_name": "Viewer",
            "password": PASSWORD,
            "role": "viewer",
        }),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let login = body_json(
        post_json(
            app.clone(),
            "/api/v1/auth/login",
            json!({ "email": "viewer@roles.test", "password": PASSWORD }),
        )
        .await,
    )
    .await;
    let viewer_token = login["access_token"].as_str().unwrap().to_string();

    let list = get_auth(app.clone(), "/api/v1/workflows", &viewer_token).await;
    assert_eq!(list.status(), StatusCode::OK);

    let write = post_json_auth(
        app.clone(),
        "/api/v1/workflows",
        &viewer_token,
        json!({ "name": "Nope", "definition": common::simple_definition() }),
    )
    .await;
    assert_eq!(write.status(), StatusCode::FORBIDDEN);

    let users = get_auth(app, "/api/v1/users", &viewer_token).await;
    assert_eq!(users.status(), StatusCode::FORBIDDEN);
}

/// The audit trail only shows the caller's organization.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_audit_trail_is_scoped(pool: PgPool) {
    use pumpflix_events::{EventPersistence, PlatformEvent};

    let app = common::build_test_app(pool.clone());
    let mine = register_org(app.clone(), "Audit", "audit@acme.test").await;
    let theirs = register_org(app.clone(), "Other", "other@acme.test").await;

    for (org, kind) in [(&mine, "workflow.created"), (&theirs, "workflow.deleted")] {
        let event = PlatformEvent::new(kind)
            .with_organization(org.organization_id)
            .with_actor(org.user_id);
        EventPersistence::persist(&pool, &event).await.unwrap();
    }

    let response = get_auth(app, "/api/v1/org/events?limit=500", &mine.access_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let events = body_json(response).await["data"].as_array().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_type"], "workflow.created");
    assert_eq!(events[0]["actor_user_id"], mine.user_id);
}
