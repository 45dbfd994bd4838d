//! Integration tests for workflow templates, instantiation and AI drafts.

mod common;

use axum::http::StatusCode;
use common::{body_json, get_auth, post_json_auth, register_org, simple_definition};
use serde_json::json;
use sqlx::PgPool;

/// Creating a template and fetching it returns the same fields.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_template_create_fetch_round_trip(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = register_org(app.clone(), "Tpl", "tpl@acme.test").await;

    let created = post_json_auth(
        app.clone(),
        "/api/v1/templates",
        &org.access_token,
        json!({
            "name": "  Lead to Slack ",
            "description": "Posts new leads",
            "category": "sales",
            "definition": simple_definition(),
        }),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body_json(created).await["data"].clone();
    let id = created["id"].as_i64().unwrap();

    let fetched = body_json(
        get_auth(app, &format!("/api/v1/templates/{id}"), &org.access_token).await,
    )
    .await["data"]
        .clone();

    assert_eq!(fetched, created);
    assert_eq!(fetched["name"], "Lead to Slack");
    assert_eq!(fetched["category"], "sales");
    assert_eq!(fetched["is_public"], false);
    assert_eq!(fetched["organization_id"], org.organization_id);
    assert_eq!(fetched["definition"], simple_definition());
}

/// Instantiation merges per-node overrides and records the instance.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_instantiate_applies_overrides(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = register_org(app.clone(), "Inst", "inst@acme.test").await;

    let template = body_json(
        post_json_auth(
            app.clone(),
            "/api/v1/templates",
            &org.access_token,
            json!({ "name": "Webhook relay", "definition": simple_definition() }),
        )
        .await,
    )
    .await;
    let template_id = template["data"]["id"].as_i64().unwrap();

    let response = post_json_auth(
        app.clone(),
        &format!("/api/v1/templates/{template_id}/instantiate"),
        &org.access_token,
        json!({
            "name": "Relay for EU",
            "config": { "call": { "url": "https://eu.example.com/hook" } }
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["workflow"]["name"], "Relay for EU");
    assert_eq!(json["data"]["workflow"]["status"], "draft");
    assert_eq!(
        json["data"]["workflow"]["definition"]["nodes"][1]["config"]["url"],
        "https://eu.example.com/hook"
    );
    assert_eq!(
        json["data"]["workflow"]["definition"]["nodes"][1]["config"]["method"],
        "POST"
    );
    assert_eq!(json["data"]["instance"]["template_id"], template_id);

    let instances = body_json(
        get_auth(
            app,
            &format!("/api/v1/templates/{template_id}/instances"),
            &org.access_token,
        )
        .await,
    )
    .await;
    assert_eq!(instances["data"].as_array().unwrap().len(), 1);
}

/// Overrides for a node the template does not have are rejected.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_instantiate_unknown_node_rejected(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = register_org(app.clone(), "Unknown", "unknown@acme.test").await;

    let template = body_json(
        post_json_auth(
            app.clone(),
            "/api/v1/templates",
            &org.access_token,
            json!({ "name": "Base", "definition": simple_definition() }),
        )
        .await,
    )
    .await;
    let template_id = template["data"]["id"].as_i64().unwrap();

    let response = post_json_auth(
        app,
        &format!("/api/v1/templates/{template_id}/instantiate"),
        &org.access_token,
        json!({ "config": { "missing": { "x": 1 } } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Promoting an AI draft creates a template once.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_promote_ai_template_once(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = register_org(app.clone(), "Ai", "ai@acme.test").await;

    let draft = post_json_auth(
        app.clone(),
        "/api/v1/ai-templates",
        &org.access_token,
        json!({
            "title": "Daily digest",
            "prompt": "Send me a digest of new leads every morning",
            "model": "gpt-test",
            "generated_definition": simple_definition(),
        }),
    )
    .await;
    assert_eq!(draft.status(), StatusCode::CREATED);
    let draft_id = body_json(draft).await["data"]["id"].as_i64().unwrap();

    let promoted = post_json_auth(
        app.clone(),
        &format!("/api/v1/ai-templates/{draft_id}/promote"),
        &org.access_token,
        json!({ "category": "reports" }),
    )
    .await;
    assert_eq!(promoted.status(), StatusCode::CREATED);
    let template = body_json(promoted).await;
    assert_eq!(template["data"]["name"], "Daily digest");
    assert_eq!(template["data"]["category"], "reports");

    let again = post_json_auth(
        app,
        &format!("/api/v1/ai-templates/{draft_id}/promote"),
        &org.access_token,
        json!({}),
    )
    .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
}
