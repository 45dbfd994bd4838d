//! Integration tests for export templates: versioning, comparison, runs.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, get_auth, post_json_auth, put_json_auth, register_org};
use pumpflix_core::jobs::JOB_RUN_EXPORT;
use pumpflix_db::repositories::JobRepo;
use serde_json::{json, Value};
use sqlx::PgPool;

fn schema_v1() -> Value {
    json!({
        "fields": [
            { "name": "workflow", "type": "string" },
            { "name": "runs", "type": "integer" }
        ],
        "delimiter": ","
    })
}

fn schema_v2() -> Value {
    json!({
        "fields": [
            { "name": "workflow", "type": "string", "label": "Workflow" },
            { "name": "failures", "type": "integer" }
        ],
        "delimiter": ","
    })
}

async fn create_export(app: axum::Router, token: &str, name: &str) -> i64 {
    let response = post_json_auth(
        app,
        "/api/v1/export-templates",
        token,
        json!({ "name": name, "format": "csv", "schema": schema_v1() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}

/// A schema change bumps the version and the comparison lists each change.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_schema_change_creates_version_and_diff(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = register_org(app.clone(), "Export", "export@acme.test").await;
    let id = create_export(app.clone(), &org.access_token, "Weekly runs").await;

    let response = put_json_auth(
        app.clone(),
        &format!("/api/v1/export-templates/{id}"),
        &org.access_token,
        json!({ "schema": schema_v2(), "change_note": "Track failures" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["data"]["current_version"], 2);
    assert_eq!(updated["data"]["schema"], schema_v2());

    let versions = body_json(
        get_auth(
            app.clone(),
            &format!("/api/v1/export-templates/{id}/versions"),
            &org.access_token,
        )
        .await,
    )
    .await;
    let versions = versions["data"].as_array().unwrap();
    assert_eq!(versions.len(), 2);

    let v1 = body_json(
        get_auth(
            app.clone(),
            &format!("/api/v1/export-templates/{id}/versions/1"),
            &org.access_token,
        )
        .await,
    )
    .await;
    assert_eq!(v1["data"]["schema"], schema_v1());

    let compare = body_json(
        get_auth(
            app,
            &format!("/api/v1/export-templates/{id}/compare?from=1&to=2"),
            &org.access_token,
        )
        .await,
    )
    .await;
    let data = &compare["data"];
    assert_eq!(data["identical"], false);
    assert_eq!(data["diff"]["added"][0]["path"], "fields.failures");
    assert_eq!(data["diff"]["removed"][0]["path"], "fields.runs");
    assert_eq!(data["diff"]["modified"][0]["path"], "fields.workflow");
    assert_eq!(data["diff"]["modified"].as_array().unwrap().len(), 1);
}

/// Updating only metadata leaves the version alone.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_metadata_update_keeps_version(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = register_org(app.clone(), "Meta", "meta@acme.test").await;
    let id = create_export(app.clone(), &org.access_token, "Monthly").await;

    let response = put_json_auth(
        app,
        &format!("/api/v1/export-templates/{id}"),
        &org.access_token,
        json!({ "description": "Sent to finance", "schema": schema_v1() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["current_version"], 1);
    assert_eq!(json["data"]["description"], "Sent to finance");
}

/// A missing version is a 404.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_compare_unknown_version_404(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = register_org(app.clone(), "Missing", "missing@acme.test").await;
    let id = create_export(app.clone(), &org.access_token, "Daily").await;

    let response = get_auth(
        app,
        &format!("/api/v1/export-templates/{id}/compare?from=1&to=9"),
        &org.access_token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Running an export queues a run and a job; archived templates refuse.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_run_export_queues_job(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let org = register_org(app.clone(), "Run", "run@acme.test").await;
    let id = create_export(app.clone(), &org.access_token, "On demand").await;

    let response = post_json_auth(
        app.clone(),
        &format!("/api/v1/export-templates/{id}/run"),
        &org.access_token,
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let run = body_json(response).await;
    assert_eq!(run["data"]["status"], "queued");
    assert_eq!(run["data"]["version"], 1);

    let job = JobRepo::claim_next(&pool, "test-worker").await.unwrap().unwrap();
    assert_eq!(job.job_type, JOB_RUN_EXPORT);
    assert_eq!(job.payload["run_id"], run["data"]["id"]);

    let runs = body_json(
        get_auth(
            app.clone(),
            &format!("/api/v1/export-templates/{id}/runs"),
            &org.access_token,
        )
        .await,
    )
    .await;
    assert_eq!(runs["data"].as_array().unwrap().len(), 1);

    let archived = common::send(
        app.clone(),
        Method::POST,
        &format!("/api/v1/export-templates/{id}/archive"),
        Some(&org.access_token),
        None,
    )
    .await;
    assert_eq!(archived.status(), StatusCode::OK);

    let refused = post_json_auth(
        app,
        &format!("/api/v1/export-templates/{id}/run"),
        &org.access_token,
        json!({}),
    )
    .await;
    assert_eq!(refused.status(), StatusCode::CONFLICT);
}

/// The free plan allows two export templates.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_export_template_plan_limit(pool: PgPool) {
    let app = common::build_test_app(pool);
    let org = register_org(app.clone(), "Cap", "cap@acme.test").await;
    create_export(app.clone(), &org.access_token, "One").await;
    create_export(app.clone(), &org.access_token, "Two").await;

    let response = post_json_auth(
        app,
        "/api/v1/export-templates",
        &org.access_token,
        json!({ "name": "Three", "format": "csv", "schema": schema_v1() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["action"], "upgrade");
}
