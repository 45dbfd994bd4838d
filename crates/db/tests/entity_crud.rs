//! Integration tests for the repository layer against a real database.

use assert_matches::assert_matches;
use serde_json::json;
use sqlx::PgPool;
use pumpflix_db::models::export_template::{CreateExportTemplate, UpdateExportTemplate, ScheduleUpdate};
use pumpflix_db::models::organization::{RegisteredOrganization, Registration};
use pumpflix_db::models::session::CreateSession;
use pumpflix_db::models::workflow::{CreateWorkflow, UpdateWorkflow, WorkflowListQuery};
use pumpflix_db::models::workflow_template::CreateWorkflowTemplate;
use pumpflix_db::repositories::{
    ExecutionLogRepo, ExportTemplateRepo, OrganizationRepo, SessionRepo, SubscriptionRepo,
    UserRepo, WorkflowRepo, WorkflowTemplateRepo,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn register(pool: &PgPool, slug: &str) -> RegisteredOrganization {
    OrganizationRepo::register(
        pool,
        &Registration {
            organization_name: format!("Org {slug}"),
            organization_slug: slug.to_string(),
            email: format!("owner@{slug}.test"),
            display_name: "Owner".to_string(),
            password_hash: "not-a-real-hash".to_string(),
        },
    )
    .await
    .unwrap()
}

fn definition() -> serde_json::Value {
    json!({
        "nodes": [
            { "id": "start", "type": "trigger.manual" },
            { "id": "notify", "type": "slack.post_message", "config": { "channel": "#ops" } }
        ],
        "edges": [{ "from": "start", "to": "notify" }]
    })
}

fn new_workflow(name: &str) -> CreateWorkflow {
    CreateWorkflow {
        name: name.to_string(),
        description: None,
        definition: definition(),
        status: None,
    }
}

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505") && db.constraint() == Some(constraint)
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_register_creates_full_tenancy(pool: PgPool) {
    let reg = register(&pool, "acme").await;

    assert!(reg.tenant.is_default);
    let owner = UserRepo::find_by_id(&pool, reg.user_id).await.unwrap().unwrap();
    assert_eq!(owner.role, "owner");
    assert_eq!(owner.tenant_id, reg.tenant.id);

    let sub = SubscriptionRepo::find_by_organization(&pool, reg.organization.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.plan, "free");
    assert_eq!(sub.status, "trialing");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_register_duplicate_slug_rolls_back(pool: PgPool) {
    register(&pool, "acme").await;

    let err = OrganizationRepo::register(
        &pool,
        &Registration {
            organization_name: "Other".into(),
            organization_slug: "acme".into(),
            email: "someone@else.test".into(),
            display_name: "Someone".into(),
            password_hash: "x".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(is_unique_violation(&err, "uq_organizations_slug"));

    assert!(UserRepo::find_by_email(&pool, "someone@else.test")
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_workflow_crud_and_archive(pool: PgPool) {
    let reg = register(&pool, "acme").await;
    let org = reg.organization.id;

    let wf = WorkflowRepo::create(&pool, org, reg.tenant.id, reg.user_id, &new_workflow("Daily"))
        .await
        .unwrap();
    assert_eq!(wf.status, "draft");

    let updated = WorkflowRepo::update(
        &pool,
        org,
        wf.id,
        &UpdateWorkflow {
            status: Some("active".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(updated.status, "active");
    assert_eq!(updated.name, "Daily");
    assert_eq!(WorkflowRepo::count_active(&pool, org).await.unwrap(), 1);

    WorkflowRepo::archive(&pool, org, wf.id).await.unwrap().unwrap();
    assert_eq!(WorkflowRepo::count_active(&pool, org).await.unwrap(), 0);
    let listed = WorkflowRepo::list(&pool, org, &WorkflowListQuery::default(), 50, 0)
        .await
        .unwrap();
    assert!(listed.is_empty());
    // Archiving twice is a no-op.
    assert!(WorkflowRepo::archive(&pool, org, wf.id).await.unwrap().is_none());

    WorkflowRepo::unarchive(&pool, org, wf.id).await.unwrap().unwrap();
    assert!(WorkflowRepo::delete(&pool, org, wf.id).await.unwrap());
    assert!(WorkflowRepo::find_by_id(&pool, org, wf.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_workflow_name_unique_per_tenant(pool: PgPool) {
    let reg = register(&pool, "acme").await;
    let org = reg.organization.id;
    WorkflowRepo::create(&pool, org, reg.tenant.id, reg.user_id, &new_workflow("Same"))
        .await
        .unwrap();
    let err = WorkflowRepo::create(&pool, org, reg.tenant.id, reg.user_id, &new_workflow("Same"))
        .await
        .unwrap_err();
    assert!(is_unique_violation(&err, "uq_workflows_tenant_name"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_workflows_are_isolated_between_organizations(pool: PgPool) {
    let a = register(&pool, "alpha").await;
    let b = register(&pool, "beta").await;
    let wf = WorkflowRepo::create(
        &pool,
        a.organization.id,
        a.tenant.id,
        a.user_id,
        &new_workflow("Private"),
    )
    .await
    .unwrap();

    assert!(WorkflowRepo::find_by_id(&pool, b.organization.id, wf.id)
        .await
        .unwrap()
        .is_none());
    assert!(!WorkflowRepo::delete(&pool, b.organization.id, wf.id).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_template_create_then_fetch_returns_same_fields(pool: PgPool) {
    let reg = register(&pool, "acme").await;
    let created = WorkflowTemplateRepo::create(
        &pool,
        reg.organization.id,
        reg.user_id,
        &CreateWorkflowTemplate {
            name: "Lead alert".into(),
            description: Some("Ping sales".into()),
            category: Some("sales".into()),
            definition: definition(),
            is_public: None,
        },
    )
    .await
    .unwrap();

    let fetched = WorkflowTemplateRepo::find_visible(&pool, reg.organization.id, created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.name, created.name);
    assert_eq!(fetched.description, created.description);
    assert_eq!(fetched.category, created.category);
    assert_eq!(fetched.definition, created.definition);
    assert!(!fetched.is_public);

    // Private templates are invisible to other organizations.
    let other = register(&pool, "other").await;
    assert!(WorkflowTemplateRepo::find_visible(&pool, other.organization.id, created.id)
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_instantiate_creates_workflow_and_instance(pool: PgPool) {
    let reg = register(&pool, "acme").await;
    let template = WorkflowTemplateRepo::create(
        &pool,
        reg.organization.id,
        reg.user_id,
        &CreateWorkflowTemplate {
            name: "Base".into(),
            description: None,
            category: None,
            definition: definition(),
            is_public: Some(true),
        },
    )
    .await
    .unwrap();

    let (wf, instance) = WorkflowTemplateRepo::instantiate(
        &pool,
        template.id,
        reg.organization.id,
        reg.tenant.id,
        reg.user_id,
        "From template",
        None,
        &template.definition,
        &json!({}),
    )
    .await
    .unwrap();
    assert_eq!(instance.workflow_id, wf.id);
    assert_eq!(wf.definition, template.definition);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_export_schema_update_bumps_version(pool: PgPool) {
    let reg = register(&pool, "acme").await;
    let org = reg.organization.id;
    let v1 = json!({ "fields": [{ "name": "id", "type": "integer" }] });
    let v2 = json!({ "fields": [{ "name": "id", "type": "integer" }, { "name": "email", "type": "string" }] });

    let template = ExportTemplateRepo::create(
        &pool,
        org,
        reg.tenant.id,
        reg.user_id,
        &CreateExportTemplate {
            name: "Users".into(),
            description: None,
            format: "csv".into(),
            schema: v1.clone(),
            schedule_cron: None,
            schedule_timezone: None,
            schedule_enabled: None,
        },
        false,
        None,
    )
    .await
    .unwrap();
    assert_eq!(template.current_version, 1);
    assert_eq!(template.schedule_timezone, "UTC");

    let updated = ExportTemplateRepo::update_schema(&pool, org, template.id, &v2, Some("add email"), reg.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.current_version, 2);
    assert_eq!(updated.schema, v2);

    let versions = ExportTemplateRepo::list_versions(&pool, template.id).await.unwrap();
    assert_eq!(versions.iter().map(|v| v.version).collect::<Vec<_>>(), vec![2, 1]);
    let first = ExportTemplateRepo::find_version(&pool, template.id, 1).await.unwrap().unwrap();
    assert_eq!(first.schema, v1);

    // Metadata updates do not create versions.
    let renamed = ExportTemplateRepo::update_metadata(
        &pool,
        org,
        template.id,
        &UpdateExportTemplate {
            name: Some("All users".into()),
            ..Default::default()
        },
        &ScheduleUpdate::default(),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(renamed.current_version, 2);
    assert_eq!(renamed.name, "All users");

    // Schema updates on a foreign template are not found.
    let other = register(&pool, "other").await;
    assert_matches!(
        ExportTemplateRepo::update_schema(&pool, other.organization.id, template.id, &v1, None, other.user_id).await,
        Ok(None)
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_execution_lifecycle(pool: PgPool) {
    let reg = register(&pool, "acme").await;
    let org = reg.organization.id;
    let wf = WorkflowRepo::create(&pool, org, reg.tenant.id, reg.user_id, &new_workflow("Run me"))
        .await
        .unwrap();

    let exec = ExecutionLogRepo::create_queued(&pool, org, reg.tenant.id, wf.id, Some(reg.user_id), "manual", &json!({}))
        .await
        .unwrap();
    assert_eq!(exec.status, "queued");
    assert_eq!(ExecutionLogRepo::count_this_month(&pool, org).await.unwrap(), 1);

    assert!(ExecutionLogRepo::mark_running(&pool, exec.id).await.unwrap());
    let done = ExecutionLogRepo::finish(&pool, exec.id, &json!([]), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, "succeeded");
    assert!(done.duration_ms.is_some());

    // Finished executions cannot be cancelled.
    assert!(ExecutionLogRepo::cancel(&pool, org, exec.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_refresh_session_is_single_use(pool: PgPool) {
    let org = register(&pool, "acme").await;
    let open = |hash: &str, days: i64| CreateSession {
        user_id: org.user_id,
        refresh_token_hash: hash.to_string(),
        expires_at: chrono::Utc::now() + chrono::Duration::days(days),
        user_agent: Some("tests".to_string()),
    };
    SessionRepo::open(&pool, &open("live", 7)).await.unwrap();
    SessionRepo::open(&pool, &open("stale", -1)).await.unwrap();
    assert_eq!(SessionRepo::count_live(&pool, org.user_id).await.unwrap(), 1);

    let consumed = SessionRepo::consume(&pool, "live").await.unwrap().unwrap();
    assert!(consumed.is_revoked);
    assert!(SessionRepo::consume(&pool, "live").await.unwrap().is_none());
    assert!(SessionRepo::consume(&pool, "stale").await.unwrap().is_none());
    assert_eq!(SessionRepo::count_live(&pool, org.user_id).await.unwrap(), 0);

    assert_eq!(SessionRepo::purge_dead(&pool).await.unwrap(), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_failed_logins_lock_then_reset(pool: PgPool) {
    let reg = register(&pool, "lockout").await;
    let until = chrono::Utc::now() + chrono::Duration::minutes(15);

    for _ in 0..2 {
        let locked = UserRepo::record_failed_login(&pool, reg.user_id, 3, until).await.unwrap();
        assert!(locked.is_none());
    }
    let locked = UserRepo::record_failed_login(&pool, reg.user_id, 3, until).await.unwrap();
    assert!(locked.is_some());

    let user = UserRepo::find_by_id(&pool, reg.user_id).await.unwrap().unwrap();
    assert!(user.locked_until.is_some());
    assert_eq!(user.failed_login_count, 0);

    UserRepo::record_successful_login(&pool, reg.user_id).await.unwrap();
    let user = UserRepo::find_by_id(&pool, reg.user_id).await.unwrap().unwrap();
    assert!(user.locked_until.is_none());
    assert!(user.last_login_at.is_some());
}
