#![allow(dead_code)]

use pumpflix_core::jobs::{JOB_EXECUTE_WORKFLOW, JOB_RUN_EXPORT};
use pumpflix_db::models::execution::ExecutionLog;
use pumpflix_db::models::export_template::{CreateExportTemplate, ExportRun, ExportTemplate};
use pumpflix_db::models::job::{EnqueueJob, Job};
use pumpflix_db::models::organization::{RegisteredOrganization, Registration};
use pumpflix_db::models::workflow::{CreateWorkflow, Workflow};
use pumpflix_db::repositories::{
    ExecutionLogRepo, ExportRunRepo, ExportTemplateRepo, JobRepo, OrganizationRepo, WorkflowRepo,
};
use serde_json::{json, Value};
use sqlx::PgPool;

pub async fn register_org(pool: &PgPool, slug: &str) -> RegisteredOrganization {
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

/// Manual trigger, a passing HTTP node and whatever `extra` nodes follow it.
pub fn definition(extra: Vec<Value>) -> Value {
    let mut nodes = vec![
        json!({ "id": "start", "type": "trigger.manual" }),
        json!({ "id": "call", "type": "http.request",
                "config": { "url": "https://hooks.example.com/in", "method": "post" } }),
    ];
    let mut edges = vec![json!({ "from": "start", "to": "call" })];
    let mut previous = "call".to_string();
    for node in extra {
        let id = node["id"].as_str().unwrap().to_string();
        edges.push(json!({ "from": previous, "to": id }));
        previous = id;
        nodes.push(node);
    }
    json!({ "nodes": nodes, "edges": edges })
}

pub async fn create_workflow(pool: &PgPool, org: &RegisteredOrganization, definition: Value) -> Workflow {
    WorkflowRepo::create(
        pool,
        org.organization.id,
        org.tenant.id,
        org.user_id,
        &CreateWorkflow {
            name: "Lead intake".to_string(),
            description: None,
            definition,
            status: Some("active".to_string()),
        },
    )
    .await
    .unwrap()
}

/// Queue an execution and the job that runs it.
pub async fn queue_execution(
    pool: &PgPool,
    org: &RegisteredOrganization,
    workflow: &Workflow,
    input: Value,
) -> (ExecutionLog, Job) {
    let execution = ExecutionLogRepo::create_queued(
        pool,
        org.organization.id,
        org.tenant.id,
        workflow.id,
        Some(org.user_id),
        "manual",
        &input,
    )
    .await
    .unwrap();
    let job = enqueue(
        pool,
        JOB_EXECUTE_WORKFLOW,
        org.organization.id,
        json!({ "execution_id": execution.id }),
    )
    .await;
    (execution, job)
}

pub async fn enqueue(pool: &PgPool, job_type: &str, organization_id: i64, payload: Value) -> Job {
    JobRepo::enqueue(
        pool,
        &EnqueueJob {
            job_type: job_type.to_string(),
            organization_id: Some(organization_id),
            payload,
            max_attempts: None,
            run_after: None,
        },
    )
    .await
    .unwrap()
}

pub fn export_input(format: &str, schema: Value, cron: Option<&str>) -> CreateExportTemplate {
    CreateExportTemplate {
        name: "Weekly executions".to_string(),
        description: None,
        format: format.to_string(),
        schema,
        schedule_cron: cron.map(str::to_string),
        schedule_timezone: None,
        schedule_enabled: None,
    }
}

pub async fn create_export_template(
    pool: &PgPool,
    org: &RegisteredOrganization,
    input: &CreateExportTemplate,
    next_run_at: Option<chrono::DateTime<chrono::Utc>>,
) -> ExportTemplate {
    ExportTemplateRepo::create(
        pool,
        org.organization.id,
        org.tenant.id,
        org.user_id,
        input,
        input.schedule_cron.is_some(),
        next_run_at,
    )
    .await
    .unwrap()
}

/// Queue a manual run of the template's current version.
pub async fn queue_export(
    pool: &PgPool,
    org: &RegisteredOrganization,
    template: &ExportTemplate,
) -> (ExportRun, Job) {
    let run = ExportRunRepo::create_queued(pool, template.id, template.current_version, Some(org.user_id))
        .await
        .unwrap();
    let job = enqueue(pool, JOB_RUN_EXPORT, org.organization.id, json!({ "run_id": run.id })).await;
    (run, job)
}
