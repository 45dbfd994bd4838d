//! `workflow.execute`: walk a workflow's nodes in dependency order and
//! record one step per node.

use std::collections::HashSet;

use chrono::Utc;
use pumpflix_core::types::DbId;
use pumpflix_core::workflow::{
    execution_order, node_kind, parse_and_validate, Node, WorkflowDefinition, EXECUTION_QUEUED, EXECUTION_RUNNING,
    STEP_FAILED, STEP_SKIPPED, STEP_SUCCEEDED,
};
use pumpflix_db::models::execution::{ExecutionLog, ExecutionStep};
use pumpflix_db::repositories::{CredentialRepo, ExecutionLogRepo, WorkflowRepo};
use pumpflix_db::DbPool;
use pumpflix_events::event_types::{
    ENTITY_EXECUTION, EXECUTION_FAILED, EXECUTION_STARTED, EXECUTION_STEP, EXECUTION_SUCCEEDED,
};
use pumpflix_events::PlatformEvent;
use serde_json::{json, Value};

use super::notify;
use crate::error::JobError;
use crate::nodes;

/// Steps recorded so far and the error that ended the run, if any.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub steps: Vec<ExecutionStep>,
    pub error: Option<String>,
}

pub async fn execute_workflow(pool: &DbPool, execution_id: DbId) -> Result<(), JobError> {
    let execution = ExecutionLogRepo::find_unscoped(pool, execution_id)
        .await?
        .ok_or(JobError::NotFound { entity: "ExecutionLog", id: execution_id })?;
    match execution.status.as_str() {
        EXECUTION_QUEUED => {}
        EXECUTION_RUNNING => {
            tracing::info!(execution_id, "Resuming execution left running by an earlier attempt");
        }
        status => {
            tracing::debug!(execution_id, status, "Execution already settled, skipping");
            return Ok(());
        }
    }

    let workflow =
        WorkflowRepo::find_by_id(pool, execution.organization_id, execution.workflow_id)
            .await?
            .ok_or(JobError::NotFound { entity: "Workflow", id: execution.workflow_id })?;

    if !ExecutionLogRepo::mark_running(pool, execution.id).await? {
        tracing::debug!(execution_id, "Execution was cancelled before it started");
        return Ok(());
    }
    notify(pool, execution_event(EXECUTION_STARTED, &execution, json!({
        "workflow_id": execution.workflow_id,
        "status": "running",
    })))
    .await;

    // On error the execution stays `running`: a retry restarts it and
    // `abandon_execution` closes it once the job runs out of attempts.
    let outcome = run_steps(pool, &execution, &workflow.definition).await?;

    let steps = serde_json::to_value(&outcome.steps)
        .map_err(|e| JobError::InvalidPayload(format!("step log serialization failed: {e}")))?;
    let Some(finished) =
        ExecutionLogRepo::finish(pool, execution.id, &steps, outcome.error.as_deref()).await?
    else {
        tracing::info!(execution_id, "Execution was cancelled while running");
        return Ok(());
    };

    tracing::info!(
        execution_id,
        workflow_id = finished.workflow_id,
        status = %finished.status,
        duration_ms = finished.duration_ms,
        steps = outcome.steps.len(),
        "Execution finished"
    );
    let event_type = if outcome.error.is_some() {
        EXECUTION_FAILED
    } else {
        EXECUTION_SUCCEEDED
    };
    notify(pool, execution_event(event_type, &finished, json!({
        "workflow_id": finished.workflow_id,
        "status": finished.status,
        "duration_ms": finished.duration_ms,
        "error": finished.error_message,
    })))
    .await;
    Ok(())
}

/// Fail an execution whose job will not run again.
pub async fn abandon_execution(
    pool: &DbPool,
    execution_id: DbId,
    reason: &str,
) -> Result<(), sqlx::Error> {
    let message = format!("Execution aborted: {reason}");
    let Some(failed) = ExecutionLogRepo::abandon(pool, execution_id, &message).await? else {
        return Ok(());
    };
    tracing::warn!(execution_id, error = %message, "Execution abandoned");
    notify(pool, execution_event(EXECUTION_FAILED, &failed, json!({
        "workflow_id": failed.workflow_id,
        "status": failed.status,
        "error": failed.error_message,
    })))
    .await;
    Ok(())
}

/// Run every node in order. Node failures end the run and are reported in
/// the outcome; only database errors are returned as `Err`.
pub async fn run_steps(
    pool: &DbPool,
    execution: &ExecutionLog,
    definition: &Value,
) -> Result<RunOutcome, JobError> {
    let def = match parse_and_validate(definition) {
        Ok(def) => def,
        Err(e) => {
            return Ok(RunOutcome {
                steps: Vec::new(),
                error: Some(e.to_string()),
            })
        }
    };
    let order = match execution_order(&def) {
        Ok(order) => order,
        Err(e) => {
            return Ok(RunOutcome {
                steps: Vec::new(),
                error: Some(e.to_string()),
            })
        }
    };

    let mut outcome = RunOutcome::default();
    let mut blocked: HashSet<&str> = HashSet::new();

    for node in order {
        let started_at = Utc::now();

        if has_blocked_predecessor(&def, node, &blocked) {
            blocked.insert(node.id.as_str());
            outcome.steps.push(step(node, STEP_SKIPPED, None, None, started_at));
            continue;
        }

        let result = match credential_problem(pool, execution.organization_id, node).await? {
            Some(problem) => Err(problem),
            None => nodes::run_node(node, &execution.input),
        };

        match result {
            Ok(output) => {
                if nodes::blocks_branch(node, &output) {
                    blocked.insert(node.id.as_str());
                }
                outcome
                    .steps
                    .push(step(node, STEP_SUCCEEDED, None, Some(output), started_at));
                publish_step(pool, execution, node, STEP_SUCCEEDED).await;
            }
            Err(message) => {
                outcome.error = Some(format!("Node '{}' failed: {message}", node.id));
                outcome
                    .steps
                    .push(step(node, STEP_FAILED, Some(message), None, started_at));
                publish_step(pool, execution, node, STEP_FAILED).await;
                break;
            }
        }
    }
    Ok(outcome)
}

fn has_blocked_predecessor(def: &WorkflowDefinition, node: &Node, blocked: &HashSet<&str>) -> bool {
    def.edges
        .iter()
        .any(|e| e.to == node.id && blocked.contains(e.from.as_str()))
}

/// Describe why an integration node cannot use its credential, or `None`
/// when it needs none or the credential is usable. A usable credential is
/// marked as used.
async fn credential_problem(
    pool: &DbPool,
    organization_id: DbId,
    node: &Node,
) -> Result<Option<String>, JobError> {
    let Some(provider) = node_kind(&node.node_type).and_then(|k| k.credential_provider) else {
        return Ok(None);
    };
    let Some(credential_id) = node.credential_id() else {
        return Ok(Some(format!("a {provider} credential is required")));
    };
    match CredentialRepo::find_by_id(pool, organization_id, credential_id).await? {
        None => Ok(Some(format!("credential {credential_id} not found"))),
        Some(c) if c.provider != provider => Ok(Some(format!(
            "credential {credential_id} is for {}, expected {provider}",
            c.provider
        ))),
        Some(c) => {
            CredentialRepo::touch_last_used(pool, c.id).await?;
            Ok(None)
        }
    }
}

fn step(
    node: &Node,
    status: &str,
    message: Option<String>,
    output: Option<Value>,
    started_at: chrono::DateTime<Utc>,
) -> ExecutionStep {
    ExecutionStep {
        node_id: node.id.clone(),
        node_type: node.node_type.clone(),
        status: status.to_string(),
        message,
        output,
        started_at,
        finished_at: Utc::now(),
    }
}

async fn publish_step(pool: &DbPool, execution: &ExecutionLog, node: &Node, status: &str) {
    notify(pool, execution_event(EXECUTION_STEP, execution, json!({
        "workflow_id": execution.workflow_id,
        "node_id": node.id,
        "node_type": node.node_type,
        "status": status,
    })))
    .await;
}

fn execution_event(event_type: &str, execution: &ExecutionLog, payload: Value) -> PlatformEvent {
    let event = PlatformEvent::new(event_type)
        .with_organization(execution.organization_id)
        .with_source(ENTITY_EXECUTION, execution.id)
        .with_payload(payload);
    match execution.triggered_by {
        Some(user_id) => event.with_actor(user_id),
        None => event,
    }
}
