//! Workflow definitions: parsing, validation, and execution ordering.
//!
//! A definition is stored as JSON on the `workflows.definition` column:
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": "start", "type": "trigger.manual" },
//!     { "id": "notify", "type": "slack.post_message",
//!       "config": { "channel": "#ops", "credential_id": 4 } }
//!   ],
//!   "edges": [ { "from": "start", "to": "notify" } ]
//! }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

pub const MAX_NODES: usize = 200;
pub const MAX_WORKFLOW_NAME_LENGTH: usize = 200;

// ---------------------------------------------------------------------------
// Status names (match `workflows.status` CHECK constraint)
// ---------------------------------------------------------------------------

pub const WORKFLOW_STATUS_DRAFT: &str = "draft";
pub const WORKFLOW_STATUS_ACTIVE: &str = "active";
pub const WORKFLOW_STATUS_PAUSED: &str = "paused";

pub const WORKFLOW_STATUSES: &[&str] = &[
    WORKFLOW_STATUS_DRAFT,
    WORKFLOW_STATUS_ACTIVE,
    WORKFLOW_STATUS_PAUSED,
];

// ---------------------------------------------------------------------------
// Execution status names (match `execution_logs.status`)
// ---------------------------------------------------------------------------

pub const EXECUTION_QUEUED: &str = "queued";
pub const EXECUTION_RUNNING: &str = "running";
pub const EXECUTION_SUCCEEDED: &str = "succeeded";
pub const EXECUTION_FAILED: &str = "failed";
pub const EXECUTION_CANCELLED: &str = "cancelled";

/// Per-node step outcomes recorded in `execution_logs.steps`.
pub const STEP_SUCCEEDED: &str = "succeeded";
pub const STEP_FAILED: &str = "failed";
pub const STEP_SKIPPED: &str = "skipped";

/// Whether an execution in `status` has finished.
pub fn is_terminal_execution_status(status: &str) -> bool {
    matches!(
        status,
        EXECUTION_SUCCEEDED | EXECUTION_FAILED | EXECUTION_CANCELLED
    )
}

// ---------------------------------------------------------------------------
// Node catalogue
// ---------------------------------------------------------------------------

/// Static description of a node type.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NodeKind {
    pub type_name: &'static str,
    pub is_trigger: bool,
    /// Credential provider the node needs, if it talks to an integration.
    pub credential_provider: Option<&'static str>,
}

pub const PROVIDER_SLACK: &str = "slack";
pub const PROVIDER_SMTP: &str = "smtp";
pub const PROVIDER_GOOGLE_SHEETS: &str = "google_sheets";
pub const PROVIDER_HTTP_BEARER: &str = "http_bearer";

/// Credential providers accepted by the credentials API.
pub const CREDENTIAL_PROVIDERS: &[&str] = &[
    PROVIDER_SLACK,
    PROVIDER_SMTP,
    PROVIDER_GOOGLE_SHEETS,
    PROVIDER_HTTP_BEARER,
];

pub const NODE_KINDS: &[NodeKind] = &[
    NodeKind { type_name: "trigger.manual", is_trigger: true, credential_provider: None },
    NodeKind { type_name: "trigger.schedule", is_trigger: true, credential_provider: None },
    NodeKind { type_name: "trigger.webhook", is_trigger: true, credential_provider: None },
    NodeKind { type_name: "slack.post_message", is_trigger: false, credential_provider: Some(PROVIDER_SLACK) },
    NodeKind { type_name: "email.send", is_trigger: false, credential_provider: Some(PROVIDER_SMTP) },
    NodeKind { type_name: "sheets.append_row", is_trigger: false, credential_provider: Some(PROVIDER_GOOGLE_SHEETS) },
    NodeKind { type_name: "http.request", is_trigger: false, credential_provider: None },
    NodeKind { type_name: "logic.delay", is_trigger: false, credential_provider: None },
    NodeKind { type_name: "logic.condition", is_trigger: false, credential_provider: None },
];

pub fn node_kind(type_name: &str) -> Option<&'static NodeKind> {
    NODE_KINDS.iter().find(|k| k.type_name == type_name)
}

// ---------------------------------------------------------------------------
// Definition types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Node {
    /// Credential id referenced by `config.credential_id`, if any.
    pub fn credential_id(&self) -> Option<DbId> {
        self.config.get("credential_id").and_then(|v| v.as_i64())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A node that needs an integration credential.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialRequirement {
    pub node_id: String,
    pub provider: &'static str,
    pub credential_id: Option<DbId>,
}

// ---------------------------------------------------------------------------
// Parsing and validation
// ---------------------------------------------------------------------------

/// Deserialize a definition from stored JSON.
pub fn parse_definition(value: &serde_json::Value) -> Result<WorkflowDefinition, CoreError> {
    serde_json::from_value(value.clone())
        .map_err(|e| CoreError::Validation(format!("Invalid workflow definition: {e}")))
}

/// Parse and validate in one step.
pub fn parse_and_validate(value: &serde_json::Value) -> Result<WorkflowDefinition, CoreError> {
    let def = parse_definition(value)?;
    validate(&def)?;
    Ok(def)
}

/// Check structural rules of a definition.
pub fn validate(def: &WorkflowDefinition) -> Result<(), CoreError> {
    if def.nodes.is_empty() {
        return Err(CoreError::Validation(
            "Workflow must contain at least one node".into(),
        ));
    }
    if def.nodes.len() > MAX_NODES {
        return Err(CoreError::Validation(format!(
            "Workflow exceeds maximum of {MAX_NODES} nodes"
        )));
    }

    let mut seen = HashSet::new();
    let mut triggers = 0;
    for node in &def.nodes {
        if node.id.trim().is_empty() {
            return Err(CoreError::Validation("Node id must not be empty".into()));
        }
        if !seen.insert(node.id.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate node id '{}'",
                node.id
            )));
        }
        let kind = node_kind(&node.node_type).ok_or_else(|| {
            CoreError::Validation(format!(
                "Node '{}' has unknown type '{}'",
                node.id, node.node_type
            ))
        })?;
        if kind.is_trigger {
            triggers += 1;
        }
        if !(node.config.is_null() || node.config.is_object()) {
            return Err(CoreError::Validation(format!(
                "Node '{}' config must be an object",
                node.id
            )));
        }
    }
    if triggers != 1 {
        return Err(CoreError::Validation(format!(
            "Workflow must have exactly one trigger node, found {triggers}"
        )));
    }

    for edge in &def.edges {
        if edge.from == edge.to {
            return Err(CoreError::Validation(format!(
                "Edge on '{}' must not loop to itself",
                edge.from
            )));
        }
        for end in [&edge.from, &edge.to] {
            if !seen.contains(end.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Edge references unknown node '{end}'"
                )));
            }
        }
    }
    if let Some(trigger) = def
        .nodes
        .iter()
        .find(|n| node_kind(&n.node_type).is_some_and(|k| k.is_trigger))
    {
        if def.edges.iter().any(|e| e.to == trigger.id) {
            return Err(CoreError::Validation(format!(
                "Trigger node '{}' must not have incoming edges",
                trigger.id
            )));
        }
    }

    execution_order(def).map(|_| ())
}

/// Nodes in dependency order (Kahn's algorithm). Ties are broken by the
/// order in which nodes are declared. Fails if the graph has a cycle.
pub fn execution_order(def: &WorkflowDefinition) -> Result<Vec<&Node>, CoreError> {
    let index: HashMap<&str, usize> = def
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; def.nodes.len()];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); def.nodes.len()];
    for edge in &def.edges {
        let (Some(&from), Some(&to)) = (index.get(edge.from.as_str()), index.get(edge.to.as_str()))
        else {
            return Err(CoreError::Validation(format!(
                "Edge {} -> {} references an unknown node",
                edge.from, edge.to
            )));
        };
        outgoing[from].push(to);
        in_degree[to] += 1;
    }

    let mut ready: VecDeque<usize> = (0..def.nodes.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(def.nodes.len());

    while let Some(i) = ready.pop_front() {
        order.push(&def.nodes[i]);
        let mut next: Vec<usize> = Vec::new();
        for &j in &outgoing[i] {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                next.push(j);
            }
        }
        next.sort_unstable();
        ready.extend(next);
    }

    if order.len() != def.nodes.len() {
        return Err(CoreError::Validation("Workflow graph contains a cycle".into()));
    }
    Ok(order)
}

/// Every integration node and the credential it references.
pub fn required_credentials(def: &WorkflowDefinition) -> Vec<CredentialRequirement> {
    def.nodes
        .iter()
        .filter_map(|n| {
            let provider = node_kind(&n.node_type)?.credential_provider?;
            Some(CredentialRequirement {
                node_id: n.id.clone(),
                provider,
                credential_id: n.credential_id(),
            })
        })
        .collect()
}

/// Merge per-node config overrides (keyed by node id) into a definition.
///
/// Override keys replace same-named keys in the node's config; unknown
/// node ids are rejected.
pub fn apply_config_overrides(
    def: &mut WorkflowDefinition,
    overrides: &serde_json::Value,
) -> Result<(), CoreError> {
    let map = match overrides {
        serde_json::Value::Null => return Ok(()),
        serde_json::Value::Object(map) => map,
        _ => {
            return Err(CoreError::Validation(
                "Config overrides must be an object keyed by node id".into(),
            ))
        }
    };
    for (node_id, patch) in map {
        let node = def
            .nodes
            .iter_mut()
            .find(|n| &n.id == node_id)
            .ok_or_else(|| CoreError::Validation(format!("Override for unknown node '{node_id}'")))?;
        let serde_json::Value::Object(patch) = patch else {
            return Err(CoreError::Validation(format!(
                "Override for node '{node_id}' must be an object"
            )));
        };
        if !node.config.is_object() {
            node.config = serde_json::Value::Object(Default::default());
        }
        if let serde_json::Value::Object(config) = &mut node.config {
            for (key, value) in patch {
                config.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

/// Validate a workflow name.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Workflow name must not be empty".into()));
    }
    if trimmed.len() > MAX_WORKFLOW_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Workflow name exceeds {MAX_WORKFLOW_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn validate_status(status: &str) -> Result<(), CoreError> {
    if WORKFLOW_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unknown workflow status '{status}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn linear() -> serde_json::Value {
        json!({
            "nodes": [
                { "id": "start", "type": "trigger.manual" },
                { "id": "sheet", "type": "sheets.append_row", "config": { "credential_id": 9 } },
                { "id": "slack", "type": "slack.post_message" }
            ],
            "edges": [
                { "from": "start", "to": "sheet" },
                { "from": "sheet", "to": "slack" }
            ]
        })
    }

    #[test]
    fn valid_linear_workflow() {
        let def = parse_and_validate(&linear()).expect("valid");
        let order: Vec<&str> = execution_order(&def)
            .unwrap()
            .into_iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(order, vec!["start", "sheet", "slack"]);
    }

    #[test]
    fn ties_follow_declaration_order() {
        let def = parse_and_validate(&json!({
            "nodes": [
                { "id": "t", "type": "trigger.webhook" },
                { "id": "b", "type": "logic.delay" },
                { "id": "a", "type": "http.request" }
            ],
            "edges": [ { "from": "t", "to": "a" }, { "from": "t", "to": "b" } ]
        }))
        .unwrap();
        let ids: Vec<&str> = execution_order(&def).unwrap().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["t", "b", "a"]);
    }

    #[test]
    fn rejects_cycle() {
        let value = json!({
            "nodes": [
                { "id": "t", "type": "trigger.manual" },
                { "id": "a", "type": "logic.delay" },
                { "id": "b", "type": "logic.delay" }
            ],
            "edges": [
                { "from": "t", "to": "a" },
                { "from": "a", "to": "b" },
                { "from": "b", "to": "a" }
            ]
        });
        assert_matches!(parse_and_validate(&value), Err(CoreError::Validation(m)) if m.contains("cycle"));
    }

    #[test]
    fn rejects_dangling_edge_and_unknown_type() {
        let dangling = json!({
            "nodes": [{ "id": "t", "type": "trigger.manual" }],
            "edges": [{ "from": "t", "to": "ghost" }]
        });
        assert_matches!(parse_and_validate(&dangling), Err(CoreError::Validation(m)) if m.contains("ghost"));

        let unknown = json!({ "nodes": [{ "id": "t", "type": "fax.send" }] });
        assert_matches!(parse_and_validate(&unknown), Err(CoreError::Validation(m)) if m.contains("fax.send"));
    }

    #[test]
    fn requires_exactly_one_trigger() {
        let none = json!({ "nodes": [{ "id": "a", "type": "logic.delay" }] });
        assert!(parse_and_validate(&none).is_err());

        let two = json!({ "nodes": [
            { "id": "a", "type": "trigger.manual" },
            { "id": "b", "type": "trigger.schedule" }
        ]});
        assert!(parse_and_validate(&two).is_err());
    }

    #[test]
    fn rejects_duplicate_ids_and_empty() {
        let dup = json!({ "nodes": [
            { "id": "a", "type": "trigger.manual" },
            { "id": "a", "type": "logic.delay" }
        ]});
        assert_matches!(parse_and_validate(&dup), Err(CoreError::Validation(m)) if m.contains("Duplicate"));
        assert!(parse_and_validate(&json!({ "nodes": [] })).is_err());
        assert!(parse_and_validate(&json!({ "edges": [] })).is_err());
    }

    #[test]
    fn credential_requirements_listed() {
        let def = parse_and_validate(&linear()).unwrap();
        let reqs = required_credentials(&def);
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].provider, PROVIDER_GOOGLE_SHEETS);
        assert_eq!(reqs[0].credential_id, Some(9));
        assert_eq!(reqs[1].provider, PROVIDER_SLACK);
        assert_eq!(reqs[1].credential_id, None);
    }

    #[test]
    fn overrides_merge_into_node_config() {
        let mut def = parse_and_validate(&linear()).unwrap();
        apply_config_overrides(&mut def, &json!({ "slack": { "channel": "#alerts" }, "sheet": { "credential_id": 11 } }))
            .unwrap();
        assert_eq!(def.nodes[2].config, json!({ "channel": "#alerts" }));
        assert_eq!(def.nodes[1].credential_id(), Some(11));

        assert!(apply_config_overrides(&mut def, &json!({ "ghost": {} })).is_err());
        assert!(apply_config_overrides(&mut def, &json!([1])).is_err());
    }

    #[test]
    fn name_rules() {
        assert!(validate_name("Daily digest").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(MAX_WORKFLOW_NAME_LENGTH + 1)).is_err());
    }
}
