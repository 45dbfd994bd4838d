//! Simulated node runtime.
//!
//! Integration nodes check their config and report what they would send;
//! no request leaves the process. Each runner returns the node's output or
//! a message describing why the step failed.

use pumpflix_core::workflow::Node;
use serde_json::{json, Value};

/// Longest delay a `logic.delay` node may declare.
pub const MAX_DELAY_SECS: f64 = 86_400.0;

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Run one node against the execution input.
pub fn run_node(node: &Node, input: &Value) -> Result<Value, String> {
    match node.node_type.as_str() {
        t if t.starts_with("trigger.") => Ok(input.clone()),
        "http.request" => http_request(&node.config),
        "slack.post_message" => slack_post_message(&node.config),
        "email.send" => email_send(&node.config),
        "sheets.append_row" => sheets_append_row(&node.config),
        "logic.delay" => delay(&node.config),
        "logic.condition" => condition(&node.config, input),
        other => Err(format!("No runtime for node type '{other}'")),
    }
}

/// True when a condition node's output closes its branch.
pub fn blocks_branch(node: &Node, output: &Value) -> bool {
    node.node_type == "logic.condition" && output.get("passed") == Some(&Value::Bool(false))
}

fn required_str<'a>(config: &'a Value, key: &str) -> Result<&'a str, String> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("config.{key} is required"))
}

fn http_request(config: &Value) -> Result<Value, String> {
    let url = required_str(config, "url")?;
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(format!("config.url must be an http(s) URL, got '{url}'"));
    }
    let method = config
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_ascii_uppercase();
    if !HTTP_METHODS.contains(&method.as_str()) {
        return Err(format!("Unsupported HTTP method '{method}'"));
    }
    Ok(json!({ "method": method, "url": url, "simulated": true }))
}

fn slack_post_message(config: &Value) -> Result<Value, String> {
    let channel = required_str(config, "channel")?;
    let text = required_str(config, "text")?;
    Ok(json!({
        "channel": channel,
        "text_length": text.chars().count(),
        "simulated": true,
    }))
}

fn email_send(config: &Value) -> Result<Value, String> {
    let to = required_str(config, "to")?;
    if !to.contains('@') {
        return Err(format!("config.to is not an email address: '{to}'"));
    }
    let subject = required_str(config, "subject")?;
    Ok(json!({ "to": to, "subject": subject, "simulated": true }))
}

fn sheets_append_row(config: &Value) -> Result<Value, String> {
    let spreadsheet_id = required_str(config, "spreadsheet_id")?;
    let columns = match config.get("values") {
        None | Some(Value::Null) => 0,
        Some(Value::Array(values)) => values.len(),
        Some(_) => return Err("config.values must be an array".into()),
    };
    Ok(json!({
        "spreadsheet_id": spreadsheet_id,
        "columns": columns,
        "simulated": true,
    }))
}

fn delay(config: &Value) -> Result<Value, String> {
    let secs = config
        .get("seconds")
        .and_then(Value::as_f64)
        .ok_or_else(|| "config.seconds must be a number".to_string())?;
    if !(0.0..=MAX_DELAY_SECS).contains(&secs) {
        return Err(format!("config.seconds must be between 0 and {MAX_DELAY_SECS}"));
    }
    Ok(json!({ "delay_secs": secs }))
}

/// `{"field": "lead.score", "equals": 10}` compares a dotted path of the
/// execution input.
fn condition(config: &Value, input: &Value) -> Result<Value, String> {
    let field = required_str(config, "field")?;
    let expected = config
        .get("equals")
        .ok_or_else(|| "config.equals is required".to_string())?;
    let pointer = format!("/{}", field.replace('.', "/"));
    let actual = input.pointer(&pointer).unwrap_or(&Value::Null);
    Ok(json!({ "field": field, "passed": actual == expected }))
}
