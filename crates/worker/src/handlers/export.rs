//! `export.run`: produce the output of one export run from the schema
//! version it was queued with.
//!
//! Schema settings read here:
//!
//! - `source`: `executions` (default) or `workflows`
//! - `limit`: maximum rows, default [`DEFAULT_ROW_LIMIT`]
//! - `delimiter`: single character for CSV, default `,`
//! - per field, `path`: dotted path into the source row, default the
//!   field's `name`; `label`: column header, default the `name`

use pumpflix_core::export_template::{FORMAT_CSV, FORMAT_JSON, FORMAT_XLSX};
use pumpflix_core::types::DbId;
use pumpflix_db::models::execution::ExecutionListQuery;
use pumpflix_db::models::export_template::{ExportRun, ExportTemplate};
use pumpflix_db::models::workflow::WorkflowListQuery;
use pumpflix_db::repositories::{
    ExecutionLogRepo, ExportRunRepo, ExportTemplateRepo, WorkflowRepo,
};
use pumpflix_db::DbPool;
use pumpflix_events::event_types::{ENTITY_EXPORT_TEMPLATE, EXPORT_COMPLETED, EXPORT_FAILED};
use pumpflix_events::PlatformEvent;
use serde_json::{json, Map, Value};

use super::notify;
use crate::error::JobError;

pub const SOURCE_EXECUTIONS: &str = "executions";
pub const SOURCE_WORKFLOWS: &str = "workflows";

pub const DEFAULT_ROW_LIMIT: i64 = 1_000;
pub const MAX_ROW_LIMIT: i64 = 10_000;

pub async fn run_export(pool: &DbPool, run_id: DbId) -> Result<(), JobError> {
    let run = ExportRunRepo::find_by_id(pool, run_id)
        .await?
        .ok_or(JobError::NotFound { entity: "ExportRun", id: run_id })?;
    match run.status.as_str() {
        "queued" => {}
        "running" => tracing::info!(run_id, "Resuming export run left running by an earlier attempt"),
        status => {
            tracing::debug!(run_id, status, "Export run already settled, skipping");
            return Ok(());
        }
    }
    let template = ExportTemplateRepo::find_unscoped(pool, run.export_template_id)
        .await?
        .ok_or(JobError::NotFound { entity: "ExportTemplate", id: run.export_template_id })?;
    let schema = match ExportTemplateRepo::find_version(pool, template.id, run.version).await? {
        Some(version) => version.schema,
        None => template.schema.clone(),
    };

    ExportRunRepo::mark_running(pool, run.id).await?;

    let result = match load_rows(pool, template.organization_id, &schema).await? {
        Ok(rows) => render(&template.format, &schema, &rows),
        Err(message) => Err(message),
    };

    match result {
        Ok(output) => {
            let row_count = output.get("row_count").and_then(Value::as_i64).unwrap_or(0);
            ExportRunRepo::succeed(pool, run.id, row_count, &output).await?;
            tracing::info!(
                run_id,
                export_template_id = template.id,
                format = %template.format,
                row_count,
                "Export run succeeded"
            );
            notify(pool, export_event(EXPORT_COMPLETED, &template, &run, json!({
                "run_id": run.id,
                "version": run.version,
                "row_count": row_count,
            })))
            .await;
        }
        Err(message) => {
            ExportRunRepo::fail(pool, run.id, &message).await?;
            tracing::warn!(run_id, export_template_id = template.id, error = %message, "Export run failed");
            notify(pool, export_event(EXPORT_FAILED, &template, &run, json!({
                "run_id": run.id,
                "version": run.version,
                "error": message,
            })))
            .await;
        }
    }
    Ok(())
}

/// Fail a run whose job will not run again.
pub async fn abandon_run(pool: &DbPool, run_id: DbId, reason: &str) -> Result<(), sqlx::Error> {
    let message = format!("Export aborted: {reason}");
    if !ExportRunRepo::abandon(pool, run_id, &message).await? {
        return Ok(());
    }
    tracing::warn!(run_id, error = %message, "Export run abandoned");
    let Some(run) = ExportRunRepo::find_by_id(pool, run_id).await? else {
        return Ok(());
    };
    if let Some(template) = ExportTemplateRepo::find_unscoped(pool, run.export_template_id).await? {
        notify(pool, export_event(EXPORT_FAILED, &template, &run, json!({
            "run_id": run.id,
            "version": run.version,
            "error": message,
        })))
        .await;
    }
    Ok(())
}

/// Fetch source rows as JSON objects. An unknown source is a run failure,
/// reported as the inner `Err`.
async fn load_rows(
    pool: &DbPool,
    organization_id: DbId,
    schema: &Value,
) -> Result<Result<Vec<Value>, String>, JobError> {
    let limit = schema
        .get("limit")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_ROW_LIMIT)
        .clamp(1, MAX_ROW_LIMIT);
    let source = schema
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or(SOURCE_EXECUTIONS);

    let rows = match source {
        SOURCE_EXECUTIONS => to_rows(
            &ExecutionLogRepo::list(pool, organization_id, &ExecutionListQuery::default(), limit, 0)
                .await?,
        ),
        SOURCE_WORKFLOWS => to_rows(
            &WorkflowRepo::list(pool, organization_id, &WorkflowListQuery::default(), limit, 0)
                .await?,
        ),
        other => return Ok(Err(format!("Unknown export source '{other}'"))),
    };
    Ok(rows)
}

fn to_rows<T: serde::Serialize>(items: &[T]) -> Result<Vec<Value>, String> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(|e| format!("Row serialization failed: {e}")))
        .collect()
}

/// A schema field resolved for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub label: String,
    pub pointer: String,
}

pub fn columns(schema: &Value) -> Vec<Column> {
    schema
        .get("fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| {
                    let name = f.get("name").and_then(Value::as_str)?.trim().to_string();
                    let label = f
                        .get("label")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| name.clone());
                    let path = f.get("path").and_then(Value::as_str).unwrap_or(&name);
                    let pointer = format!("/{}", path.replace('.', "/"));
                    Some(Column { name, label, pointer })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Render rows into the stored run output.
pub fn render(format: &str, schema: &Value, rows: &[Value]) -> Result<Value, String> {
    let columns = columns(schema);
    if columns.is_empty() {
        return Err("Export schema has no fields".into());
    }
    let labels: Vec<&str> = columns.iter().map(|c| c.label.as_str()).collect();
    let pick = |row: &Value, column: &Column| row.pointer(&column.pointer).cloned().unwrap_or(Value::Null);

    let body = match format {
        FORMAT_CSV => {
            let delimiter = csv_delimiter(schema)?;
            let mut out = String::new();
            push_csv_line(&mut out, labels.iter().map(|l| l.to_string()), delimiter);
            for row in rows {
                push_csv_line(
                    &mut out,
                    columns.iter().map(|c| cell_text(&pick(row, c))),
                    delimiter,
                );
            }
            json!({ "content": out })
        }
        FORMAT_JSON => {
            let objects: Vec<Value> = rows
                .iter()
                .map(|row| {
                    let map: Map<String, Value> =
                        columns.iter().map(|c| (c.name.clone(), pick(row, c))).collect();
                    Value::Object(map)
                })
                .collect();
            json!({ "rows": objects })
        }
        FORMAT_XLSX => {
            let cells: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| columns.iter().map(|c| pick(row, c)).collect())
                .collect();
            json!({ "sheet": "Export", "rows": cells })
        }
        other => return Err(format!("Unsupported export format '{other}'")),
    };

    let mut output = json!({
        "format": format,
        "columns": labels,
        "row_count": rows.len(),
    });
    if let (Value::Object(out), Value::Object(extra)) = (&mut output, body) {
        out.extend(extra);
    }
    Ok(output)
}

fn csv_delimiter(schema: &Value) -> Result<char, String> {
    match schema.get("delimiter").and_then(Value::as_str) {
        None => Ok(','),
        Some(d) => {
            let mut chars = d.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if !matches!(c, '"' | '\n' | '\r') => Ok(c),
                _ => Err(format!("Invalid CSV delimiter '{d}'")),
            }
        }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_csv_line(out: &mut String, cells: impl Iterator<Item = String>, delimiter: char) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        if cell.contains(|c: char| c == delimiter || matches!(c, '"' | '\n' | '\r')) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&cell);
        }
    }
    out.push('\n');
}

fn export_event(
    event_type: &str,
    template: &ExportTemplate,
    run: &ExportRun,
    payload: Value,
) -> PlatformEvent {
    let event = PlatformEvent::new(event_type)
        .with_organization(template.organization_id)
        .with_source(ENTITY_EXPORT_TEMPLATE, template.id)
        .with_payload(payload);
    match run.requested_by {
        Some(user_id) => event.with_actor(user_id),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Value {
        json!({
            "fields": [
                { "name": "id", "type": "integer" },
                { "name": "status", "type": "string", "label": "Status" },
                { "name": "node", "type": "string", "path": "steps.0.node_id" }
            ]
        })
    }

    fn rows() -> Vec<Value> {
        vec![
            json!({ "id": 1, "status": "succeeded", "steps": [{ "node_id": "start" }] }),
            json!({ "id": 2, "status": "failed, badly", "steps": [] }),
        ]
    }

    #[test]
    fn columns_use_label_and_path() {
        let cols = columns(&schema());
        assert_eq!(cols[1].label, "Status");
        assert_eq!(cols[2].pointer, "/steps/0/node_id");
        assert_eq!(cols[0].label, "id");
    }

    #[test]
    fn csv_quotes_cells_with_delimiter() {
        let out = render(FORMAT_CSV, &schema(), &rows()).unwrap();
        assert_eq!(out["row_count"], 2);
        assert_eq!(
            out["content"],
            "id,Status,node\n1,succeeded,start\n2,\"failed, badly\",\n"
        );
    }

    #[test]
    fn csv_quotes_line_breaks_and_quotes() {
        let rows = vec![
            json!({ "id": 1, "status": "line\r\nbreak" }),
            json!({ "id": 2, "status": "lone\rreturn" }),
            json!({ "id": 3, "status": "say \"hi\"" }),
        ];
        let out = render(FORMAT_CSV, &schema(), &rows).unwrap();
        assert_eq!(
            out["content"],
            "id,Status,node\n1,\"line\r\nbreak\",\n2,\"lone\rreturn\",\n3,\"say \"\"hi\"\"\",\n"
        );
    }

    #[test]
    fn json_rows_are_keyed_by_name() {
        let out = render(FORMAT_JSON, &schema(), &rows()).unwrap();
        assert_eq!(out["rows"][0], json!({ "id": 1, "status": "succeeded", "node": "start" }));
        assert_eq!(out["rows"][1]["node"], Value::Null);
        assert_eq!(out["columns"], json!(["id", "Status", "node"]));
    }

    #[test]
    fn xlsx_rows_are_positional() {
        let out = render(FORMAT_XLSX, &schema(), &rows()).unwrap();
        assert_eq!(out["rows"][0], json!([1, "succeeded", "start"]));
    }

    #[test]
    fn bad_delimiter_fails_the_run() {
        let mut s = schema();
        s["delimiter"] = json!(";;");
        assert!(render(FORMAT_CSV, &s, &rows()).is_err());
        for bad in ["\"", "\n", "\r", ""] {
            s["delimiter"] = json!(bad);
            assert!(render(FORMAT_CSV, &s, &rows()).is_err(), "{bad:?} accepted");
        }
        s["delimiter"] = json!(";");
        let out = render(FORMAT_CSV, &s, &rows()).unwrap();
        assert!(out["content"].as_str().unwrap().starts_with("id;Status;node\n"));
    }
}
