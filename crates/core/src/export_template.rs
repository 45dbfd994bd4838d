//! Export templates: schema validation, schedule parsing, and version diffs.
//!
//! An export schema is a JSON object with a `fields` array plus top-level
//! settings read by the worker (`source`, `limit`, `delimiter`):
//!
//! ```json
//! {
//!   "fields": [
//!     { "name": "workflow", "type": "string" },
//!     { "name": "runs", "type": "integer", "label": "Runs" }
//!   ],
//!   "delimiter": ","
//! }
//! ```

use std::collections::{BTreeMap, HashSet};

use chrono::{FixedOffset, Offset, Utc};
use croner::Cron;
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::types::Timestamp;

pub const FORMAT_CSV: &str = "csv";
pub const FORMAT_JSON: &str = "json";
pub const FORMAT_XLSX: &str = "xlsx";

pub const FORMATS: &[&str] = &[FORMAT_CSV, FORMAT_JSON, FORMAT_XLSX];

pub const FIELD_TYPES: &[&str] = &["string", "number", "integer", "boolean", "date", "datetime"];

pub const MAX_FIELDS: usize = 250;

/// Prefix used in diff paths for per-field entries.
const FIELDS_KEY: &str = "fields";

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate_format(format: &str) -> Result<(), CoreError> {
    if FORMATS.contains(&format) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unknown export format '{format}', expected one of: {}",
            FORMATS.join(", ")
        )))
    }
}

/// Check the shape of an export schema.
pub fn validate_schema(schema: &Value) -> Result<(), CoreError> {
    let obj = schema
        .as_object()
        .ok_or_else(|| CoreError::Validation("Export schema must be a JSON object".into()))?;

    let fields = obj
        .get(FIELDS_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| CoreError::Validation("Export schema must contain a 'fields' array".into()))?;

    if fields.is_empty() {
        return Err(CoreError::Validation(
            "Export schema must define at least one field".into(),
        ));
    }
    if fields.len() > MAX_FIELDS {
        return Err(CoreError::Validation(format!(
            "Export schema exceeds {MAX_FIELDS} fields"
        )));
    }

    let mut names = HashSet::new();
    for (i, field) in fields.iter().enumerate() {
        let name = field
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CoreError::Validation(format!("Field #{i} is missing a name")))?;
        if !names.insert(name) {
            return Err(CoreError::Validation(format!("Duplicate field name '{name}'")));
        }
        let ty = field
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Validation(format!("Field '{name}' is missing a type")))?;
        if !FIELD_TYPES.contains(&ty) {
            return Err(CoreError::Validation(format!(
                "Field '{name}' has unknown type '{ty}'"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Parse a timezone given as `UTC` or a fixed offset like `+02:00`.
pub fn parse_timezone(tz: &str) -> Result<FixedOffset, CoreError> {
    if tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return Ok(Utc.fix());
    }
    tz.parse::<FixedOffset>()
        .map_err(|_| CoreError::Validation(format!("Invalid timezone offset '{tz}'")))
}

/// Validate a cron expression and compute the next run strictly after `after`.
pub fn next_run(cron_expr: &str, timezone: &str, after: Timestamp) -> Result<Timestamp, CoreError> {
    let offset = parse_timezone(timezone)?;
    let cron = Cron::new(cron_expr)
        .parse()
        .map_err(|e| CoreError::Validation(format!("Invalid cron expression '{cron_expr}': {e}")))?;
    let local = after.with_timezone(&offset);
    let next = cron
        .find_next_occurrence(&local, false)
        .map_err(|e| CoreError::Validation(format!("Cron expression never fires: {e}")))?;
    Ok(next.with_timezone(&Utc))
}

/// Validate a schedule and return its next occurrence after now.
pub fn validate_schedule(cron_expr: &str, timezone: &str) -> Result<Timestamp, CoreError> {
    next_run(cron_expr, timezone, Utc::now())
}

// ---------------------------------------------------------------------------
// Version diff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One changed path between two schema versions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    /// Top-level key, or `fields.<name>` for per-field changes.
    pub path: String,
    pub status: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

/// Result of comparing two schema versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDiff {
    pub added: Vec<DiffEntry>,
    pub removed: Vec<DiffEntry>,
    pub modified: Vec<DiffEntry>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    fn push(&mut self, path: String, old: Option<&Value>, new: Option<&Value>) {
        let status = match (old, new) {
            (None, Some(_)) => ChangeKind::Added,
            (Some(_), None) => ChangeKind::Removed,
            (Some(a), Some(b)) if a != b => ChangeKind::Modified,
            _ => return,
        };
        let entry = DiffEntry {
            path,
            status,
            old: old.cloned(),
            new: new.cloned(),
        };
        match status {
            ChangeKind::Added => self.added.push(entry),
            ChangeKind::Removed => self.removed.push(entry),
            ChangeKind::Modified => self.modified.push(entry),
        }
    }
}

/// Shallow structural diff of two schema objects.
///
/// Top-level keys are compared by value. The `fields` array gets one level
/// of extra care: fields are matched by `name`, so reordering is not a change
/// but adding, removing, or editing a field is reported as `fields.<name>`.
pub fn diff_schemas(old: &Value, new: &Value) -> Result<SchemaDiff, CoreError> {
    let (Some(old_obj), Some(new_obj)) = (old.as_object(), new.as_object()) else {
        return Err(CoreError::Validation(
            "Both schema versions must be JSON objects".into(),
        ));
    };

    let mut diff = SchemaDiff::default();

    let keys: std::collections::BTreeSet<&String> = old_obj.keys().chain(new_obj.keys()).collect();
    for key in keys {
        let (a, b) = (old_obj.get(key), new_obj.get(key));
        if key == FIELDS_KEY {
            if let (Some(Value::Array(a)), Some(Value::Array(b))) = (a, b) {
                diff_fields(&mut diff, a, b);
                continue;
            }
        }
        diff.push(key.clone(), a, b);
    }

    for list in [&mut diff.added, &mut diff.removed, &mut diff.modified] {
        list.sort_by(|x, y| x.path.cmp(&y.path));
    }
    Ok(diff)
}

fn diff_fields(diff: &mut SchemaDiff, old: &[Value], new: &[Value]) {
    let index = |fields: &[Value]| -> BTreeMap<String, Value> {
        fields
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let name = f
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("#{i}"));
                (name, f.clone())
            })
            .collect()
    };
    let (old_map, new_map) = (index(old), index(new));
    let names: std::collections::BTreeSet<&String> = old_map.keys().chain(new_map.keys()).collect();
    for name in names {
        diff.push(
            format!("{FIELDS_KEY}.{name}"),
            old_map.get(name),
            new_map.get(name),
        );
    }
}
