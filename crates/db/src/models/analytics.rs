//! Aggregated usage analytics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pumpflix_core::types::DbId;

/// Executions per day.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DailyExecutions {
    pub day: NaiveDate,
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
}

/// A workflow ranked by execution count.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TopWorkflow {
    pub workflow_id: DbId,
    pub name: String,
    pub executions: i64,
}

/// Response for `GET /api/v1/analytics/usage`.
#[derive(Debug, Clone, Serialize)]
pub struct UsageAnalytics {
    pub days: i64,
    pub total_executions: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub daily: Vec<DailyExecutions>,
    pub top_workflows: Vec<TopWorkflow>,
}

/// Query parameters for `GET /api/v1/analytics/usage`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageQuery {
    pub days: Option<i64>,
}

/// Current-period counters checked against plan limits.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UsageCounters {
    pub monthly_executions: i64,
    pub active_workflows: i64,
    pub credentials: i64,
    pub export_templates: i64,
}
