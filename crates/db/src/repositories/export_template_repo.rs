//! Repository for export templates, their version history and runs.

use sqlx::PgPool;
use pumpflix_core::types::{DbId, Timestamp};

use crate::models::export_template::{
    CreateExportTemplate, ExportRun, ExportTemplate, ExportTemplateVersion, ScheduleUpdate,
    UpdateExportTemplate,
};

/// Column list for `export_templates` queries.
const COLUMNS: &str = "id, organization_id, tenant_id, name, description, format, schema, \
                        schedule_cron, schedule_timezone, schedule_enabled, next_run_at, \
                        current_version, archived_at, created_by, created_at, updated_at";

/// Column list for `export_template_versions` queries.
const VERSION_COLUMNS: &str =
    "id, export_template_id, version, schema, change_note, created_by, created_at";

/// Column list for `export_runs` queries.
const RUN_COLUMNS: &str = "id, export_template_id, version, status, row_count, output, \
                            error_message, requested_by, created_at, finished_at";

/// Note stored with the version created at template creation.
const INITIAL_VERSION_NOTE: &str = "Initial version";

/// Provides CRUD and versioning for export templates.
pub struct ExportTemplateRepo;

impl ExportTemplateRepo {
    /// Insert a template and its version-1 snapshot in one transaction.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &PgPool,
        organization_id: DbId,
        tenant_id: DbId,
        created_by: DbId,
        input: &CreateExportTemplate,
        schedule_enabled: bool,
        next_run_at: Option<Timestamp>,
    ) -> Result<ExportTemplate, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO export_templates (organization_id, tenant_id, name, description, format, schema, \
                 schedule_cron, schedule_timezone, schedule_enabled, next_run_at, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, 'UTC'), $9, $10, $11)
             RETURNING {COLUMNS}"
        );
        let template = sqlx::query_as::<_, ExportTemplate>(&query)
            .bind(organization_id)
            .bind(tenant_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.format)
            .bind(&input.schema)
            .bind(&input.schedule_cron)
            .bind(&input.schedule_timezone)
            .bind(schedule_enabled)
            .bind(next_run_at)
            .bind(created_by)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO export_template_versions (export_template_id, version, schema, change_note, created_by) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(template.id)
        .bind(template.current_version)
        .bind(&template.schema)
        .bind(INITIAL_VERSION_NOTE)
        .bind(created_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(template)
    }

    pub async fn find_by_id(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<ExportTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM export_templates WHERE id = $1 AND organization_id = $2"
        );
        sqlx::query_as::<_, ExportTemplate>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Find a template without organization scoping (worker use).
    pub async fn find_unscoped(pool: &PgPool, id: DbId) -> Result<Option<ExportTemplate>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM export_templates WHERE id = $1");
        sqlx::query_as::<_, ExportTemplate>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &PgPool,
        organization_id: DbId,
        include_archived: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExportTemplate>, sqlx::Error> {
        let archived_filter = if include_archived {
            ""
        } else {
            "AND archived_at IS NULL"
        };
        let query = format!(
            "SELECT {COLUMNS} FROM export_templates \
             WHERE organization_id = $1 {archived_filter} \
             ORDER BY name ASC, id ASC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, ExportTemplate>(&query)
            .bind(organization_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Update metadata and schedule columns. The schema is versioned and
    /// goes through [`Self::update_schema`].
    pub async fn update_metadata(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
        input: &UpdateExportTemplate,
        schedule: &ScheduleUpdate,
    ) -> Result<Option<ExportTemplate>, sqlx::Error> {
        let query = format!(
            "UPDATE export_templates SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                format = COALESCE($5, format),
                schedule_cron = COALESCE($6, schedule_cron),
                schedule_timezone = COALESCE($7, schedule_timezone),
                schedule_enabled = COALESCE($8, schedule_enabled),
                next_run_at = CASE WHEN COALESCE($8, schedule_enabled) THEN COALESCE($9, next_run_at) ELSE NULL END
             WHERE id = $1 AND organization_id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExportTemplate>(&query)
            .bind(id)
            .bind(organization_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.format)
            .bind(&schedule.schedule_cron)
            .bind(&schedule.schedule_timezone)
            .bind(schedule.schedule_enabled)
            .bind(schedule.next_run_at)
            .fetch_optional(pool)
            .await
    }

    /// Replace the schema, bump `current_version` and store the snapshot,
    /// in one transaction. The row is locked so concurrent edits get
    /// consecutive version numbers.
    pub async fn update_schema(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
        schema: &serde_json::Value,
        change_note: Option<&str>,
        created_by: DbId,
    ) -> Result<Option<ExportTemplate>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let locked: Option<DbId> = sqlx::query_scalar(
            "SELECT id FROM export_templates WHERE id = $1 AND organization_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let query = format!(
            "UPDATE export_templates SET schema = $2, current_version = current_version + 1 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let template = sqlx::query_as::<_, ExportTemplate>(&query)
            .bind(id)
            .bind(schema)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO export_template_versions (export_template_id, version, schema, change_note, created_by) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(template.id)
        .bind(template.current_version)
        .bind(schema)
        .bind(change_note)
        .bind(created_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(template))
    }

    /// Soft-archive a template. Archived templates are not scheduled.
    pub async fn archive(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<ExportTemplate>, sqlx::Error> {
        let query = format!(
            "UPDATE export_templates SET archived_at = NOW(), next_run_at = NULL \
             WHERE id = $1 AND organization_id = $2 AND archived_at IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExportTemplate>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, organization_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM export_templates WHERE id = $1 AND organization_id = $2")
                .bind(id)
                .bind(organization_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Non-archived templates (the plan's export-template quota).
    pub async fn count_active(pool: &PgPool, organization_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM export_templates WHERE organization_id = $1 AND archived_at IS NULL",
        )
        .bind(organization_id)
        .fetch_one(pool)
        .await
    }

    pub async fn list_versions(
        pool: &PgPool,
        template_id: DbId,
    ) -> Result<Vec<ExportTemplateVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {VERSION_COLUMNS} FROM export_template_versions \
             WHERE export_template_id = $1 ORDER BY version DESC"
        );
        sqlx::query_as::<_, ExportTemplateVersion>(&query)
            .bind(template_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find_version(
        pool: &PgPool,
        template_id: DbId,
        version: i32,
    ) -> Result<Option<ExportTemplateVersion>, sqlx::Error> {
        let query = format!(
            "SELECT {VERSION_COLUMNS} FROM export_template_versions \
             WHERE export_template_id = $1 AND version = $2"
        );
        sqlx::query_as::<_, ExportTemplateVersion>(&query)
            .bind(template_id)
            .bind(version)
            .fetch_optional(pool)
            .await
    }

    /// Claim scheduled templates that are due, advancing each one's
    /// `next_run_at` via `advance`. Rows are locked with `SKIP LOCKED` so
    /// several schedulers never pick the same template.
    ///
    /// `advance` receives `(cron, timezone)` and returns the next run, or
    /// `None` to disable the schedule.
    pub async fn claim_due<F>(
        pool: &PgPool,
        batch: i64,
        mut advance: F,
    ) -> Result<Vec<ExportTemplate>, sqlx::Error>
    where
        F: FnMut(&str, &str) -> Option<Timestamp>,
    {
        let mut tx = pool.begin().await?;

        let query = format!(
            "SELECT {COLUMNS} FROM export_templates \
             WHERE schedule_enabled = true AND archived_at IS NULL \
               AND schedule_cron IS NOT NULL \
               AND next_run_at IS NOT NULL AND next_run_at <= NOW() \
             ORDER BY next_run_at ASC \
             LIMIT $1 \
             FOR UPDATE SKIP LOCKED"
        );
        let due = sqlx::query_as::<_, ExportTemplate>(&query)
            .bind(batch)
            .fetch_all(&mut *tx)
            .await?;

        for template in &due {
            let cron = template.schedule_cron.as_deref().unwrap_or_default();
            let next = advance(cron, &template.schedule_timezone);
            sqlx::query(
                "UPDATE export_templates SET next_run_at = $2, schedule_enabled = $3 WHERE id = $1",
            )
            .bind(template.id)
            .bind(next)
            .bind(next.is_some())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(due)
    }
}

/// Provides access to export runs.
pub struct ExportRunRepo;

impl ExportRunRepo {
    pub async fn create_queued(
        pool: &PgPool,
        template_id: DbId,
        version: i32,
        requested_by: Option<DbId>,
    ) -> Result<ExportRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO export_runs (export_template_id, version, requested_by) \
             VALUES ($1, $2, $3) \
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, ExportRun>(&query)
            .bind(template_id)
            .bind(version)
            .bind(requested_by)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ExportRun>, sqlx::Error> {
        let query = format!("SELECT {RUN_COLUMNS} FROM export_runs WHERE id = $1");
        sqlx::query_as::<_, ExportRun>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_template(
        pool: &PgPool,
        template_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExportRun>, sqlx::Error> {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM export_runs WHERE export_template_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, ExportRun>(&query)
            .bind(template_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn mark_running(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE export_runs SET status = 'running' WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn succeed(
        pool: &PgPool,
        id: DbId,
        row_count: i64,
        output: &serde_json::Value,
    ) -> Result<Option<ExportRun>, sqlx::Error> {
        let query = format!(
            "UPDATE export_runs SET status = 'succeeded', row_count = $2, output = $3, finished_at = NOW() \
             WHERE id = $1 RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, ExportRun>(&query)
            .bind(id)
            .bind(row_count)
            .bind(output)
            .fetch_optional(pool)
            .await
    }

    /// Fail a run that is still queued or running because its job gave up.
    pub async fn abandon(pool: &PgPool, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE export_runs SET status = 'failed', error_message = $2, finished_at = NOW() \
             WHERE id = $1 AND status IN ('queued', 'running')",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE export_runs SET status = 'failed', error_message = $2, finished_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
