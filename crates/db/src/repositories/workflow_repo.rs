//! Repository for the `workflows` table.

use sqlx::PgPool;
use pumpflix_core::types::DbId;
use pumpflix_core::workflow::{WORKFLOW_STATUS_ACTIVE, WORKFLOW_STATUS_DRAFT};

use crate::models::workflow::{CreateWorkflow, UpdateWorkflow, Workflow, WorkflowListQuery};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, organization_id, tenant_id, created_by, name, description, \
                        definition, status, archived_at, created_at, updated_at";

/// Provides CRUD operations for workflows. Every query is scoped to an
/// organization.
pub struct WorkflowRepo;

impl WorkflowRepo {
    /// Insert a new workflow, returning the created row.
    ///
    /// If `status` is `None` in the input, defaults to `draft`.
    pub async fn create(
        pool: &PgPool,
        organization_id: DbId,
        tenant_id: DbId,
        created_by: DbId,
        input: &CreateWorkflow,
    ) -> Result<Workflow, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflows (organization_id, tenant_id, created_by, name, description, definition, status)
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, '{WORKFLOW_STATUS_DRAFT}'))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(organization_id)
            .bind(tenant_id)
            .bind(created_by)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.definition)
            .bind(&input.status)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM workflows WHERE id = $1 AND organization_id = $2");
        sqlx::query_as::<_, Workflow>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// List workflows, most recently updated first. Archived rows are
    /// excluded unless `include_archived` is set.
    pub async fn list(
        pool: &PgPool,
        organization_id: DbId,
        params: &WorkflowListQuery,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Workflow>, sqlx::Error> {
        let archived_filter = if params.include_archived.unwrap_or(false) {
            ""
        } else {
            "AND archived_at IS NULL"
        };
        let query = format!(
            "SELECT {COLUMNS} FROM workflows \
             WHERE organization_id = $1 \
               AND ($2::TEXT IS NULL OR status = $2) \
               AND ($3::BIGINT IS NULL OR tenant_id = $3) \
               {archived_filter} \
             ORDER BY updated_at DESC, id DESC \
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(organization_id)
            .bind(&params.status)
            .bind(params.tenant_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Update a workflow. Only non-`None` fields in `input` are applied.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
        input: &UpdateWorkflow,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let query = format!(
            "UPDATE workflows SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                definition = COALESCE($5, definition),
                status = COALESCE($6, status)
             WHERE id = $1 AND organization_id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(id)
            .bind(organization_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.definition)
            .bind(&input.status)
            .fetch_optional(pool)
            .await
    }

    /// Soft-archive a workflow. Returns `None` if missing or already archived.
    pub async fn archive(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let query = format!(
            "UPDATE workflows SET archived_at = NOW() \
             WHERE id = $1 AND organization_id = $2 AND archived_at IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Restore an archived workflow. Returns `None` if missing or not archived.
    pub async fn unarchive(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let query = format!(
            "UPDATE workflows SET archived_at = NULL \
             WHERE id = $1 AND organization_id = $2 AND archived_at IS NOT NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Permanently delete a workflow. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, organization_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of active, non-archived workflows (the plan's workflow quota).
    pub async fn count_active(pool: &PgPool, organization_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM workflows \
             WHERE organization_id = $1 AND status = $2 AND archived_at IS NULL",
        )
        .bind(organization_id)
        .bind(WORKFLOW_STATUS_ACTIVE)
        .fetch_one(pool)
        .await
    }
}
