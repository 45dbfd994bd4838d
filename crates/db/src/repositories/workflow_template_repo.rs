//! Repository for the `workflow_templates` and `workflow_instances` tables.

use sqlx::PgPool;
use pumpflix_core::types::DbId;

use crate::models::workflow::Workflow;
use crate::models::workflow_template::{
    CreateWorkflowTemplate, UpdateWorkflowTemplate, WorkflowInstance, WorkflowTemplate,
};

/// Column list for `workflow_templates` queries.
const COLUMNS: &str = "id, organization_id, name, description, category, definition, \
                        is_public, created_by, created_at, updated_at";

/// Column list for `workflow_instances` queries.
const INSTANCE_COLUMNS: &str =
    "id, template_id, workflow_id, tenant_id, config, created_by, created_at";

/// Columns of `workflows`, repeated here for the instantiate transaction.
const WORKFLOW_COLUMNS: &str = "id, organization_id, tenant_id, created_by, name, description, \
                                 definition, status, archived_at, created_at, updated_at";

/// Visibility rule: an organization sees its own templates, global
/// templates, and public templates of other organizations.
const VISIBLE: &str = "(organization_id = $1 OR organization_id IS NULL OR is_public = true)";

pub struct WorkflowTemplateRepo;

impl WorkflowTemplateRepo {
    pub async fn create(
        pool: &PgPool,
        organization_id: DbId,
        created_by: DbId,
        input: &CreateWorkflowTemplate,
    ) -> Result<WorkflowTemplate, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_templates (organization_id, name, description, category, definition, is_public, created_by)
             VALUES ($1, $2, $3, $4, $5, COALESCE($6, false), $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(organization_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.category)
            .bind(&input.definition)
            .bind(input.is_public)
            .bind(created_by)
            .fetch_one(pool)
            .await
    }

    /// Find a template visible to the organization.
    pub async fn find_visible(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<WorkflowTemplate>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM workflow_templates WHERE id = $2 AND {VISIBLE}");
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(organization_id)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List templates visible to the organization, optionally by category.
    pub async fn list_visible(
        pool: &PgPool,
        organization_id: DbId,
        category: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkflowTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_templates \
             WHERE {VISIBLE} AND ($2::TEXT IS NULL OR category = $2) \
             ORDER BY name ASC, id ASC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(organization_id)
            .bind(category)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Update a template owned by the organization. Global and foreign
    /// templates are read-only.
    pub async fn update(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
        input: &UpdateWorkflowTemplate,
    ) -> Result<Option<WorkflowTemplate>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_templates SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                category = COALESCE($5, category),
                definition = COALESCE($6, definition),
                is_public = COALESCE($7, is_public)
             WHERE id = $1 AND organization_id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowTemplate>(&query)
            .bind(id)
            .bind(organization_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.category)
            .bind(&input.definition)
            .bind(input.is_public)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, organization_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM workflow_templates WHERE id = $1 AND organization_id = $2")
                .bind(id)
                .bind(organization_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Create a workflow from a template and record the instance link, in
    /// one transaction. `definition` is the already-merged definition.
    #[allow(clippy::too_many_arguments)]
    pub async fn instantiate(
        pool: &PgPool,
        template_id: DbId,
        organization_id: DbId,
        tenant_id: DbId,
        created_by: DbId,
        name: &str,
        description: Option<&str>,
        definition: &serde_json::Value,
        config: &serde_json::Value,
    ) -> Result<(Workflow, WorkflowInstance), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO workflows (organization_id, tenant_id, created_by, name, description, definition)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {WORKFLOW_COLUMNS}"
        );
        let workflow = sqlx::query_as::<_, Workflow>(&query)
            .bind(organization_id)
            .bind(tenant_id)
            .bind(created_by)
            .bind(name)
            .bind(description)
            .bind(definition)
            .fetch_one(&mut *tx)
            .await?;

        let query = format!(
            "INSERT INTO workflow_instances (template_id, workflow_id, tenant_id, config, created_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {INSTANCE_COLUMNS}"
        );
        let instance = sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(template_id)
            .bind(workflow.id)
            .bind(tenant_id)
            .bind(config)
            .bind(created_by)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((workflow, instance))
    }
}

/// Read access to `workflow_instances`.
pub struct WorkflowInstanceRepo;

impl WorkflowInstanceRepo {
    /// Instances of a template created inside the organization.
    pub async fn list_for_template(
        pool: &PgPool,
        organization_id: DbId,
        template_id: DbId,
    ) -> Result<Vec<WorkflowInstance>, sqlx::Error> {
        let query = format!(
            "SELECT {INSTANCE_COLUMNS} FROM workflow_instances wi \
             WHERE wi.template_id = $1 \
               AND EXISTS (SELECT 1 FROM workflows w WHERE w.id = wi.workflow_id AND w.organization_id = $2) \
             ORDER BY wi.created_at DESC"
        );
        sqlx::query_as::<_, WorkflowInstance>(&query)
            .bind(template_id)
            .bind(organization_id)
            .fetch_all(pool)
            .await
    }
}
