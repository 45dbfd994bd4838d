//! Repository for the `ai_templates` table.

use sqlx::PgPool;
use pumpflix_core::types::DbId;

use crate::models::ai_template::{AiTemplate, CreateAiTemplate};

/// Column list for `ai_templates` queries.
const COLUMNS: &str = "id, organization_id, tenant_id, title, prompt, model, \
                        generated_definition, promoted_template_id, created_by, created_at";

pub struct AiTemplateRepo;

impl AiTemplateRepo {
    pub async fn create(
        pool: &PgPool,
        organization_id: DbId,
        tenant_id: DbId,
        created_by: DbId,
        input: &CreateAiTemplate,
    ) -> Result<AiTemplate, sqlx::Error> {
        let query = format!(
            "INSERT INTO ai_templates (organization_id, tenant_id, title, prompt, model, generated_definition, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AiTemplate>(&query)
            .bind(organization_id)
            .bind(tenant_id)
            .bind(&input.title)
            .bind(&input.prompt)
            .bind(&input.model)
            .bind(&input.generated_definition)
            .bind(created_by)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<AiTemplate>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM ai_templates WHERE id = $1 AND organization_id = $2");
        sqlx::query_as::<_, AiTemplate>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &PgPool,
        organization_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AiTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ai_templates WHERE organization_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, AiTemplate>(&query)
            .bind(organization_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Link a draft to the workflow template it was promoted into.
    pub async fn set_promoted(
        pool: &PgPool,
        id: DbId,
        template_id: DbId,
    ) -> Result<Option<AiTemplate>, sqlx::Error> {
        let query = format!(
            "UPDATE ai_templates SET promoted_template_id = $2 WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AiTemplate>(&query)
            .bind(id)
            .bind(template_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, organization_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM ai_templates WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
