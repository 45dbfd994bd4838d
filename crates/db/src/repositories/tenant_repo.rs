//! Repository for the `tenants` table.

use sqlx::PgPool;
use pumpflix_core::types::DbId;

use crate::models::organization::Tenant;

/// Column list for `tenants` queries.
const COLUMNS: &str = "id, organization_id, name, slug, is_default, created_at, updated_at";

/// Provides CRUD operations for tenants.
pub struct TenantRepo;

impl TenantRepo {
    pub async fn create(
        pool: &PgPool,
        organization_id: DbId,
        name: &str,
        slug: &str,
    ) -> Result<Tenant, sqlx::Error> {
        let query = format!(
            "INSERT INTO tenants (organization_id, name, slug) VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Tenant>(&query)
            .bind(organization_id)
            .bind(name)
            .bind(slug)
            .fetch_one(pool)
            .await
    }

    /// Find a tenant by id within an organization.
    pub async fn find_by_id(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<Tenant>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM tenants WHERE id = $1 AND organization_id = $2");
        sqlx::query_as::<_, Tenant>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// List an organization's tenants, default tenant first.
    pub async fn list_by_organization(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Vec<Tenant>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tenants WHERE organization_id = $1 \
             ORDER BY is_default DESC, name ASC"
        );
        sqlx::query_as::<_, Tenant>(&query)
            .bind(organization_id)
            .fetch_all(pool)
            .await
    }
}
