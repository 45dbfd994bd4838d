//! Repository for the `organizations` table, including sign-up.

use sqlx::PgPool;
use pumpflix_core::plans::{Plan, SubscriptionStatus};
use pumpflix_core::roles::ROLE_OWNER;
use pumpflix_core::types::DbId;

use crate::models::organization::{
    Organization, RegisteredOrganization, Registration, Tenant, UpdateOrganization,
};

/// Column list for `organizations` queries.
const COLUMNS: &str = "id, name, slug, created_at, updated_at";

/// Name given to the tenant created at sign-up.
const DEFAULT_TENANT_NAME: &str = "Default";
const DEFAULT_TENANT_SLUG: &str = "default";

/// Provides CRUD operations for organizations.
pub struct OrganizationRepo;

impl OrganizationRepo {
    /// Create an organization with its default tenant, owner user and a free
    /// trialing subscription, all in one transaction.
    pub async fn register(
        pool: &PgPool,
        input: &Registration,
    ) -> Result<RegisteredOrganization, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO organizations (name, slug) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        let organization = sqlx::query_as::<_, Organization>(&query)
            .bind(&input.organization_name)
            .bind(&input.organization_slug)
            .fetch_one(&mut *tx)
            .await?;

        let tenant = sqlx::query_as::<_, Tenant>(
            "INSERT INTO tenants (organization_id, name, slug, is_default) \
             VALUES ($1, $2, $3, true) \
             RETURNING id, organization_id, name, slug, is_default, created_at, updated_at",
        )
        .bind(organization.id)
        .bind(DEFAULT_TENANT_NAME)
        .bind(DEFAULT_TENANT_SLUG)
        .fetch_one(&mut *tx)
        .await?;

        let user_id: DbId = sqlx::query_scalar(
            "INSERT INTO users (organization_id, tenant_id, email, display_name, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(organization.id)
        .bind(tenant.id)
        .bind(&input.email)
        .bind(&input.display_name)
        .bind(&input.password_hash)
        .bind(ROLE_OWNER)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO subscriptions (organization_id, plan, status) VALUES ($1, $2, $3)")
            .bind(organization.id)
            .bind(Plan::Free.as_str())
            .bind(SubscriptionStatus::Trialing.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(RegisteredOrganization {
            organization,
            tenant,
            user_id,
        })
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Organization>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM organizations WHERE id = $1");
        sqlx::query_as::<_, Organization>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Update an organization. Only non-`None` fields in `input` are applied.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateOrganization,
    ) -> Result<Option<Organization>, sqlx::Error> {
        let query = format!(
            "UPDATE organizations SET name = COALESCE($2, name) WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Organization>(&query)
            .bind(id)
            .bind(&input.name)
            .fetch_optional(pool)
            .await
    }

    /// All organization ids, used by periodic per-organization jobs.
    pub async fn list_ids(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM organizations ORDER BY id")
            .fetch_all(pool)
            .await
    }
}
