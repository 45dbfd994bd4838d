//! Repository for the `credentials` table.

use sqlx::PgPool;
use pumpflix_core::types::DbId;

use crate::models::credential::{Credential, SealedSecret};

/// Column list for `credentials` queries.
const COLUMNS: &str = "id, organization_id, tenant_id, provider, name, encrypted_secret, \
                        nonce, secret_hint, metadata, created_by, last_used_at, \
                        created_at, updated_at";

/// Provides CRUD operations for integration credentials. Secrets arrive
/// here already encrypted.
pub struct CredentialRepo;

impl CredentialRepo {
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &PgPool,
        organization_id: DbId,
        tenant_id: DbId,
        created_by: DbId,
        provider: &str,
        name: &str,
        sealed: &SealedSecret,
        metadata: &serde_json::Value,
    ) -> Result<Credential, sqlx::Error> {
        let query = format!(
            "INSERT INTO credentials (organization_id, tenant_id, provider, name, encrypted_secret, nonce, secret_hint, metadata, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Credential>(&query)
            .bind(organization_id)
            .bind(tenant_id)
            .bind(provider)
            .bind(name)
            .bind(&sealed.ciphertext)
            .bind(&sealed.nonce)
            .bind(&sealed.hint)
            .bind(metadata)
            .bind(created_by)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<Credential>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM credentials WHERE id = $1 AND organization_id = $2");
        sqlx::query_as::<_, Credential>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// List credentials, optionally for one provider.
    pub async fn list(
        pool: &PgPool,
        organization_id: DbId,
        provider: Option<&str>,
    ) -> Result<Vec<Credential>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM credentials \
             WHERE organization_id = $1 AND ($2::TEXT IS NULL OR provider = $2) \
             ORDER BY provider ASC, name ASC"
        );
        sqlx::query_as::<_, Credential>(&query)
            .bind(organization_id)
            .bind(provider)
            .fetch_all(pool)
            .await
    }

    /// Update name, metadata and/or the sealed secret.
    pub async fn update(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
        name: Option<&str>,
        sealed: Option<&SealedSecret>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<Option<Credential>, sqlx::Error> {
        let query = format!(
            "UPDATE credentials SET
                name = COALESCE($3, name),
                encrypted_secret = COALESCE($4, encrypted_secret),
                nonce = COALESCE($5, nonce),
                secret_hint = COALESCE($6, secret_hint),
                metadata = COALESCE($7, metadata)
             WHERE id = $1 AND organization_id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Credential>(&query)
            .bind(id)
            .bind(organization_id)
            .bind(name)
            .bind(sealed.map(|s| &s.ciphertext))
            .bind(sealed.map(|s| &s.nonce))
            .bind(sealed.map(|s| &s.hint))
            .bind(metadata)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, organization_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(organization_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_last_used(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE credentials SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn count(pool: &PgPool, organization_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM credentials WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_one(pool)
            .await
    }
}
