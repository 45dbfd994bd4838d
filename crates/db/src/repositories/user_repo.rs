use sqlx::PgPool;
use pumpflix_core::roles::{ROLE_ADMIN, ROLE_OWNER};
use pumpflix_core::types::{DbId, Timestamp};

use crate::models::user::{CreateUser, UpdateUser, User};

const COLUMNS: &str = "id, organization_id, tenant_id, email, display_name, password_hash, \
                        role, is_active, last_login_at, failed_login_count, locked_until, \
                        created_at, updated_at";

pub struct UserRepo;

impl UserRepo {
    pub async fn create(pool: &PgPool, input: &CreateUser) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (organization_id, tenant_id, email, display_name, password_hash, role)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(input.organization_id)
            .bind(input.tenant_id)
            .bind(&input.email)
            .bind(&input.display_name)
            .bind(&input.password_hash)
            .bind(&input.role)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_in_organization(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1 AND organization_id = $2");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Case-insensitive.
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE lower(email) = lower($1)");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// List an organization's users, oldest first.
    pub async fn list_by_organization(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Vec<User>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM users WHERE organization_id = $1 ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(organization_id)
            .fetch_all(pool)
            .await
    }

    /// IDs of active owners and admins, who receive billing and usage
    /// notifications.
    pub async fn list_admin_ids(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT id FROM users \
             WHERE organization_id = $1 AND is_active = true AND role IN ($2, $3) \
             ORDER BY id",
        )
        .bind(organization_id)
        .bind(ROLE_OWNER)
        .bind(ROLE_ADMIN)
        .fetch_all(pool)
        .await
    }

    /// Patch semantics: `None` fields keep their value.
    pub async fn update(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
        input: &UpdateUser,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET
                display_name = COALESCE($3, display_name),
                role = COALESCE($4, role),
                tenant_id = COALESCE($5, tenant_id)
             WHERE id = $1 AND organization_id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(organization_id)
            .bind(&input.display_name)
            .bind(&input.role)
            .bind(input.tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// Soft delete. `false` when the user was already inactive or is not in
    /// the organization.
    pub async fn deactivate(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET is_active = false \
             WHERE id = $1 AND organization_id = $2 AND is_active = true",
        )
        .bind(id)
        .bind(organization_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count a bad password. Reaching `max_attempts` locks the account
    /// until `lock_until` and starts the count again. Returns the lock
    /// expiry when this attempt caused it.
    pub async fn record_failed_login(
        pool: &PgPool,
        id: DbId,
        max_attempts: i32,
        lock_until: Timestamp,
    ) -> Result<Option<Timestamp>, sqlx::Error> {
        let (locked,): (bool,) = sqlx::query_as(
            "UPDATE users SET \
                locked_until = CASE WHEN failed_login_count + 1 >= $2 THEN $3 ELSE locked_until END, \
                failed_login_count = CASE WHEN failed_login_count + 1 >= $2 THEN 0 \
                                          ELSE failed_login_count + 1 END \
             WHERE id = $1 \
             RETURNING locked_until IS NOT DISTINCT FROM $3",
        )
        .bind(id)
        .bind(max_attempts)
        .bind(lock_until)
        .fetch_one(pool)
        .await?;
        Ok(locked.then_some(lock_until))
    }

    pub async fn record_successful_login(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET failed_login_count = 0, locked_until = NULL, last_login_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
