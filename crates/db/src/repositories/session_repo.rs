//! Refresh-token sessions (`user_sessions`).
//!
//! A refresh token is single use: [`SessionRepo::consume`] revokes the row
//! in the same statement that reads it, so two concurrent refreshes with
//! the same token cannot both succeed.

use sqlx::PgPool;
use pumpflix_core::types::DbId;

use crate::models::session::{CreateSession, UserSession};

const COLUMNS: &str = "id, user_id, refresh_token_hash, expires_at, is_revoked, \
                        user_agent, created_at, updated_at";

pub struct SessionRepo;

impl SessionRepo {
    pub async fn open(pool: &PgPool, input: &CreateSession) -> Result<UserSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_sessions (user_id, refresh_token_hash, expires_at, user_agent) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(input.user_id)
            .bind(&input.refresh_token_hash)
            .bind(input.expires_at)
            .bind(&input.user_agent)
            .fetch_one(pool)
            .await
    }

    /// Revoke the live session holding `token_hash` and return it. `None`
    /// when the token is unknown, expired, or already used.
    pub async fn consume(
        pool: &PgPool,
        token_hash: &str,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        let query = format!(
            "UPDATE user_sessions SET is_revoked = true \
             WHERE refresh_token_hash = $1 AND is_revoked = false AND expires_at > NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(token_hash)
            .fetch_optional(pool)
            .await
    }

    /// Sign a user out everywhere.
    pub async fn revoke_for_user(pool: &PgPool, user_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_revoked = true WHERE user_id = $1 AND is_revoked = false",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Number of sessions that can still be refreshed.
    pub async fn count_live(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_sessions \
             WHERE user_id = $1 AND is_revoked = false AND expires_at > NOW()",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Drop sessions that can never be used again.
    pub async fn purge_dead(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE is_revoked OR expires_at <= NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
