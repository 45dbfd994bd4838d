//! Repository for the `ws_sessions` table.

use sqlx::PgPool;
use pumpflix_core::types::DbId;

use crate::models::ws_session::WsSession;

/// Column list for `ws_sessions` queries.
const COLUMNS: &str = "id, connection_id, user_id, organization_id, channels, \
                        connected_at, last_seen_at, disconnected_at";

/// Bookkeeping for WebSocket connections, for admin visibility.
pub struct WsSessionRepo;

impl WsSessionRepo {
    pub async fn open(
        pool: &PgPool,
        connection_id: &str,
        user_id: DbId,
        organization_id: DbId,
    ) -> Result<WsSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO ws_sessions (connection_id, user_id, organization_id) \
             VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WsSession>(&query)
            .bind(connection_id)
            .bind(user_id)
            .bind(organization_id)
            .fetch_one(pool)
            .await
    }

    /// Store the connection's current channel list and bump `last_seen_at`.
    pub async fn update_channels(
        pool: &PgPool,
        connection_id: &str,
        channels: &[String],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE ws_sessions SET channels = $2, last_seen_at = NOW() WHERE connection_id = $1",
        )
        .bind(connection_id)
        .bind(serde_json::json!(channels))
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn touch(pool: &PgPool, connection_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE ws_sessions SET last_seen_at = NOW() WHERE connection_id = $1")
            .bind(connection_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn close(pool: &PgPool, connection_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE ws_sessions SET disconnected_at = NOW() \
             WHERE connection_id = $1 AND disconnected_at IS NULL",
        )
        .bind(connection_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark every open session closed. Run at startup, since connections
    /// never survive a restart.
    pub async fn close_all_open(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ws_sessions SET disconnected_at = NOW() WHERE disconnected_at IS NULL",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list(
        pool: &PgPool,
        organization_id: DbId,
        active_only: bool,
        limit: i64,
    ) -> Result<Vec<WsSession>, sqlx::Error> {
        let filter = if active_only {
            "AND disconnected_at IS NULL"
        } else {
            ""
        };
        let query = format!(
            "SELECT {COLUMNS} FROM ws_sessions WHERE organization_id = $1 {filter} \
             ORDER BY connected_at DESC LIMIT $2"
        );
        sqlx::query_as::<_, WsSession>(&query)
            .bind(organization_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Delete closed sessions older than `days`.
    pub async fn purge_closed(pool: &PgPool, days: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM ws_sessions \
             WHERE disconnected_at IS NOT NULL AND disconnected_at < NOW() - make_interval(days => $1::INT)",
        )
        .bind(days)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
