use pumpflix_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::notification::{NewNotice, Notification};

const COLUMNS: &str =
    "id, organization_id, user_id, kind, title, body, data, is_read, read_at, created_at";

pub struct NotificationRepo;

impl NotificationRepo {
    /// Insert one copy of `notice` per recipient in a single statement.
    pub async fn fan_out(
        pool: &PgPool,
        notice: &NewNotice,
        user_ids: &[DbId],
    ) -> Result<Vec<Notification>, sqlx::Error> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "INSERT INTO notifications (organization_id, user_id, kind, title, body, data) \
             SELECT $1, recipient, $3, $4, $5, $6 FROM UNNEST($2::bigint[]) AS recipient \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(notice.organization_id)
            .bind(user_ids)
            .bind(&notice.kind)
            .bind(&notice.title)
            .bind(&notice.body)
            .bind(&notice.data)
            .fetch_all(pool)
            .await
    }

    /// Newest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE user_id = $1 AND (NOT $2 OR NOT is_read) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(user_id)
            .bind(unread_only)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// `false` when the notification is not the user's or was already read.
    pub async fn mark_read(
        pool: &PgPool,
        notification_id: DbId,
        user_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        Self::mark(pool, user_id, Some(notification_id))
            .await
            .map(|n| n > 0)
    }

    pub async fn mark_all_read(pool: &PgPool, user_id: DbId) -> Result<u64, sqlx::Error> {
        Self::mark(pool, user_id, None).await
    }

    async fn mark(
        pool: &PgPool,
        user_id: DbId,
        notification_id: Option<DbId>,
    ) -> Result<u64, sqlx::Error> {
        let done = sqlx::query(
            "UPDATE notifications SET is_read = true, read_at = NOW() \
             WHERE user_id = $1 AND NOT is_read AND ($2::bigint IS NULL OR id = $2)",
        )
        .bind(user_id)
        .bind(notification_id)
        .execute(pool)
        .await?;
        Ok(done.rows_affected())
    }

    pub async fn unread_count(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Whether anyone in the organization already got a `kind` notice since
    /// `since`.
    pub async fn exists_since(
        pool: &PgPool,
        organization_id: DbId,
        kind: &str,
        since: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM notifications \
             WHERE organization_id = $1 AND kind = $2 AND created_at >= $3)",
        )
        .bind(organization_id)
        .bind(kind)
        .bind(since)
        .fetch_one(pool)
        .await
    }
}
