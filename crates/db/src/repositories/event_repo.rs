//! Repository for the `events` table.

use sqlx::PgPool;
use pumpflix_core::types::DbId;

use crate::models::event::Event;

/// Column list for `events` queries.
const COLUMNS: &str = "id, event_type, organization_id, source_entity_type, source_entity_id, \
                        actor_user_id, payload, created_at";

/// Append-only store of platform events.
pub struct EventRepo;

impl EventRepo {
    /// Insert an event, returning its id.
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        organization_id: Option<DbId>,
        source_entity_type: Option<&str>,
        source_entity_id: Option<DbId>,
        actor_user_id: Option<DbId>,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO events (event_type, organization_id, source_entity_type, source_entity_id, actor_user_id, payload) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(event_type)
        .bind(organization_id)
        .bind(source_entity_type)
        .bind(source_entity_id)
        .bind(actor_user_id)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// Most recent events of an organization.
    pub async fn list_for_organization(
        pool: &PgPool,
        organization_id: DbId,
        limit: i64,
    ) -> Result<Vec<Event>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM events WHERE organization_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(organization_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
