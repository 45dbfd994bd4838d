//! Audit trail writer.
//!
//! Subscribes to the bus and stores events in the `events` table. Per-node
//! `execution.step` events are not stored: the same information is kept in
//! the execution's step log.

use pumpflix_core::types::DbId;
use pumpflix_db::repositories::EventRepo;
use pumpflix_db::DbPool;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::bus::PlatformEvent;
use crate::event_types::EXECUTION_STEP;

pub struct EventPersistence;

impl EventPersistence {
    /// Store events until the bus is dropped.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<PlatformEvent>) {
        let mut stored: u64 = 0;
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Audit writer fell behind, events lost");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !Self::is_recorded(&event.event_type) {
                continue;
            }
            match Self::persist(&pool, &event).await {
                Ok(_) => stored += 1,
                Err(e) => tracing::error!(
                    event_type = %event.event_type,
                    organization_id = ?event.organization_id,
                    error = %e,
                    "Failed to store event"
                ),
            }
        }
        tracing::info!(stored, "Audit writer stopped");
    }

    /// Whether events of this type belong in the audit trail.
    pub fn is_recorded(event_type: &str) -> bool {
        event_type != EXECUTION_STEP
    }

    pub async fn persist(pool: &DbPool, event: &PlatformEvent) -> Result<DbId, sqlx::Error> {
        EventRepo::insert(
            pool,
            &event.event_type,
            event.organization_id,
            event.source_entity_type.as_deref(),
            event.source_entity_id,
            event.actor_user_id,
            &event.payload,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_types::{EXECUTION_FAILED, WORKFLOW_CREATED};

    #[test]
    fn step_events_stay_out_of_the_audit_trail() {
        assert!(!EventPersistence::is_recorded(EXECUTION_STEP));
        assert!(EventPersistence::is_recorded(EXECUTION_FAILED));
        assert!(EventPersistence::is_recorded(WORKFLOW_CREATED));
    }
}
