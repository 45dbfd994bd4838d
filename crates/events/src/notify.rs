//! Cross-process event delivery over Postgres `LISTEN`/`NOTIFY`.
//!
//! The worker has no WebSocket clients of its own. It calls
//! [`publish_notify`] for every status change, and the API runs a
//! [`NotifyRelay`] that listens on [`NOTIFY_CHANNEL`] and republishes each
//! payload onto its in-process [`EventBus`].

use std::sync::Arc;
use std::time::Duration;

use pumpflix_db::DbPool;
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, PlatformEvent};

/// Postgres notification channel carrying serialized [`PlatformEvent`]s.
pub const NOTIFY_CHANNEL: &str = "pumpflix_events";

/// Postgres rejects `NOTIFY` payloads of 8000 bytes or more.
const MAX_PAYLOAD_BYTES: usize = 7900;

/// Pause after a listener error before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Send an event to every process listening on [`NOTIFY_CHANNEL`].
///
/// Oversized payloads are replaced by an empty object so the envelope
/// (type, organization, source) still arrives.
pub async fn publish_notify(pool: &DbPool, event: &PlatformEvent) -> Result<(), sqlx::Error> {
    let mut text = serde_json::to_string(event).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    if text.len() >= MAX_PAYLOAD_BYTES {
        tracing::warn!(
            event_type = %event.event_type,
            bytes = text.len(),
            "Event payload too large for NOTIFY, sending without payload"
        );
        let trimmed = event.clone().with_payload(serde_json::json!({}));
        text = serde_json::to_string(&trimmed).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    }
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(NOTIFY_CHANNEL)
        .bind(text)
        .execute(pool)
        .await?;
    Ok(())
}

/// Republishes `NOTIFY` payloads onto the local event bus.
pub struct NotifyRelay;

impl NotifyRelay {
    /// Open a listener subscribed to [`NOTIFY_CHANNEL`].
    ///
    /// Split from [`Self::relay`] so the subscription is in place before
    /// the caller continues.
    pub async fn listen(pool: &DbPool) -> Result<PgListener, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;
        Ok(listener)
    }

    /// Listen and relay until `cancel` fires.
    pub async fn run(
        pool: DbPool,
        bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Result<(), sqlx::Error> {
        let listener = Self::listen(&pool).await?;
        tracing::info!(channel = NOTIFY_CHANNEL, "Notify relay listening");
        Self::relay(listener, bus, cancel).await;
        Ok(())
    }

    /// Relay loop over an already-listening connection. The listener
    /// reconnects on its own after connection loss.
    pub async fn relay(mut listener: PgListener, bus: Arc<EventBus>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notify relay stopping");
                    break;
                }
                received = listener.recv() => match received {
                    Ok(notification) => {
                        match serde_json::from_str::<PlatformEvent>(notification.payload()) {
                            Ok(event) => {
                                bus.publish(event);
                            }
                            Err(e) => tracing::warn!(
                                error = %e,
                                "Ignoring malformed notify payload"
                            ),
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Notify listener error");
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }
}
