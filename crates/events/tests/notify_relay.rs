//! Round trip: worker-side `publish_notify` to API-side bus subscriber.

use std::sync::Arc;
use std::time::Duration;

use pumpflix_events::event_types::{ENTITY_EXECUTION, EXECUTION_SUCCEEDED};
use pumpflix_events::{publish_notify, EventBus, EventPersistence, NotifyRelay, PlatformEvent};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_notify_reaches_bus(pool: PgPool) {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let cancel = CancellationToken::new();

    let listener = NotifyRelay::listen(&pool).await.unwrap();
    let relay = tokio::spawn(NotifyRelay::relay(listener, Arc::clone(&bus), cancel.clone()));

    let event = PlatformEvent::new(EXECUTION_SUCCEEDED)
        .with_organization(1)
        .with_source(ENTITY_EXECUTION, 10)
        .with_payload(serde_json::json!({ "workflow_id": 4 }));
    publish_notify(&pool, &event).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("relay should forward within 5s")
        .unwrap();
    assert_eq!(received, event);

    cancel.cancel();
    relay.await.unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_oversized_payload_is_dropped_not_rejected(pool: PgPool) {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let cancel = CancellationToken::new();

    let listener = NotifyRelay::listen(&pool).await.unwrap();
    let relay = tokio::spawn(NotifyRelay::relay(listener, Arc::clone(&bus), cancel.clone()));

    let big = "x".repeat(10_000);
    let event = PlatformEvent::new(EXECUTION_SUCCEEDED)
        .with_organization(1)
        .with_payload(serde_json::json!({ "blob": big }));
    publish_notify(&pool, &event).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.event_type, EXECUTION_SUCCEEDED);
    assert!(received.payload.get("blob").is_none());

    cancel.cancel();
    relay.await.unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_persist_writes_event_row(pool: PgPool) {
    let event = PlatformEvent::new("test.persisted").with_payload(serde_json::json!({ "k": 1 }));
    let id = EventPersistence::persist(&pool, &event).await.unwrap();

    let (event_type, payload): (String, serde_json::Value) =
        sqlx::query_as("SELECT event_type, payload FROM events WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(event_type, "test.persisted");
    assert_eq!(payload["k"], 1);
}
