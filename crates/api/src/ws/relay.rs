//! Forwards bus events to subscribed WebSocket clients.

use std::sync::Arc;

use axum::extract::ws::Message;
use pumpflix_events::PlatformEvent;
use serde_json::json;
use tokio::sync::broadcast;

use crate::ws::manager::WsManager;

/// Run until the event bus closes.
pub async fn run(ws_manager: Arc<WsManager>, mut receiver: broadcast::Receiver<PlatformEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                let delivered = forward(&ws_manager, &event).await;
                if delivered > 0 {
                    tracing::trace!(event_type = %event.event_type, delivered, "Event forwarded");
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "WebSocket relay lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Event bus closed, WebSocket relay shutting down");
                break;
            }
        }
    }
}

/// Deliver one event; returns how many connections received it.
pub async fn forward(ws_manager: &WsManager, event: &PlatformEvent) -> usize {
    let channels: Vec<String> = event.channels().iter().map(ToString::to_string).collect();
    ws_manager
        .publish(&channels, |channel| {
            let body = json!({
                "type": "event",
                "channel": channel,
                "event_type": event.event_type,
                "source_entity_type": event.source_entity_type,
                "source_entity_id": event.source_entity_id,
                "payload": event.payload,
                "timestamp": event.timestamp,
            });
            Message::Text(body.to_string().into())
        })
        .await
}
