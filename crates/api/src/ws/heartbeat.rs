//! Keeps idle sockets open through proxies and clears out connections
//! whose socket task has already gone away.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

pub const PING_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run(ws_manager: Arc<WsManager>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(PING_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let (pinged, reaped) = ws_manager.ping_and_reap().await;
                if reaped.is_empty() {
                    tracing::trace!(pinged, "WebSocket ping");
                } else {
                    tracing::debug!(pinged, reaped = ?reaped, "Dropped dead WebSocket connections");
                }
            }
        }
    }
}
