use std::sync::Arc;

use pumpflix_core::crypto::CredentialCipher;
use pumpflix_events::EventBus;

use crate::config::ServerConfig;
use crate::middleware::metrics::RequestMetrics;
use crate::payments::PaymentProvider;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything non-trivial sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub pool: pumpflix_db::DbPool,
    pub config: Arc<ServerConfig>,
    pub ws_manager: Arc<WsManager>,
    pub event_bus: Arc<EventBus>,
    /// Encrypts integration credential secrets at rest.
    pub cipher: Arc<CredentialCipher>,
    pub payments: Arc<dyn PaymentProvider>,
    pub metrics: Arc<RequestMetrics>,
}
