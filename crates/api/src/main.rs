use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pumpflix_api::config::ServerConfig;
use pumpflix_api::middleware::metrics::RequestMetrics;
use pumpflix_api::payments::{NoopPaymentProvider, PaymentProvider, StripeProvider};
use pumpflix_api::{background, notifications, router, state, ws};
use pumpflix_core::crypto::CredentialCipher;
use pumpflix_db::repositories::WsSessionRepo;
use pumpflix_events::{EventBus, EventPersistence, NotifyRelay};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = pumpflix_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    pumpflix_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    pumpflix_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // Sessions left open by a previous process can never close on their own.
    match WsSessionRepo::close_all_open(&pool).await {
        Ok(0) => {}
        Ok(closed) => tracing::info!(closed, "Closed stale WebSocket sessions"),
        Err(e) => tracing::warn!(error = %e, "Failed to close stale WebSocket sessions"),
    }

    // --- Credential encryption ---
    let cipher = CredentialCipher::from_base64(&config.credentials_key)
        .expect("CREDENTIALS_ENCRYPTION_KEY must be a base64-encoded 32-byte key");

    // --- Payment provider ---
    let payments: Arc<dyn PaymentProvider> = match config.billing.secret_key.as_deref() {
        Some(key) => {
            tracing::info!(api_base = %config.billing.api_base, "Payment provider configured");
            Arc::new(StripeProvider::new(config.billing.api_base.clone(), key))
        }
        None => {
            tracing::warn!("No payment provider key, plan changes apply locally");
            Arc::new(NoopPaymentProvider)
        }
    };

    // --- WebSocket manager + heartbeat ---
    let cancel = CancellationToken::new();
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = tokio::spawn(ws::heartbeat::run(Arc::clone(&ws_manager), cancel.clone()));

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    // Spawn event persistence (writes all events to the database).
    let persistence_handle =
        tokio::spawn(EventPersistence::run(pool.clone(), event_bus.subscribe()));

    // Spawn WebSocket relay (fans events out to subscribed channels).
    let relay_handle = tokio::spawn(ws::relay::run(
        Arc::clone(&ws_manager),
        event_bus.subscribe(),
    ));

    // Spawn notification router (stores notifications, pushes to users).
    let notification_router =
        notifications::NotificationRouter::new(pool.clone(), Arc::clone(&ws_manager));
    let router_handle = tokio::spawn(notification_router.run(event_bus.subscribe()));

    // Spawn the Postgres NOTIFY relay (worker events onto the local bus).
    let notify_handle = {
        let pool = pool.clone();
        let bus = Arc::clone(&event_bus);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = NotifyRelay::run(pool, bus, cancel).await {
                tracing::error!(error = %e, "Notify relay failed to start");
            }
        })
    };

    // Spawn periodic maintenance.
    let cleanup_handle = tokio::spawn(background::session_cleanup::run(
        pool.clone(),
        cancel.clone(),
    ));
    let billing_handle = tokio::spawn(background::billing_periods::run(
        pool.clone(),
        cancel.clone(),
    ));

    tracing::info!("Event services started (persistence, relays, notification router)");

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
        cipher: Arc::new(cipher),
        payments,
        metrics: Arc::new(RequestMetrics::new()),
    };

    let app = router::build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let drain = Duration::from_secs(config.shutdown_timeout_secs);

    cancel.cancel();
    for handle in [heartbeat_handle, notify_handle, cleanup_handle, billing_handle] {
        let _ = tokio::time::timeout(drain, handle).await;
    }
    tracing::info!("Background tasks stopped");

    // Dropping the last sender closes the broadcast channel, which ends
    // persistence, the relay and the notification router. The router
    // state holds no clone any more once `serve` returns.
    drop(event_bus);
    for handle in [persistence_handle, relay_handle, router_handle] {
        let _ = tokio::time::timeout(drain, handle).await;
    }
    tracing::info!("Event services shut down");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pumpflix_api=debug,pumpflix_events=info,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
