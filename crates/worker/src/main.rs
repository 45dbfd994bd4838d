use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pumpflix_worker::config::WorkerConfig;
use pumpflix_worker::runner::JobRunner;
use pumpflix_worker::scheduler::Scheduler;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    init_tracing();

    let config = WorkerConfig::from_env();
    tracing::info!(
        worker_name = %config.worker_name,
        concurrency = config.concurrency,
        "Loaded worker configuration"
    );

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = pumpflix_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    pumpflix_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection pool created");

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    for n in 0..config.concurrency {
        let runner = JobRunner::new(
            pool.clone(),
            format!("{}-{n}", config.worker_name),
            config.poll_interval,
        );
        let cancel = cancel.clone();
        tasks.spawn(async move { runner.run(cancel).await });
    }

    let scheduler = Scheduler::new(
        pool.clone(),
        config.stale_after_secs,
        config.usage_check_interval,
    );
    tasks.spawn(scheduler.run(config.scheduler_interval, cancel.clone()));

    tracing::info!(runners = config.concurrency, "Worker started");

    shutdown_signal().await;
    cancel.cancel();

    let drained = tokio::time::timeout(config.shutdown_timeout, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    match drained {
        Ok(()) => tracing::info!("Graceful shutdown complete"),
        Err(_) => {
            tracing::warn!(
                timeout_secs = config.shutdown_timeout.as_secs(),
                "Jobs still running at shutdown timeout, aborting"
            );
            tasks.shutdown().await;
        }
    }
    pool.close().await;
}

/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pumpflix_worker=debug,pumpflix_events=info".into());
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
        () = ctrl_c => tracing::info!("Received SIGINT, stopping worker"),
        () = terminate => tracing::info!("Received SIGTERM, stopping worker"),
    }
}
