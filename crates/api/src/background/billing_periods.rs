//! Rolls free-plan subscriptions into their next monthly period so
//! per-period execution counters reset without a provider.

use std::time::Duration;

use pumpflix_db::repositories::SubscriptionRepo;
use pumpflix_db::DbPool;
use tokio_util::sync::CancellationToken;

const ROLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

pub async fn run(pool: DbPool, cancel: CancellationToken) {
    tracing::info!(interval_secs = ROLL_INTERVAL.as_secs(), "Billing period job started");
    let mut interval = tokio::time::interval(ROLL_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Billing period job stopping");
                break;
            }
            _ = interval.tick() => {
                match SubscriptionRepo::roll_free_periods(&pool).await {
                    Ok(0) => {}
                    Ok(rolled) => tracing::info!(rolled, "Rolled free subscriptions into a new period"),
                    Err(e) => tracing::error!(error = %e, "Billing period roll failed"),
                }
            }
        }
    }
}
