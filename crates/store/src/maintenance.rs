//! Periodic index persistence and expiry sweeping

use crate::store::ContentStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run one sweep and persist the index
pub async fn run_once(store: &ContentStore) {
    store.sweep_expired();
    if let Err(e) = store.save_index().await {
        warn!(error = %e, "Periodic index save failed");
    }
}

/// Sweep and persist every `interval` until `token` is cancelled, then save
/// one final time.
pub fn spawn_maintenance(
    store: Arc<ContentStore>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => run_once(&store).await,
            }
        }

        match store.close().await {
            Ok(()) => info!("Index saved on shutdown"),
            Err(e) => warn!(error = %e, "Failed to save index on shutdown"),
        }
    })
}
