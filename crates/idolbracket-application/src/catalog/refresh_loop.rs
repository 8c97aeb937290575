use super::cache::CatalogCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Rebuilds the catalog from the store every `interval` until `cancel` fires.
pub fn spawn_refresh_loop(
    catalog: Arc<CatalogCache>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tracing::info!(?interval, "Starting catalog refresh loop");
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            tracing::info!("Refreshing image cache...");
            match catalog.refresh(true).await {
                Ok(report) => tracing::info!(idols = report.idols, "Image cache has been refreshed"),
                Err(e) => tracing::error!("Scheduled catalog refresh failed: {}", e),
            }
        }
        tracing::debug!("Catalog refresh loop stopped");
    })
}
