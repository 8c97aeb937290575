use super::rebuild::{fetch_failure, rebuild};
use idolbracket_core::error::Result;
use idolbracket_core::idol::{CatalogStore, GenderFilter, Idol, IdolImage, IdolKey, ImageResolver};
use idolbracket_core::side_channel::{CATALOG_KEY, CATALOG_NAMESPACE, PersistenceSideChannel, namespaced};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Published, read-only view of every idol.
pub type CatalogSnapshot = Arc<Vec<Arc<Idol>>>;

/// Where a refresh got its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSource {
    SideChannel,
    Store,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub source: RefreshSource,
    pub idols: usize,
    pub failed_rows: usize,
}

/// In-memory catalog of idols.
///
/// Sessions hold their own `Arc<Idol>` references, so publishing a new snapshot
/// only changes what future draws see.
pub struct CatalogCache {
    snapshot: RwLock<CatalogSnapshot>,
    store: Arc<dyn CatalogStore>,
    resolver: Arc<dyn ImageResolver>,
    side_channel: Arc<dyn PersistenceSideChannel>,
    worker_cap: usize,
    ttl: Duration,
}

impl CatalogCache {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        resolver: Arc<dyn ImageResolver>,
        side_channel: Arc<dyn PersistenceSideChannel>,
        worker_cap: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Vec::new())),
            store,
            resolver,
            side_channel,
            worker_cap,
            ttl,
        }
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.snapshot.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshot.read().await.is_empty()
    }

    /// Idols admitted by `filter`.
    pub async fn pool(&self, filter: GenderFilter) -> Vec<Arc<Idol>> {
        let snapshot = self.snapshot().await;
        snapshot.iter().filter(|idol| filter.admits(idol.gender)).cloned().collect()
    }

    pub async fn get(&self, key: &IdolKey) -> Option<Arc<Idol>> {
        let snapshot = self.snapshot().await;
        snapshot.iter().find(|idol| &idol.key() == key).cloned()
    }

    /// Loose lookup by group and name as typed by a participant.
    pub async fn find(&self, group: &str, name: &str) -> Option<Arc<Idol>> {
        let snapshot = self.snapshot().await;
        snapshot.iter().find(|idol| idol.matches(group, name)).cloned()
    }

    /// Bytes of `image`, resolved on first use.
    ///
    /// A catalog hydrated from the side-channel carries only image references.
    /// Resolved bytes are stored on the image itself, so every session sharing the
    /// idol sees them.
    pub async fn image_bytes(&self, image: &IdolImage) -> Result<Arc<[u8]>> {
        if let Some(bytes) = image.bytes() {
            return Ok(bytes);
        }
        let bytes = self.resolver.resolve(&image.object_name).await?;
        Ok(image.set_bytes(bytes))
    }

    /// Replaces the published snapshot in one step.
    pub async fn publish(&self, idols: Vec<Idol>) {
        let next: CatalogSnapshot = Arc::new(idols.into_iter().map(Arc::new).collect());
        *self.snapshot.write().await = next;
    }

    /// Reloads the catalog.
    ///
    /// Unless `skip_cache` is set, a cached catalog in the side-channel is used when
    /// present. Otherwise every row is fetched from the store and rebuilt; the
    /// result is published and cached for the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns `CatalogFetch` only when the store itself cannot be read. Row-level
    /// failures and side-channel failures are logged and absorbed.
    pub async fn refresh(&self, skip_cache: bool) -> Result<RefreshReport> {
        let cache_key = namespaced(CATALOG_NAMESPACE, CATALOG_KEY);

        if !skip_cache {
            match self.load_cached(&cache_key).await {
                Ok(Some(idols)) => {
                    let count = idols.len();
                    self.publish(idols).await;
                    tracing::info!(idols = count, "Idols loaded from cache");
                    return Ok(RefreshReport {
                        source: RefreshSource::SideChannel,
                        idols: count,
                        failed_rows: 0,
                    });
                }
                Ok(None) => tracing::info!("Idols loading from store. Cache not set or expired."),
                Err(e) => tracing::warn!("Catalog cache unreadable, rebuilding from store: {}", e),
            }
        }

        let rows = self.store.fetch_all().await.map_err(fetch_failure)?;
        tracing::info!(rows = rows.len(), "Loading idols");

        let output = rebuild(rows, self.resolver.clone(), self.worker_cap).await;
        let count = output.idols.len();
        let failed_rows = output.failed;

        let encoded = if count > 0 {
            match serde_json::to_vec(&output.idols) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!("Failed to encode catalog for cache: {}", e);
                    None
                }
            }
        } else {
            None
        };

        self.publish(output.idols).await;
        tracing::info!(idols = count, failed_rows, "Amount of idols loaded");

        if let Some(bytes) = encoded {
            if let Err(e) = self.side_channel.set(&cache_key, bytes, Some(self.ttl)).await {
                tracing::warn!("Failed to cache catalog: {}", e);
            }
        }

        Ok(RefreshReport {
            source: RefreshSource::Store,
            idols: count,
            failed_rows,
        })
    }

    async fn load_cached(&self, key: &str) -> Result<Option<Vec<Idol>>> {
        let Some(bytes) = self.side_channel.get(key).await? else {
            return Ok(None);
        };
        let idols: Vec<Idol> = serde_json::from_slice(&bytes)?;
        if idols.is_empty() {
            return Ok(None);
        }
        Ok(Some(idols))
    }
}
