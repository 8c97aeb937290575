//! Persistence side-channel trait.
//!
//! A small expiring key/value store used for two separate things: caching the
//! rebuilt catalog, and keeping live sessions across restarts.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Namespace holding the cached catalog.
pub const CATALOG_NAMESPACE: &str = "idolbracket:idols";
/// Namespace holding live session snapshots.
pub const SESSION_NAMESPACE: &str = "idolbracket:games";

pub const CATALOG_KEY: &str = "allidols";
pub const SINGLE_SESSIONS_KEY: &str = "currentSinglePlayerGames";
pub const MULTI_SESSIONS_KEY: &str = "currentMultiPlayerGames";

/// Builds the full key for `key` inside `namespace`.
pub fn namespaced(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}

#[async_trait]
pub trait PersistenceSideChannel: Send + Sync {
    /// Reads a value.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))`: Value present and not expired
    /// - `Ok(None)`: Miss
    /// - `Err(_)`: The side-channel is unavailable
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a value. `ttl` of `None` keeps it until overwritten or deleted.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}
