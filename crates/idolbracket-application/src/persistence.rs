//! Crash recovery for live sessions.
//!
//! Both registry collections are written to the side-channel on a timer and once
//! more at shutdown, and read back at startup. Side-channel failures are logged;
//! they only weaken recovery, never live play.

use crate::registry::{GameRegistry, MultiEntry};
use idolbracket_core::error::Result;
use idolbracket_core::session::{MultiSession, SingleSession};
use idolbracket_core::side_channel::{
    MULTI_SESSIONS_KEY, PersistenceSideChannel, SESSION_NAMESPACE, SINGLE_SESSIONS_KEY, namespaced,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Counts of sessions written by one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotReport {
    pub singles: usize,
    pub multis: usize,
}

/// Sessions brought back at startup.
pub struct RestoredSessions {
    pub singles: usize,
    /// Multiplayer entries whose round loops must be resumed.
    pub multis: Vec<MultiEntry>,
}

pub struct PersistenceLoop {
    registry: Arc<GameRegistry>,
    side_channel: Arc<dyn PersistenceSideChannel>,
}

impl PersistenceLoop {
    pub fn new(registry: Arc<GameRegistry>, side_channel: Arc<dyn PersistenceSideChannel>) -> Self {
        Self {
            registry,
            side_channel,
        }
    }

    /// Writes both collections to the side-channel.
    ///
    /// # Errors
    ///
    /// `PersistenceUnavailable` or `Serialization` when a write fails; the
    /// registry is left untouched either way.
    pub async fn snapshot(&self) -> Result<SnapshotReport> {
        let singles = self.registry.snapshot_singles().await;
        let multis = self.registry.snapshot_multis().await;

        let single_bytes = serde_json::to_vec(&singles)?;
        let multi_bytes = serde_json::to_vec(&multis)?;

        self.side_channel
            .set(&namespaced(SESSION_NAMESPACE, SINGLE_SESSIONS_KEY), single_bytes, None)
            .await?;
        self.side_channel
            .set(&namespaced(SESSION_NAMESPACE, MULTI_SESSIONS_KEY), multi_bytes, None)
            .await?;

        Ok(SnapshotReport {
            singles: singles.len(),
            multis: multis.len(),
        })
    }

    /// Loads persisted sessions into the registry.
    ///
    /// A collection that is missing, unreadable or corrupt is skipped with a
    /// warning; the other one is still restored.
    pub async fn restore(&self) -> RestoredSessions {
        let singles: HashMap<String, SingleSession> = self.load(SINGLE_SESSIONS_KEY).await.unwrap_or_default();
        let multis: Vec<MultiSession> = self.load(MULTI_SESSIONS_KEY).await.unwrap_or_default();

        let (restored_singles, entries) = self.registry.restore(singles, multis).await;
        tracing::info!("restored {} singleplayer games on launch", restored_singles);
        tracing::info!("restored {} multiplayer games on launch", entries.len());

        RestoredSessions {
            singles: restored_singles,
            multis: entries,
        }
    }

    async fn load<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = namespaced(SESSION_NAMESPACE, key);
        let bytes = match self.side_channel.get(&full_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, "Could not read persisted sessions: {}", e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, "Discarding unreadable persisted sessions: {}", e);
                None
            }
        }
    }

    /// Snapshots every `interval` until `cancel` fires.
    pub fn spawn(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                match this.snapshot().await {
                    Ok(report) => tracing::debug!(singles = report.singles, multis = report.multis, "Sessions saved"),
                    Err(e) => tracing::warn!("Session snapshot failed: {}", e),
                }
            }
        })
    }
}
