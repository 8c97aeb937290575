//! Live session registry.
//!
//! Single-player sessions are kept in a map keyed by user id, multiplayer sessions
//! in a list searched by channel id. Each collection has its own lock. Entries are
//! shared handles: re-fetch after any await point before acting on a session that
//! may have been replaced or removed concurrently.

use idolbracket_core::error::{BracketError, Result};
use idolbracket_core::session::{MultiSession, SingleSession};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

pub type SharedSingle = Arc<Mutex<SingleSession>>;

/// A live multiplayer session and the token that stops its round loop.
#[derive(Clone, Debug)]
pub struct MultiEntry {
    pub session: Arc<Mutex<MultiSession>>,
    pub channel_id: String,
    pub cancel: CancellationToken,
}

impl MultiEntry {
    pub fn same_as(&self, other: &MultiEntry) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }
}

pub struct GameRegistry {
    singles: RwLock<HashMap<String, SharedSingle>>,
    multis: RwLock<Vec<MultiEntry>>,
    /// Parent of every round loop token; cancelled on teardown.
    shutdown: CancellationToken,
}

impl GameRegistry {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            singles: RwLock::new(HashMap::new()),
            multis: RwLock::new(Vec::new()),
            shutdown,
        }
    }

    // ============================================================================
    // Single-player sessions
    // ============================================================================

    pub async fn single(&self, user_id: &str) -> Option<SharedSingle> {
        self.singles.read().await.get(user_id).cloned()
    }

    /// Returns the live session for `user_id`, or inserts the one built by `create`.
    ///
    /// The lookup and the insert happen under one write lock, so two concurrent
    /// start requests for the same user end up with the same session. The flag is
    /// `true` when a session was created.
    pub async fn single_or_insert_with<F>(&self, user_id: &str, create: F) -> Result<(SharedSingle, bool)>
    where
        F: FnOnce() -> Result<SingleSession>,
    {
        let mut singles = self.singles.write().await;
        if let Some(existing) = singles.get(user_id) {
            return Ok((existing.clone(), false));
        }
        let session = Arc::new(Mutex::new(create()?));
        singles.insert(user_id.to_string(), session.clone());
        Ok((session, true))
    }

    pub async fn upsert_single(&self, session: SingleSession) -> SharedSingle {
        let user_id = session.user_id.clone();
        let shared = Arc::new(Mutex::new(session));
        self.singles.write().await.insert(user_id, shared.clone());
        shared
    }

    pub async fn remove_single(&self, user_id: &str) -> Option<SharedSingle> {
        self.singles.write().await.remove(user_id)
    }

    /// Removes `session` only if it is still the live entry for `user_id`.
    pub async fn remove_single_if_current(&self, user_id: &str, session: &SharedSingle) -> bool {
        let mut singles = self.singles.write().await;
        match singles.get(user_id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                singles.remove(user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn single_count(&self) -> usize {
        self.singles.read().await.len()
    }

    pub async fn snapshot_singles(&self) -> HashMap<String, SingleSession> {
        let handles: Vec<(String, SharedSingle)> = self
            .singles
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut out = HashMap::with_capacity(handles.len());
        for (user_id, handle) in handles {
            out.insert(user_id, handle.lock().await.clone());
        }
        out
    }

    // ============================================================================
    // Multiplayer sessions
    // ============================================================================

    pub async fn multi(&self, channel_id: &str) -> Option<MultiEntry> {
        self.multis
            .read()
            .await
            .iter()
            .find(|entry| entry.channel_id == channel_id)
            .cloned()
    }

    /// Registers a multiplayer session.
    ///
    /// # Errors
    ///
    /// `GameAlreadyRunning` if the channel already has a live session.
    pub async fn insert_multi(&self, session: MultiSession) -> Result<MultiEntry> {
        let mut multis = self.multis.write().await;
        if multis.iter().any(|entry| entry.channel_id == session.channel_id) {
            return Err(BracketError::GameAlreadyRunning(session.channel_id));
        }
        let entry = MultiEntry {
            channel_id: session.channel_id.clone(),
            session: Arc::new(Mutex::new(session)),
            cancel: self.shutdown.child_token(),
        };
        multis.push(entry.clone());
        Ok(entry)
    }

    /// Whether `entry` is still registered.
    pub async fn contains_multi(&self, entry: &MultiEntry) -> bool {
        self.multis.read().await.iter().any(|live| live.same_as(entry))
    }

    /// Removes the session for `channel_id` and cancels its round loop.
    pub async fn remove_multi(&self, channel_id: &str) -> Option<MultiEntry> {
        let mut multis = self.multis.write().await;
        let index = multis.iter().position(|entry| entry.channel_id == channel_id)?;
        let entry = multis.remove(index);
        entry.cancel.cancel();
        Some(entry)
    }

    /// Removes `entry` if it is still registered and cancels its round loop.
    pub async fn remove_multi_entry(&self, entry: &MultiEntry) -> bool {
        let mut multis = self.multis.write().await;
        let before = multis.len();
        multis.retain(|live| !live.same_as(entry));
        entry.cancel.cancel();
        multis.len() != before
    }

    pub async fn multi_entries(&self) -> Vec<MultiEntry> {
        self.multis.read().await.clone()
    }

    pub async fn multi_count(&self) -> usize {
        self.multis.read().await.len()
    }

    pub async fn snapshot_multis(&self) -> Vec<MultiSession> {
        let entries = self.multi_entries().await;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(entry.session.lock().await.clone());
        }
        out
    }

    // ============================================================================
    // Lifecycle
    // ============================================================================

    /// Loads restored sessions, skipping keys that are already live.
    ///
    /// Returns the newly registered multiplayer entries so their round loops can
    /// be resumed.
    pub async fn restore(
        &self,
        singles: HashMap<String, SingleSession>,
        multis: Vec<MultiSession>,
    ) -> (usize, Vec<MultiEntry>) {
        let mut restored_singles = 0;
        {
            let mut live = self.singles.write().await;
            for (user_id, session) in singles {
                if session.bracket.is_terminal() || live.contains_key(&user_id) {
                    continue;
                }
                live.insert(user_id, Arc::new(Mutex::new(session)));
                restored_singles += 1;
            }
        }

        let mut entries = Vec::new();
        for session in multis {
            if session.bracket.is_terminal() {
                continue;
            }
            match self.insert_multi(session).await {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping restored multiplayer game: {}", e),
            }
        }
        (restored_singles, entries)
    }

    /// Cancels every round loop. Sessions stay registered for the final snapshot.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::bracket;
    use idolbracket_core::idol::GenderFilter;
    use std::time::Duration;

    fn single(user_id: &str) -> SingleSession {
        SingleSession::new(user_id, "C1", GenderFilter::Girl, bracket(4))
    }

    fn multi(channel_id: &str) -> MultiSession {
        MultiSession::new(channel_id, GenderFilter::Girl, bracket(4), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_single_or_insert_returns_existing() {
        let registry = GameRegistry::default();
        let (first, created) = registry.single_or_insert_with("U1", || Ok(single("U1"))).await.unwrap();
        assert!(created);

        let (second, created) = registry
            .single_or_insert_with("U1", || panic!("must not create a duplicate"))
            .await
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.single_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_create_inserts_nothing() {
        let registry = GameRegistry::default();
        let result = registry
            .single_or_insert_with("U1", || Err(BracketError::InvalidGameSize(3)))
            .await;
        assert!(result.is_err());
        assert!(registry.single("U1").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_single_if_current_ignores_replaced_session() {
        let registry = GameRegistry::default();
        let old = registry.upsert_single(single("U1")).await;
        let new = registry.upsert_single(single("U1")).await;

        assert!(!registry.remove_single_if_current("U1", &old).await);
        assert!(registry.remove_single_if_current("U1", &new).await);
        assert!(registry.single("U1").await.is_none());
    }

    #[tokio::test]
    async fn test_one_multi_per_channel() {
        let registry = GameRegistry::default();
        registry.insert_multi(multi("C1")).await.unwrap();
        let err = registry.insert_multi(multi("C1")).await.unwrap_err();
        assert_eq!(err, BracketError::GameAlreadyRunning("C1".to_string()));
        registry.insert_multi(multi("C2")).await.unwrap();
        assert_eq!(registry.multi_count().await, 2);
    }

    #[tokio::test]
    async fn test_remove_multi_cancels_token() {
        let registry = GameRegistry::default();
        let entry = registry.insert_multi(multi("C1")).await.unwrap();
        assert!(registry.contains_multi(&entry).await);

        registry.remove_multi("C1").await.unwrap();
        assert!(entry.cancel.is_cancelled());
        assert!(!registry.contains_multi(&entry).await);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_children_but_keeps_sessions() {
        let registry = GameRegistry::default();
        let entry = registry.insert_multi(multi("C1")).await.unwrap();
        registry.shutdown();
        assert!(entry.cancel.is_cancelled());
        assert_eq!(registry.snapshot_multis().await.len(), 1);
    }

    #[tokio::test]
    async fn test_restore_skips_live_and_terminal() {
        let registry = GameRegistry::default();
        registry.upsert_single(single("U1")).await;

        let mut finished = single("U3");
        while !finished.bracket.is_terminal() {
            finished
                .bracket
                .advance_round(idolbracket_core::session::RoundSlot::Left)
                .unwrap();
        }
        let singles = HashMap::from([
            ("U1".to_string(), single("U1")),
            ("U2".to_string(), single("U2")),
            ("U3".to_string(), finished),
        ]);
        let (restored, entries) = registry.restore(singles, vec![multi("C1")]).await;

        assert_eq!(restored, 1);
        assert_eq!(entries.len(), 1);
        assert_eq!(registry.single_count().await, 2);
    }
}
