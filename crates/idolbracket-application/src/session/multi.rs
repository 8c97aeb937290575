use super::vote_resolver::{LoopExit, VoteResolver};
use crate::catalog::CatalogCache;
use crate::registry::{GameRegistry, MultiEntry};
use idolbracket_core::config::GameConfig;
use idolbracket_core::error::{BracketError, Result};
use idolbracket_core::idol::GenderFilter;
use idolbracket_core::session::{Bracket, ChatTransport, GameType, MultiSession};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Runs channel-wide brackets, one round loop task per channel.
pub struct MultiPlayerService {
    registry: Arc<GameRegistry>,
    catalog: Arc<CatalogCache>,
    resolver: Arc<VoteResolver>,
    transport: Arc<dyn ChatTransport>,
    config: Arc<GameConfig>,
}

impl MultiPlayerService {
    pub fn new(
        registry: Arc<GameRegistry>,
        catalog: Arc<CatalogCache>,
        resolver: Arc<VoteResolver>,
        transport: Arc<dyn ChatTransport>,
        config: Arc<GameConfig>,
    ) -> Self {
        Self {
            registry,
            catalog,
            resolver,
            transport,
            config,
        }
    }

    /// Starts a bracket for the whole channel and spawns its round loop.
    ///
    /// # Errors
    ///
    /// - `InvalidGameSize` if `size` is not allowed for multiplayer
    /// - `InsufficientContestants` if the filtered catalog is too small
    /// - `GameAlreadyRunning` if the channel already has a game
    pub async fn start(
        &self,
        channel_id: &str,
        gender: Option<GenderFilter>,
        size: Option<usize>,
    ) -> Result<(MultiEntry, JoinHandle<LoopExit>)> {
        let gender = gender.unwrap_or(self.config.default_gender);
        let size = self
            .config
            .validate_size(GameType::Multi, size.unwrap_or(self.config.default_game_size))?;
        if self.registry.multi(channel_id).await.is_some() {
            return Err(BracketError::GameAlreadyRunning(channel_id.to_string()));
        }

        let pool = self.catalog.pool(gender).await;
        let bracket = Bracket::draw(&pool, size, &mut rand::thread_rng())?;
        let session = MultiSession::new(channel_id, gender, bracket, self.config.multi_round_delay());
        let entry = self.registry.insert_multi(session).await?;

        tracing::info!(channel_id, %gender, size, "Started multiplayer bracket");
        let handle = self.resolver.spawn(entry.clone());
        Ok((entry, handle))
    }

    /// Spawns round loops for sessions brought back by a restore.
    pub fn resume(&self, entries: Vec<MultiEntry>) -> Vec<JoinHandle<LoopExit>> {
        entries
            .into_iter()
            .map(|entry| {
                tracing::info!(channel_id = %entry.channel_id, "Resuming multiplayer bracket");
                self.resolver.spawn(entry)
            })
            .collect()
    }

    /// Ends the channel's bracket without a result. Returns `false` if none was live.
    pub async fn abort(&self, channel_id: &str) -> bool {
        let Some(entry) = self.registry.remove_multi(channel_id).await else {
            return false;
        };
        let message = entry.session.lock().await.round_message.take();
        if let Some(message) = message {
            if let Err(e) = self.transport.dismiss(&message).await {
                tracing::warn!(channel_id, "Failed to dismiss round message: {}", e);
            }
        }
        tracing::info!(channel_id, "Multiplayer bracket aborted");
        true
    }

    pub async fn current(&self, channel_id: &str) -> Option<MultiSession> {
        let entry = self.registry.multi(channel_id).await?;
        let session = entry.session.lock().await.clone();
        Some(session)
    }
}
