//! Process-level wiring of the bracket game.
//!
//! `BracketGame` owns the catalog, the registry and the background loops, and is
//! the object a hosting process injects into its command and reaction handlers.

use crate::catalog::{CatalogCache, RefreshReport, spawn_refresh_loop};
use crate::persistence::{PersistenceLoop, SnapshotReport};
use crate::registry::GameRegistry;
use crate::session::{LoopExit, MultiPlayerService, SinglePlayerService, StartedGame, VoteOutcome, VoteResolver};
use idolbracket_core::config::GameConfig;
use idolbracket_core::error::{BracketError, Result};
use idolbracket_core::idol::{CatalogStore, GenderFilter, ImageResolver};
use idolbracket_core::session::{ChatTransport, MessageHandle, MultiSession, RoundSlot, SingleSession, StatsRecorder};
use idolbracket_core::side_channel::PersistenceSideChannel;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// External collaborators the game runs against.
pub struct GameDependencies {
    pub catalog_store: Arc<dyn CatalogStore>,
    pub image_resolver: Arc<dyn ImageResolver>,
    pub side_channel: Arc<dyn PersistenceSideChannel>,
    pub transport: Arc<dyn ChatTransport>,
    pub stats: Arc<dyn StatsRecorder>,
}

pub struct BracketGame {
    config: Arc<GameConfig>,
    catalog: Arc<CatalogCache>,
    registry: Arc<GameRegistry>,
    singles: SinglePlayerService,
    multis: MultiPlayerService,
    persistence: Arc<PersistenceLoop>,
    ready: AtomicBool,
    /// Stops the refresh and snapshot loops.
    loops: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
    round_loops: Mutex<Vec<JoinHandle<LoopExit>>>,
}

impl BracketGame {
    /// Wires the game together. Nothing runs until [`BracketGame::start`].
    pub fn new(config: GameConfig, deps: GameDependencies) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let registry = Arc::new(GameRegistry::new(CancellationToken::new()));
        let catalog = Arc::new(CatalogCache::new(
            deps.catalog_store,
            deps.image_resolver,
            deps.side_channel.clone(),
            config.rebuild_worker_cap,
            config.catalog_ttl(),
        ));
        let resolver = Arc::new(VoteResolver::new(
            registry.clone(),
            catalog.clone(),
            deps.transport.clone(),
            deps.stats.clone(),
            config.clone(),
        ));
        let singles = SinglePlayerService::new(
            registry.clone(),
            catalog.clone(),
            deps.transport.clone(),
            deps.stats,
            config.clone(),
        );
        let multis = MultiPlayerService::new(
            registry.clone(),
            catalog.clone(),
            resolver,
            deps.transport,
            config.clone(),
        );
        let persistence = Arc::new(PersistenceLoop::new(registry.clone(), deps.side_channel));

        Ok(Self {
            config,
            catalog,
            registry,
            singles,
            multis,
            persistence,
            ready: AtomicBool::new(false),
            loops: CancellationToken::new(),
            background: Mutex::new(Vec::new()),
            round_loops: Mutex::new(Vec::new()),
        })
    }

    /// Loads the catalog, restores and resumes persisted sessions, and starts the
    /// refresh and snapshot loops. Commands are accepted afterwards.
    pub async fn start(&self) -> Result<()> {
        if let Err(e) = self.catalog.refresh(false).await {
            tracing::error!("Initial catalog load failed: {}", e);
        }

        let restored = self.persistence.restore().await;
        let resumed = self.multis.resume(restored.multis);
        self.round_loops.lock().await.extend(resumed);

        {
            let mut background = self.background.lock().await;
            background.push(spawn_refresh_loop(
                self.catalog.clone(),
                self.config.catalog_refresh_interval(),
                self.loops.child_token(),
            ));
            background.push(
                self.persistence
                    .spawn(self.config.session_snapshot_interval(), self.loops.child_token()),
            );
        }

        self.ready.store(true, Ordering::SeqCst);
        tracing::info!(idols = self.catalog.len().await, "Bracket game is ready");
        Ok(())
    }

    /// Stops every loop and writes the final session snapshot.
    pub async fn shutdown(&self) -> Result<SnapshotReport> {
        self.ready.store(false, Ordering::SeqCst);
        self.loops.cancel();
        self.registry.shutdown();

        let background: Vec<_> = self.background.lock().await.drain(..).collect();
        for handle in background {
            if let Err(e) = handle.await {
                tracing::warn!("Background loop ended abnormally: {}", e);
            }
        }
        let round_loops: Vec<_> = self.round_loops.lock().await.drain(..).collect();
        for handle in round_loops {
            if let Err(e) = handle.await {
                tracing::warn!("Round loop ended abnormally: {}", e);
            }
        }

        let report = self.persistence.snapshot().await.map_err(|e| {
            tracing::error!("Final session snapshot failed: {}", e);
            e
        })?;
        tracing::info!("stored {} singleplayer games on shutdown", report.singles);
        tracing::info!("stored {} multiplayer games on shutdown", report.multis);
        Ok(report)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(BracketError::NotReady)
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<GameRegistry> {
        &self.registry
    }

    // ============================================================================
    // Commands
    // ============================================================================

    pub async fn start_single(
        &self,
        user_id: &str,
        channel_id: &str,
        gender: Option<GenderFilter>,
        size: Option<usize>,
    ) -> Result<StartedGame> {
        self.ensure_ready()?;
        self.singles.start(user_id, channel_id, gender, size).await
    }

    /// Routes a reaction to the reacting user's single-player game.
    pub async fn vote_single(&self, user_id: &str, message: &MessageHandle, slot: RoundSlot) -> Result<VoteOutcome> {
        if !self.is_ready() {
            return Ok(VoteOutcome::Ignored);
        }
        self.singles.handle_vote(user_id, message, slot).await
    }

    /// Ends the user's game. `NotFound` if the user has none.
    pub async fn abort_single(&self, user_id: &str) -> Result<()> {
        self.ensure_ready()?;
        if self.singles.abort(user_id).await {
            Ok(())
        } else {
            Err(BracketError::not_found("singleplayer game", user_id))
        }
    }

    pub async fn current_single(&self, user_id: &str) -> Option<SingleSession> {
        self.singles.current(user_id).await
    }

    pub async fn start_multi(&self, channel_id: &str, gender: Option<GenderFilter>, size: Option<usize>) -> Result<()> {
        self.ensure_ready()?;
        let (_, handle) = self.multis.start(channel_id, gender, size).await?;
        let mut round_loops = self.round_loops.lock().await;
        round_loops.retain(|h| !h.is_finished());
        round_loops.push(handle);
        Ok(())
    }

    /// Ends the channel's game. `NotFound` if the channel has none.
    pub async fn abort_multi(&self, channel_id: &str) -> Result<()> {
        self.ensure_ready()?;
        if self.multis.abort(channel_id).await {
            Ok(())
        } else {
            Err(BracketError::not_found("multiplayer game", channel_id))
        }
    }

    pub async fn current_multi(&self, channel_id: &str) -> Option<MultiSession> {
        self.multis.current(channel_id).await
    }

    /// Rebuilds the catalog from the store right away.
    pub async fn refresh_catalog(&self) -> Result<RefreshReport> {
        self.catalog.refresh(true).await
    }
}
