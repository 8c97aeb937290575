//! Multiplayer round resolution.
//!
//! Each multiplayer bracket runs its own loop: present the round, wait the
//! configured delay, read the vote counters once, decide. Votes that arrive after
//! the counters were read do not count for that round.

use super::round::{contestants, load_pictures, record_in_background};
use crate::catalog::CatalogCache;
use crate::registry::{GameRegistry, MultiEntry};
use idolbracket_core::config::GameConfig;
use idolbracket_core::error::{BracketError, Result};
use idolbracket_core::session::{ChatTransport, MessageHandle, RoundSlot, StatsRecorder, VoteCounts};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundDecision {
    pub winner: RoundSlot,
    /// The round was tied and settled by a coin flip.
    pub random: bool,
}

/// Majority wins; a tie is a fair coin flip.
pub fn decide_round<R: Rng>(votes: &VoteCounts, rng: &mut R) -> RoundDecision {
    if votes.left > votes.right {
        RoundDecision {
            winner: RoundSlot::Left,
            random: false,
        }
    } else if votes.left < votes.right {
        RoundDecision {
            winner: RoundSlot::Right,
            random: false,
        }
    } else {
        let winner = if rng.gen_bool(0.5) {
            RoundSlot::Right
        } else {
            RoundSlot::Left
        };
        RoundDecision { winner, random: true }
    }
}

/// Why a round loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Finished,
    /// The session was deleted or the process is shutting down.
    Cancelled,
    /// The transport or the bracket failed for good; the session was ended.
    Failed(BracketError),
}

enum Step {
    Continue,
    Exit(LoopExit),
}

pub struct VoteResolver {
    registry: Arc<GameRegistry>,
    catalog: Arc<CatalogCache>,
    transport: Arc<dyn ChatTransport>,
    stats: Arc<dyn StatsRecorder>,
    config: Arc<GameConfig>,
}

impl VoteResolver {
    pub fn new(
        registry: Arc<GameRegistry>,
        catalog: Arc<CatalogCache>,
        transport: Arc<dyn ChatTransport>,
        stats: Arc<dyn StatsRecorder>,
        config: Arc<GameConfig>,
    ) -> Self {
        Self {
            registry,
            catalog,
            transport,
            stats,
            config,
        }
    }

    /// Runs the round loop for `entry` as an independent task.
    pub fn spawn(self: &Arc<Self>, entry: MultiEntry) -> JoinHandle<LoopExit> {
        let resolver = self.clone();
        tokio::spawn(async move { resolver.run(entry).await })
    }

    /// Plays rounds until the bracket finishes, the session disappears, or the
    /// transport keeps failing.
    pub async fn run(&self, entry: MultiEntry) -> LoopExit {
        let channel_id = entry.channel_id.clone();
        tracing::info!(%channel_id, "Multiplayer round loop started");
        let mut failures = 0u32;

        let exit = loop {
            if entry.cancel.is_cancelled() || !self.registry.contains_multi(&entry).await {
                break LoopExit::Cancelled;
            }
            match self.play_round(&entry).await {
                Ok(Step::Continue) => failures = 0,
                Ok(Step::Exit(exit)) => break exit,
                Err(e) if e.is_transport() => {
                    failures += 1;
                    tracing::warn!(%channel_id, failures, "Multiplayer round failed: {}", e);
                    if failures >= self.config.transport_retry_limit.max(1) {
                        self.end(&entry).await;
                        break LoopExit::Failed(e);
                    }
                    if !self.pause(&entry, self.config.multi_round_delay()).await {
                        break LoopExit::Cancelled;
                    }
                }
                Err(e) => {
                    tracing::error!(%channel_id, "Multiplayer bracket aborted: {}", e);
                    self.end(&entry).await;
                    break LoopExit::Failed(e);
                }
            }
        };

        if exit == LoopExit::Cancelled && !self.registry.is_shut_down() {
            // Aborted mid-round: clean up a round presented after the abort.
            let message = entry.session.lock().await.round_message.take();
            if let Some(message) = message {
                self.dismiss(&message).await;
            }
        }

        tracing::info!(%channel_id, ?exit, "Multiplayer round loop stopped");
        exit
    }

    async fn play_round(&self, entry: &MultiEntry) -> Result<Step> {
        let prepared = {
            let mut session = entry.session.lock().await;
            if session.bracket.is_terminal() {
                None
            } else {
                let (left, right) = contestants(&mut session.bracket)?;
                Some((
                    session.key(),
                    left,
                    right,
                    session.bracket.remaining(),
                    session.round_message.take(),
                    session.round_delay,
                ))
            }
        };
        // Restored sessions may already be decided.
        let Some((key, mut left, mut right, remaining, previous, delay)) = prepared else {
            return Ok(Step::Exit(self.finish(entry).await));
        };
        load_pictures(&self.catalog, [&mut left, &mut right]).await;

        if let Some(previous) = previous {
            self.dismiss(&previous).await;
        }
        let handle = self.transport.present_round(&key, &left, &right, remaining).await?;
        {
            let mut session = entry.session.lock().await;
            session.bracket.present()?;
            session.round_message = Some(handle.clone());
        }

        if !self.pause(entry, delay).await {
            return Ok(Step::Exit(LoopExit::Cancelled));
        }

        let votes = self.transport.read_vote_counts(&handle).await?;
        let decision = decide_round(&votes, &mut rand::thread_rng());
        tracing::debug!(
            channel_id = %entry.channel_id,
            left = votes.left,
            right = votes.right,
            random = decision.random,
            "Round decided"
        );

        if decision.random {
            if let Err(e) = self.transport.mark_random_decision(&handle, decision.winner).await {
                tracing::warn!(channel_id = %entry.channel_id, "Failed to mark random winner: {}", e);
            }
            if !self.pause(entry, self.config.tie_break_pause()).await {
                return Ok(Step::Exit(LoopExit::Cancelled));
            }
        }

        // The session may have been aborted while votes were being read.
        if entry.cancel.is_cancelled() {
            return Ok(Step::Exit(LoopExit::Cancelled));
        }

        let terminal = {
            let mut session = entry.session.lock().await;
            session.participants.extend(votes.voters);
            session.bracket.advance_round(decision.winner)?.terminal
        };

        if terminal {
            return Ok(Step::Exit(self.finish(entry).await));
        }
        Ok(Step::Continue)
    }

    async fn finish(&self, entry: &MultiEntry) -> LoopExit {
        let (key, summary, slots, message) = {
            let mut session = entry.session.lock().await;
            (
                session.key(),
                session.summary(),
                session.bracket.bracket_slots(),
                session.round_message.take(),
            )
        };
        let Some(summary) = summary else {
            self.end(entry).await;
            return LoopExit::Failed(BracketError::internal("terminal bracket without winner"));
        };

        if let Some(message) = message {
            self.dismiss(&message).await;
        }
        if let Err(e) = self.transport.announce_winner(&key, &summary, slots).await {
            tracing::warn!(channel_id = %entry.channel_id, "Failed to announce winner: {}", e);
        }
        self.registry.remove_multi_entry(entry).await;
        tracing::info!(channel_id = %entry.channel_id, winner = %summary.winner, "Multiplayer bracket finished");
        record_in_background(self.stats.clone(), summary);
        LoopExit::Finished
    }

    /// Removes the session after an unrecoverable failure.
    async fn end(&self, entry: &MultiEntry) {
        let message = entry.session.lock().await.round_message.take();
        if let Some(message) = message {
            self.dismiss(&message).await;
        }
        self.registry.remove_multi_entry(entry).await;
    }

    /// Sleeps for `duration`. Returns `false` if the session was cancelled meanwhile.
    async fn pause(&self, entry: &MultiEntry, duration: Duration) -> bool {
        tokio::select! {
            _ = entry.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn dismiss(&self, message: &MessageHandle) {
        if let Err(e) = self.transport.dismiss(message).await {
            tracing::warn!(message_id = %message.message_id, "Failed to dismiss round message: {}", e);
        }
    }
}
