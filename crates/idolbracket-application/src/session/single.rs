use super::round::{contestants, load_pictures, record_in_background};
use crate::catalog::CatalogCache;
use crate::registry::{GameRegistry, SharedSingle};
use idolbracket_core::config::GameConfig;
use idolbracket_core::error::{BracketError, Result};
use idolbracket_core::idol::GenderFilter;
use idolbracket_core::session::{
    Bracket, BracketSummary, ChatTransport, GameType, MessageHandle, RoundSlot, SingleSession, StatsRecorder,
};
use std::sync::Arc;

/// Result of a start request.
pub struct StartedGame {
    pub session: SharedSingle,
    /// `false` when the user already had a game and it was resumed.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The reaction was not a vote on the user's current round.
    Ignored,
    Advanced { remaining: usize },
    Finished(BracketSummary),
}

/// Runs single-player brackets.
///
/// There is no task per session: every vote is handled inline by the caller, with
/// the session's own lock held for the whole advance.
pub struct SinglePlayerService {
    registry: Arc<GameRegistry>,
    catalog: Arc<CatalogCache>,
    transport: Arc<dyn ChatTransport>,
    stats: Arc<dyn StatsRecorder>,
    config: Arc<GameConfig>,
}

impl SinglePlayerService {
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

    /// Starts a bracket for `user_id`, or resumes the one already running.
    ///
    /// A resumed game moves to `channel_id` and its current round is shown again.
    pub async fn start(
        &self,
        user_id: &str,
        channel_id: &str,
        gender: Option<GenderFilter>,
        size: Option<usize>,
    ) -> Result<StartedGame> {
        let gender = gender.unwrap_or(self.config.default_gender);
        let size = self
            .config
            .validate_size(GameType::Single, size.unwrap_or(self.config.default_game_size))?;
        let pool = self.catalog.pool(gender).await;

        let (shared, created) = self
            .registry
            .single_or_insert_with(user_id, || {
                let bracket = Bracket::draw(&pool, size, &mut rand::thread_rng())?;
                Ok(SingleSession::new(user_id, channel_id, gender, bracket))
            })
            .await?;

        if created {
            tracing::info!(user_id, channel_id, %gender, size, "Started single-player bracket");
        } else {
            tracing::debug!(user_id, channel_id, "Resuming single-player bracket");
        }

        {
            let mut session = shared.lock().await;
            session.channel_id = channel_id.to_string();
            self.present_with_retry(user_id, &shared, &mut session).await?;
        }

        Ok(StartedGame {
            session: shared,
            created,
        })
    }

    /// Applies a participant's pick on `message`.
    ///
    /// Reactions on anything but the current round, or arriving before that round
    /// is fully presented, are ignored.
    pub async fn handle_vote(&self, user_id: &str, message: &MessageHandle, slot: RoundSlot) -> Result<VoteOutcome> {
        let Some(shared) = self.registry.single(user_id).await else {
            return Ok(VoteOutcome::Ignored);
        };
        let mut session = shared.lock().await;

        if !session.bracket.accepts_votes() || session.round_message.as_ref() != Some(message) {
            return Ok(VoteOutcome::Ignored);
        }

        let outcome = session.bracket.advance_round(slot).map_err(|e| {
            tracing::error!(user_id, "Round advance rejected: {}", e);
            e
        })?;

        if !outcome.terminal {
            tokio::time::sleep(self.config.single_round_pause()).await;
            self.present_with_retry(user_id, &shared, &mut session).await?;
            return Ok(VoteOutcome::Advanced {
                remaining: outcome.remaining,
            });
        }

        let summary = session
            .summary()
            .ok_or_else(|| BracketError::internal("terminal bracket without winner"))?;
        if let Some(previous) = session.round_message.take() {
            self.dismiss(&previous).await;
        }
        if let Err(e) = self
            .transport
            .announce_winner(&session.key(), &summary, session.bracket.bracket_slots())
            .await
        {
            tracing::warn!(user_id, "Failed to announce winner: {}", e);
        }
        drop(session);

        self.registry.remove_single_if_current(user_id, &shared).await;
        tracing::info!(user_id, winner = %summary.winner, "Single-player bracket finished");
        record_in_background(self.stats.clone(), summary.clone());
        Ok(VoteOutcome::Finished(summary))
    }

    /// Ends the user's bracket without a result. Returns `false` if none was live.
    pub async fn abort(&self, user_id: &str) -> bool {
        let Some(shared) = self.registry.remove_single(user_id).await else {
            return false;
        };
        let previous = shared.lock().await.round_message.take();
        if let Some(previous) = previous {
            self.dismiss(&previous).await;
        }
        tracing::info!(user_id, "Single-player bracket aborted");
        true
    }

    /// Copy of the user's live session.
    pub async fn current(&self, user_id: &str) -> Option<SingleSession> {
        let shared = self.registry.single(user_id).await?;
        let session = shared.lock().await.clone();
        Some(session)
    }

    /// Presents the current round, retrying transport failures.
    ///
    /// When every attempt fails the session is ended.
    async fn present_with_retry(
        &self,
        user_id: &str,
        shared: &SharedSingle,
        session: &mut SingleSession,
    ) -> Result<MessageHandle> {
        let attempts = self.config.transport_retry_limit.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.present_round(session).await {
                Ok(handle) => return Ok(handle),
                Err(e) if e.is_transport() => {
                    tracing::warn!(user_id, attempt, "Failed to present round: {}", e);
                    last_error = Some(e);
                }
                Err(e) => {
                    tracing::error!(user_id, "Cannot present round: {}", e);
                    self.registry.remove_single_if_current(user_id, shared).await;
                    return Err(e);
                }
            }
        }
        tracing::error!(user_id, "Giving up on single-player bracket after {} attempts", attempts);
        self.registry.remove_single_if_current(user_id, shared).await;
        Err(last_error.unwrap_or_else(|| BracketError::transport("round could not be presented")))
    }

    async fn present_round(&self, session: &mut SingleSession) -> Result<MessageHandle> {
        let (mut left, mut right) = contestants(&mut session.bracket)?;
        load_pictures(&self.catalog, [&mut left, &mut right]).await;
        if let Some(previous) = session.round_message.take() {
            self.dismiss(&previous).await;
        }
        let handle = self
            .transport
            .present_round(&session.key(), &left, &right, session.bracket.remaining())
            .await?;
        session.bracket.present()?;
        session.round_message = Some(handle.clone());
        Ok(handle)
    }

    async fn dismiss(&self, message: &MessageHandle) {
        if let Err(e) = self.transport.dismiss(message).await {
            tracing::warn!(message_id = %message.message_id, "Failed to dismiss round message: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, RecordingStats, quick_config, settle};
    use idolbracket_core::session::SessionKey;

    fn service(h: &Harness) -> SinglePlayerService {
        SinglePlayerService::new(
            h.registry.clone(),
            h.catalog.clone(),
            h.transport.clone(),
            h.stats.clone(),
            h.config.clone(),
        )
    }

    fn current_handle(h: &Harness) -> MessageHandle {
        h.transport.last_round().unwrap().handle
    }

    #[tokio::test]
    async fn test_start_presents_first_round() {
        let h = Harness::new(quick_config()).await;
        let started = service(&h).start("U1", "C1", None, None).await.unwrap();

        assert!(started.created);
        let rounds = h.transport.presented();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].remaining, 32);
        assert!(rounds[0].left.starts_with("Seeded girl"));
        assert!(rounds[0].left_image.is_some());
        // The seeded catalog holds references only; bytes are resolved for the round.
        assert!(rounds[0].has_pictures);
        assert!(started.session.lock().await.bracket.accepts_votes());
    }

    #[tokio::test]
    async fn test_second_start_resumes_existing_game() {
        let h = Harness::new(quick_config()).await;
        let singles = service(&h);
        let first = singles.start("U1", "C1", None, None).await.unwrap();
        let first_message = current_handle(&h);

        let second = singles
            .start("U1", "C2", Some(GenderFilter::Boy), Some(64))
            .await
            .unwrap();

        assert!(!second.created);
        assert!(Arc::ptr_eq(&first.session, &second.session));
        assert_eq!(h.registry.single_count().await, 1);
        assert_eq!(h.transport.dismissed(), vec![first_message]);

        let session = second.session.lock().await;
        assert_eq!(session.channel_id, "C2");
        assert_eq!(session.gender, GenderFilter::Girl);
        assert_eq!(session.bracket.initial_size(), 32);
        // Same pairing, same pictures.
        let rounds = h.transport.presented();
        assert_eq!(rounds[0].left, rounds[1].left);
        assert_eq!(rounds[0].left_image, rounds[1].left_image);
    }

    #[tokio::test]
    async fn test_full_game_finishes_and_records() {
        let h = Harness::new(quick_config()).await;
        let singles = service(&h);
        singles.start("U1", "C1", Some(GenderFilter::Mixed), None).await.unwrap();

        let mut advanced = 0;
        let summary = loop {
            match singles.handle_vote("U1", &current_handle(&h), RoundSlot::Left).await.unwrap() {
                VoteOutcome::Advanced { .. } => advanced += 1,
                VoteOutcome::Finished(summary) => break summary,
                VoteOutcome::Ignored => panic!("vote on the current round was ignored"),
            }
        };

        assert_eq!(advanced, 30);
        assert_eq!(summary.round_winners.len(), 31);
        assert_eq!(summary.round_losers.len(), 31);
        assert_eq!(summary.user_id.as_deref(), Some("U1"));
        assert_eq!(summary.winner, summary.round_winners[30]);
        assert_eq!(h.registry.single_count().await, 0);
        assert_eq!(h.transport.winners(), vec![(
                SessionKey::Single {
                    user_id: "U1".to_string(),
                    channel_id: "C1".to_string()
                },
                Some(15)
            )]);

        settle().await;
        assert_eq!(h.stats.results(), vec![summary]);
    }

    #[tokio::test]
    async fn test_stats_failure_does_not_reach_the_player() {
        let mut h = Harness::new(quick_config()).await;
        h.stats = Arc::new(RecordingStats::failing());
        let singles = service(&h);
        singles.start("U1", "C1", None, None).await.unwrap();

        let mut last = VoteOutcome::Ignored;
        for _ in 0..31 {
            last = singles
                .handle_vote("U1", &current_handle(&h), RoundSlot::Right)
                .await
                .unwrap();
        }

        assert!(matches!(last, VoteOutcome::Finished(_)));
        settle().await;
        assert!(h.stats.results().is_empty());
        assert_eq!(h.registry.single_count().await, 0);
        assert_eq!(h.transport.winners().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_and_foreign_votes_are_ignored() {
        let h = Harness::new(quick_config()).await;
        let singles = service(&h);
        singles.start("U1", "C1", None, None).await.unwrap();
        let first = current_handle(&h);

        let outcome = singles.handle_vote("U1", &first, RoundSlot::Right).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Advanced { remaining: 31 });

        // The first message is no longer the current round.
        let outcome = singles.handle_vote("U1", &first, RoundSlot::Right).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Ignored);

        let outcome = singles.handle_vote("U2", &current_handle(&h), RoundSlot::Left).await.unwrap();
        assert_eq!(outcome, VoteOutcome::Ignored);
        assert_eq!(h.transport.presented().len(), 2);
    }

    #[tokio::test]
    async fn test_abort_dismisses_round() {
        let h = Harness::new(quick_config()).await;
        let singles = service(&h);
        singles.start("U1", "C1", None, None).await.unwrap();
        let handle = current_handle(&h);

        assert!(singles.abort("U1").await);
        assert!(!singles.abort("U1").await);
        assert!(singles.current("U1").await.is_none());
        assert_eq!(h.transport.dismissed(), vec![handle]);
    }

    #[tokio::test]
    async fn test_rejected_sizes_register_nothing() {
        let h = Harness::new(quick_config()).await;
        let singles = service(&h);

        let err = singles.start("U1", "C1", None, Some(33)).await.err().unwrap();
        assert_eq!(err, BracketError::InvalidGameSize(33));

        let err = singles.start("U1", "C1", None, Some(64)).await.err().unwrap();
        assert_eq!(
            err,
            BracketError::InsufficientContestants {
                available: 40,
                requested: 64
            }
        );
        assert_eq!(h.registry.single_count().await, 0);
        assert!(h.transport.presented().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failures_are_retried() {
        let h = Harness::new(quick_config()).await;
        let singles = service(&h);

        h.transport.fail_next_presents(2);
        singles.start("U1", "C1", None, None).await.unwrap();
        assert_eq!(h.transport.presented().len(), 1);

        h.transport.fail_next_presents(3);
        let err = singles
            .handle_vote("U1", &current_handle(&h), RoundSlot::Left)
            .await
            .err()
            .unwrap();
        assert!(err.is_transport());
        assert_eq!(h.registry.single_count().await, 0);
    }
}
