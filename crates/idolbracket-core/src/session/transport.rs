//! Chat-side collaborators of a running bracket.

use super::bracket::RoundSlot;
use super::model::{BracketSummary, SessionKey};
use crate::error::Result;
use crate::idol::{Idol, IdolImage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reference to a presented round message.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub channel_id: String,
    pub message_id: String,
}

/// One side of a presented round, with the picture fixed for this bracket.
#[derive(Debug, Clone)]
pub struct Contestant {
    pub idol: Arc<Idol>,
    pub image: Option<IdolImage>,
}

/// Aggregated votes read from a round message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteCounts {
    pub left: u32,
    pub right: u32,
    /// User ids seen voting on this round, if the transport reports them.
    pub voters: Vec<String>,
}

/// Presents rounds and reads votes.
///
/// The engine does not know anything about the chat service beyond this contract.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn present_round(
        &self,
        key: &SessionKey,
        left: &Contestant,
        right: &Contestant,
        remaining: usize,
    ) -> Result<MessageHandle>;

    async fn read_vote_counts(&self, message: &MessageHandle) -> Result<VoteCounts>;

    async fn dismiss(&self, message: &MessageHandle) -> Result<()>;

    /// Shows that a tied round was decided by a coin flip in favour of `winner`.
    async fn mark_random_decision(&self, _message: &MessageHandle, _winner: RoundSlot) -> Result<()> {
        Ok(())
    }

    /// Announces the bracket winner; `bracket` holds the slots for the winner chart.
    async fn announce_winner(
        &self,
        _key: &SessionKey,
        _summary: &BracketSummary,
        _bracket: Option<Vec<Arc<Idol>>>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Receives the result of every finished bracket exactly once.
#[async_trait]
pub trait StatsRecorder: Send + Sync {
    async fn record_result(&self, summary: &BracketSummary) -> Result<()>;
}
