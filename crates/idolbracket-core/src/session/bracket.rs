//! The elimination state machine shared by single and multiplayer games.

use crate::error::{BracketError, Result};
use crate::idol::{Idol, IdolImage, IdolKey};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Queue length at which the final-eight snapshot is taken.
pub const TOP_EIGHT_SIZE: usize = 8;

/// Round winners shown after the final eight in the winner bracket.
const BRACKET_FINAL_ROUNDS: usize = 7;

/// Lifecycle of a bracket.
///
/// `Created → InRound → (RoundResolved → InRound)* → Terminal`. Votes are only
/// accepted in `InRound`, so a vote arriving while the next round is still being
/// presented is rejected by the state itself.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BracketState {
    Created,
    InRound,
    RoundResolved,
    Terminal,
}

/// One side of the current round.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoundSlot {
    Left,
    Right,
}

impl RoundSlot {
    pub fn index(self) -> usize {
        match self {
            RoundSlot::Left => 0,
            RoundSlot::Right => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            RoundSlot::Left => RoundSlot::Right,
            RoundSlot::Right => RoundSlot::Left,
        }
    }
}

/// Result of a single `advance_round` call.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub winner: Arc<Idol>,
    pub loser: Arc<Idol>,
    pub remaining: usize,
    pub terminal: bool,
}

/// Samples `size` distinct idols uniformly at random without replacement.
///
/// The pool must already be filtered by gender. Fails without a partial result
/// when the pool is too small.
pub fn draw<R: Rng>(pool: &[Arc<Idol>], size: usize, rng: &mut R) -> Result<Vec<Arc<Idol>>> {
    if pool.len() < size {
        return Err(BracketError::InsufficientContestants {
            available: pool.len(),
            requested: size,
        });
    }
    Ok(pool.choose_multiple(rng, size).cloned().collect())
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Bracket {
    queue: VecDeque<Arc<Idol>>,
    round_winners: Vec<Arc<Idol>>,
    round_losers: Vec<Arc<Idol>>,
    top_eight: Option<Vec<Arc<Idol>>>,
    #[serde(default)]
    image_index: HashMap<IdolKey, usize>,
    winner: Option<Arc<Idol>>,
    state: BracketState,
    initial_size: usize,
}

impl Bracket {
    /// Creates a bracket from an already drawn field.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGameSize` when the field cannot hold a single round.
    pub fn new(field: Vec<Arc<Idol>>) -> Result<Self> {
        if field.len() < 2 {
            return Err(BracketError::InvalidGameSize(field.len()));
        }
        let initial_size = field.len();
        let queue: VecDeque<Arc<Idol>> = field.into();
        let top_eight = (queue.len() == TOP_EIGHT_SIZE).then(|| queue.iter().cloned().collect());
        Ok(Self {
            queue,
            round_winners: Vec::new(),
            round_losers: Vec::new(),
            top_eight,
            image_index: HashMap::new(),
            winner: None,
            state: BracketState::Created,
            initial_size,
        })
    }

    /// Draws a field from `pool` and creates a bracket from it.
    pub fn draw<R: Rng>(pool: &[Arc<Idol>], size: usize, rng: &mut R) -> Result<Self> {
        Self::new(draw(pool, size, rng)?)
    }

    pub fn state(&self) -> BracketState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state == BracketState::Terminal
    }

    /// Whether a participant vote may resolve the current round.
    pub fn accepts_votes(&self) -> bool {
        self.state == BracketState::InRound
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    pub fn queue(&self) -> impl Iterator<Item = &Arc<Idol>> {
        self.queue.iter()
    }

    pub fn round_winners(&self) -> &[Arc<Idol>] {
        &self.round_winners
    }

    pub fn round_losers(&self) -> &[Arc<Idol>] {
        &self.round_losers
    }

    pub fn top_eight(&self) -> Option<&[Arc<Idol>]> {
        self.top_eight.as_deref()
    }

    pub fn winner(&self) -> Option<&Arc<Idol>> {
        self.winner.as_ref()
    }

    /// The two contestants at the head of the queue.
    pub fn current_round(&self) -> Option<(&Arc<Idol>, &Arc<Idol>)> {
        if self.is_terminal() {
            return None;
        }
        Some((self.queue.front()?, self.queue.get(1)?))
    }

    /// Marks the current round as shown to participants.
    ///
    /// # Errors
    ///
    /// `AlreadyTerminal` once a winner exists, `InvalidSlot` if the queue does not
    /// hold a full round.
    pub fn present(&mut self) -> Result<()> {
        if self.is_terminal() {
            return Err(BracketError::AlreadyTerminal);
        }
        if self.queue.len() < 2 {
            return Err(BracketError::InvalidSlot {
                queue_len: self.queue.len(),
            });
        }
        self.state = BracketState::InRound;
        Ok(())
    }

    /// Resolves the current round in favour of `winner`.
    ///
    /// The winner re-enters at the tail of the queue, the head pair is removed.
    /// The final-eight snapshot is taken the first time the queue holds eight;
    /// the bracket turns terminal when one contestant is left.
    pub fn advance_round(&mut self, winner: RoundSlot) -> Result<RoundOutcome> {
        if self.is_terminal() {
            return Err(BracketError::AlreadyTerminal);
        }
        if self.queue.len() < 2 {
            return Err(BracketError::InvalidSlot {
                queue_len: self.queue.len(),
            });
        }

        let winning = self.queue[winner.index()].clone();
        let losing = self.queue[winner.other().index()].clone();

        self.round_winners.push(winning.clone());
        self.round_losers.push(losing.clone());
        self.queue.pop_front();
        self.queue.pop_front();
        self.queue.push_back(winning.clone());

        if self.queue.len() == TOP_EIGHT_SIZE && self.top_eight.is_none() {
            self.top_eight = Some(self.queue.iter().cloned().collect());
        }

        let terminal = self.queue.len() == 1;
        if terminal {
            self.winner = Some(winning.clone());
            self.state = BracketState::Terminal;
        } else {
            self.state = BracketState::RoundResolved;
        }

        Ok(RoundOutcome {
            winner: winning,
            loser: losing,
            remaining: self.queue.len(),
            terminal,
        })
    }

    /// Picture shown for `idol` in this bracket.
    ///
    /// The index is drawn on first use and reused afterwards. A stored index that
    /// no longer fits (the catalog was refreshed with fewer images) is redrawn.
    pub fn image_for<R: Rng>(&mut self, idol: &Idol, rng: &mut R) -> Option<IdolImage> {
        if idol.images.is_empty() {
            return None;
        }
        let key = idol.key();
        let index = match self.image_index.get(&key) {
            Some(&index) if index < idol.images.len() => index,
            _ => {
                let index = rng.gen_range(0..idol.images.len());
                self.image_index.insert(key, index);
                index
            }
        };
        idol.images.get(index).cloned()
    }

    /// Final eight followed by the last seven round winners, in bracket order.
    ///
    /// `None` until the bracket is terminal, or when it started below eight.
    pub fn bracket_slots(&self) -> Option<Vec<Arc<Idol>>> {
        if !self.is_terminal() {
            return None;
        }
        let top_eight = self.top_eight.as_ref()?;
        if self.round_winners.len() < BRACKET_FINAL_ROUNDS {
            return None;
        }
        let finals = &self.round_winners[self.round_winners.len() - BRACKET_FINAL_ROUNDS..];
        Some(top_eight.iter().chain(finals.iter()).cloned().collect())
    }
}
