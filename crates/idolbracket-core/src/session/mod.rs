//! Session domain module.
//!
//! # Module Structure
//!
//! - `bracket`: the shared elimination state machine (`Bracket`) and `draw`
//! - `model`: single and multiplayer sessions, keys and terminal summaries
//! - `transport`: chat and stats collaborator traits

mod bracket;
mod model;
mod transport;

pub use bracket::{Bracket, BracketState, RoundOutcome, RoundSlot, TOP_EIGHT_SIZE, draw};
pub use model::{BracketSummary, GameType, MultiSession, SessionKey, SingleSession};
pub use transport::{ChatTransport, Contestant, MessageHandle, StatsRecorder, VoteCounts};
