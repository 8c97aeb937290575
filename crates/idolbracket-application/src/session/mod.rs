//! Session application services.
//!
//! Single-player brackets advance inline on each vote; multiplayer brackets run a
//! timed round loop per channel.

mod multi;
mod round;
mod single;
mod vote_resolver;

pub use multi::MultiPlayerService;
pub use single::{SinglePlayerService, StartedGame, VoteOutcome};
pub use vote_resolver::{LoopExit, RoundDecision, VoteResolver, decide_round};
