//! Domain layer of the idol bracket game.
//!
//! Contestants, the elimination state machine, session models, configuration and
//! the collaborator traits the application layer drives.

pub mod config;
pub mod error;
pub mod idol;
pub mod session;
pub mod side_channel;

// Re-export common error type
pub use error::{BracketError, Result};
