//! Application layer of the idol bracket game.
//!
//! This crate coordinates the domain types with the collaborator traits: the
//! catalog cache and its rebuild, the live session registry, the single and
//! multiplayer game services, and crash recovery.

pub mod catalog;
pub mod game;
pub mod persistence;
pub mod registry;
pub mod session;

#[cfg(test)]
mod testing;

pub use catalog::CatalogCache;
pub use game::{BracketGame, GameDependencies};
pub use persistence::PersistenceLoop;
pub use registry::GameRegistry;
