//! Error types for the bracket game engine.

use thiserror::Error;

/// A shared error type for the whole engine.
///
/// Variants mirror the failure categories the engine distinguishes: user-facing
/// rejections, internal invariant violations, and collaborator failures that are
/// contained at their own boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BracketError {
    /// The filtered pool is smaller than the requested bracket size.
    #[error("Not enough idols: {available} available, {requested} requested")]
    InsufficientContestants { available: usize, requested: usize },

    /// The requested bracket size is not allowed for this game mode.
    #[error("Invalid game size: {0}")]
    InvalidGameSize(usize),

    /// The gender filter could not be parsed.
    #[error("Invalid gender: '{0}'")]
    InvalidGender(String),

    /// A multiplayer game is already running for the channel.
    #[error("A game is already running in channel '{0}'")]
    GameAlreadyRunning(String),

    /// Startup restore or the first catalog load has not completed yet.
    #[error("Game is not ready yet")]
    NotReady,

    /// The head of the queue does not hold a full round.
    #[error("Invalid round slot: queue holds {queue_len} entries")]
    InvalidSlot { queue_len: usize },

    /// An advance was attempted on a bracket that already has a winner.
    #[error("Bracket already has a winner")]
    AlreadyTerminal,

    /// No live game matches the user or channel a command named.
    #[error("No {entity_type} found for '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// A single catalog row failed to resolve or hash.
    #[error("Catalog fetch failure: {0}")]
    CatalogFetch(String),

    /// The persistence side-channel could not be read or written.
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// A round failed to present or its votes failed to read.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BracketError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn catalog_fetch(message: impl Into<String>) -> Self {
        Self::CatalogFetch(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceUnavailable(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Errors that are reported back to the participant who issued the command.
    ///
    /// Everything else is logged and contained; participants never see it.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InsufficientContestants { .. }
                | Self::InvalidGameSize(_)
                | Self::InvalidGender(_)
                | Self::GameAlreadyRunning(_)
                | Self::NotReady
                | Self::NotFound { .. }
        )
    }

    /// Invariant violations that end the affected round (and only that session).
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvalidSlot { .. } | Self::AlreadyTerminal)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for BracketError {
    fn from(err: std::io::Error) -> Self {
        Self::PersistenceUnavailable(format!("{} (kind: {:?})", err, err.kind()))
    }
}

impl From<serde_json::Error> for BracketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for BracketError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, BracketError>`.
pub type Result<T> = std::result::Result<T, BracketError>;
