//! Loading [`GameConfig`] from TOML.

use idolbracket_core::config::GameConfig;
use idolbracket_core::error::{BracketError, Result};
use std::io::ErrorKind;
use std::path::Path;

/// Reads the game configuration from `path`.
///
/// A missing or empty file yields the defaults. Unknown keys are ignored; a file
/// that does not parse, or parses to values the engine cannot run with, is a
/// `Config` error.
pub async fn load_config(path: &Path) -> Result<GameConfig> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            return Ok(GameConfig::default());
        }
        Err(e) => {
            return Err(BracketError::config(format!("cannot read {}: {}", path.display(), e)));
        }
    };

    let config = parse_config(&content).map_err(|e| {
        tracing::error!(path = %path.display(), "Invalid config file: {}", e);
        e
    })?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Parses and validates a TOML document.
pub fn parse_config(content: &str) -> Result<GameConfig> {
    if content.trim().is_empty() {
        return Ok(GameConfig::default());
    }
    let config: GameConfig = toml::from_str(content).map_err(|e| BracketError::config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
