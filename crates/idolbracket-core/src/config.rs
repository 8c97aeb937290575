//! Game configuration model.

use crate::error::{BracketError, Result};
use crate::idol::GenderFilter;
use crate::session::GameType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Size added to both modes when `debug_mode` is on.
const DEBUG_GAME_SIZE: usize = 10;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Time participants get to vote on a multiplayer round.
    pub multi_round_delay_secs: u64,
    /// Pause after a tied round was decided at random.
    pub tie_break_pause_ms: u64,
    /// Pause between single-player rounds so the pick stays visible.
    pub single_round_pause_ms: u64,
    pub catalog_refresh_interval_secs: u64,
    pub session_snapshot_interval_secs: u64,
    pub catalog_ttl_secs: u64,
    pub rebuild_worker_cap: usize,
    /// Consecutive transport failures a round loop tolerates before ending the game.
    pub transport_retry_limit: u32,
    pub allowed_single_sizes: BTreeSet<usize>,
    pub allowed_multi_sizes: BTreeSet<usize>,
    pub default_game_size: usize,
    pub default_gender: GenderFilter,
    pub debug_mode: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            multi_round_delay_secs: 5,
            tie_break_pause_ms: 1500,
            single_round_pause_ms: 200,
            catalog_refresh_interval_secs: 12 * 60 * 60,
            session_snapshot_interval_secs: 30,
            catalog_ttl_secs: 7 * 24 * 60 * 60,
            rebuild_worker_cap: 50,
            transport_retry_limit: 3,
            allowed_single_sizes: [32, 64, 128, 256, 512, 1024].into_iter().collect(),
            allowed_multi_sizes: [32, 64].into_iter().collect(),
            default_game_size: 32,
            default_gender: GenderFilter::Girl,
            debug_mode: false,
        }
    }
}

impl GameConfig {
    pub fn multi_round_delay(&self) -> Duration {
        Duration::from_secs(self.multi_round_delay_secs)
    }

    pub fn tie_break_pause(&self) -> Duration {
        Duration::from_millis(self.tie_break_pause_ms)
    }

    pub fn single_round_pause(&self) -> Duration {
        Duration::from_millis(self.single_round_pause_ms)
    }

    pub fn catalog_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.catalog_refresh_interval_secs)
    }

    pub fn session_snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.session_snapshot_interval_secs)
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }

    /// Checks a requested bracket size against the sizes allowed for `game_type`.
    pub fn validate_size(&self, game_type: GameType, size: usize) -> Result<usize> {
        let allowed = match game_type {
            GameType::Single => &self.allowed_single_sizes,
            GameType::Multi => &self.allowed_multi_sizes,
        };
        if allowed.contains(&size) || (self.debug_mode && size == DEBUG_GAME_SIZE) {
            Ok(size)
        } else {
            Err(BracketError::InvalidGameSize(size))
        }
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rebuild_worker_cap == 0 {
            return Err(BracketError::config("rebuild_worker_cap must be at least 1"));
        }
        if self.session_snapshot_interval_secs == 0 || self.catalog_refresh_interval_secs == 0 {
            return Err(BracketError::config("loop intervals must be non-zero"));
        }
        if self.default_game_size < 2 {
            return Err(BracketError::config("default_game_size must be at least 2"));
        }
        Ok(())
    }
}
