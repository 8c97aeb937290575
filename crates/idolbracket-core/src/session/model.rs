use super::bracket::Bracket;
use super::transport::MessageHandle;
use crate::idol::{GenderFilter, Idol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Single,
    Multi,
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Single => f.write_str("single"),
            GameType::Multi => f.write_str("multi"),
        }
    }
}

/// Where a session lives and who owns it.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionKey {
    Single { user_id: String, channel_id: String },
    Multi { channel_id: String },
}

impl SessionKey {
    pub fn channel_id(&self) -> &str {
        match self {
            SessionKey::Single { channel_id, .. } | SessionKey::Multi { channel_id } => channel_id,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Single { user_id, .. } => write!(f, "single:{user_id}"),
            SessionKey::Multi { channel_id } => write!(f, "multi:{channel_id}"),
        }
    }
}

/// A bracket played by one participant, keyed by user id.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SingleSession {
    pub user_id: String,
    pub channel_id: String,
    pub gender: GenderFilter,
    pub bracket: Bracket,
    #[serde(default)]
    pub round_message: Option<MessageHandle>,
}

impl SingleSession {
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        gender: GenderFilter,
        bracket: Bracket,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            gender,
            bracket,
            round_message: None,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::Single {
            user_id: self.user_id.clone(),
            channel_id: self.channel_id.clone(),
        }
    }

    pub fn summary(&self) -> Option<BracketSummary> {
        BracketSummary::from_bracket(
            GameType::Single,
            Some(self.user_id.clone()),
            &self.channel_id,
            self.gender,
            &self.bracket,
            BTreeSet::new(),
        )
    }
}

/// A bracket played by a whole channel, keyed by channel id.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MultiSession {
    pub channel_id: String,
    pub gender: GenderFilter,
    pub bracket: Bracket,
    pub round_delay: Duration,
    #[serde(default)]
    pub participants: BTreeSet<String>,
    #[serde(default)]
    pub round_message: Option<MessageHandle>,
}

impl MultiSession {
    pub fn new(
        channel_id: impl Into<String>,
        gender: GenderFilter,
        bracket: Bracket,
        round_delay: Duration,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            gender,
            bracket,
            round_delay,
            participants: BTreeSet::new(),
            round_message: None,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::Multi {
            channel_id: self.channel_id.clone(),
        }
    }

    pub fn summary(&self) -> Option<BracketSummary> {
        BracketSummary::from_bracket(
            GameType::Multi,
            None,
            &self.channel_id,
            self.gender,
            &self.bracket,
            self.participants.clone(),
        )
    }
}

/// Terminal result of a bracket, handed to the stats recorder.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BracketSummary {
    pub game_type: GameType,
    pub user_id: Option<String>,
    pub channel_id: String,
    pub gender: GenderFilter,
    pub winner: Idol,
    pub round_winners: Vec<Idol>,
    pub round_losers: Vec<Idol>,
    #[serde(default)]
    pub participants: BTreeSet<String>,
}

impl BracketSummary {
    fn from_bracket(
        game_type: GameType,
        user_id: Option<String>,
        channel_id: &str,
        gender: GenderFilter,
        bracket: &Bracket,
        participants: BTreeSet<String>,
    ) -> Option<Self> {
        let winner = bracket.winner()?;
        Some(Self {
            game_type,
            user_id,
            channel_id: channel_id.to_string(),
            gender,
            winner: Idol::clone(winner),
            round_winners: bracket.round_winners().iter().map(|i| Idol::clone(i)).collect(),
            round_losers: bracket.round_losers().iter().map(|i| Idol::clone(i)).collect(),
            participants,
        })
    }
}
