pub mod flusher;
pub mod local_player_registry;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teloxide::types::ChatId;
use thiserror::Error;

#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "EU")]
    Eu,
    #[serde(rename = "NA-East")]
    NaEast,
    #[serde(rename = "NA-West")]
    NaWest,
    #[serde(rename = "ME-South")]
    MeSouth,
    #[serde(rename = "OCE")]
    Oce,
    #[serde(rename = "ASIA")]
    Asia,
    #[serde(rename = "BR")]
    Br,
}

impl Region {
    pub const ALL: [Region; 7] = [
        Region::Eu,
        Region::NaEast,
        Region::NaWest,
        Region::MeSouth,
        Region::Oce,
        Region::Asia,
        Region::Br,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Region::Eu => "EU",
            Region::NaEast => "NA-East",
            Region::NaWest => "NA-West",
            Region::MeSouth => "ME-South",
            Region::Oce => "OCE",
            Region::Asia => "ASIA",
            Region::Br => "BR",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Region::Eu => "Europe",
            Region::NaEast => "North America East",
            Region::NaWest => "North America West",
            Region::MeSouth => "Middle East",
            Region::Oce => "Oceania",
            Region::Asia => "Asia Pacific",
            Region::Br => "Brazil",
        }
    }

    pub fn keys() -> String {
        Region::ALL.map(Region::key).join(", ")
    }
}

impl FromStr for Region {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Region::ALL
            .into_iter()
            .find(|r| r.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| RegistryError::UnknownRegion(s.to_string()))
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub player_id: ChatId,
    pub epic_name: String,
    pub region: Region,
    pub earnings: f64,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("epic names are 3 to 32 letters, digits, spaces, dots, underscores or hyphens")]
    InvalidEpicName,

    #[error("the epic name {0} is already linked to another account")]
    EpicNameTaken(String),

    #[error("unknown region '{0}'")]
    UnknownRegion(String),

    #[error("player is not registered")]
    NotRegistered,

    #[error("registry file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry file is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Trims `raw` and checks it looks like an Epic Games display name.
pub fn validate_epic_name(raw: &str) -> Result<String, RegistryError> {
    let name = raw.trim();
    let len = name.chars().count();
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ');

    if (3..=32).contains(&len) && name.chars().all(allowed) {
        Ok(name.to_string())
    } else {
        Err(RegistryError::InvalidEpicName)
    }
}

pub trait PlayerRegistry {
    /// Registers or updates `player_id`. Returns `true` for a new
    /// registration. Earnings survive an update.
    fn register(
        &mut self,
        player_id: ChatId,
        epic_name: &str,
        region: Region,
    ) -> Result<(bool, PlayerProfile), RegistryError>;

    fn get(&self, player_id: ChatId) -> Option<&PlayerProfile>;

    /// Case-insensitive lookup.
    fn get_by_epic_name(&self, epic_name: &str) -> Option<&PlayerProfile>;

    fn delete(&mut self, player_id: ChatId) -> Result<PlayerProfile, RegistryError>;

    fn update_earnings(&mut self, player_id: ChatId, amount: f64) -> Result<f64, RegistryError>;

    /// Highest earners first, optionally restricted to one region.
    fn leaderboard(&self, region: Option<Region>, limit: usize) -> Vec<&PlayerProfile>;

    fn players_by_region(&self, region: Region) -> Vec<&PlayerProfile>;

    fn player_count(&self) -> usize;

    /// Writes pending changes to durable storage, if any.
    fn flush(&mut self) -> Result<(), RegistryError>;
}
