use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use teloxide::types::ChatId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Runtime settings, read from the environment (and `.env`, via dotenv).
/// The bot token itself is picked up by `Bot::from_env` from `TELOXIDE_TOKEN`.
#[derive(Clone, Debug)]
pub struct Config {
    /// Users allowed to run admin commands.
    pub admins: HashSet<ChatId>,
    /// Chat that hosts the live lobby status message. Defaults to the chat
    /// `/open` was sent from.
    pub lobby_chat: Option<ChatId>,
    pub registry_path: PathBuf,
    pub dm_pacing: Duration,
    pub flush_debounce: Duration,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let var = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let admins = var("SCRIM_ADMINS")
            .ok_or(ConfigError::Missing("SCRIM_ADMINS"))?
            .split(',')
            .map(|id| parse_chat_id("SCRIM_ADMINS", id))
            .collect::<Result<HashSet<_>, _>>()?;

        let lobby_chat = var("SCRIM_LOBBY_CHAT")
            .map(|id| parse_chat_id("SCRIM_LOBBY_CHAT", &id))
            .transpose()?;

        let registry_path = var("SCRIM_REGISTRY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("players.json"));

        Ok(Config {
            admins,
            lobby_chat,
            registry_path,
            dm_pacing: parse_millis("SCRIM_DM_PACING_MS", var("SCRIM_DM_PACING_MS"), 100)?,
            flush_debounce: parse_millis(
                "SCRIM_FLUSH_DEBOUNCE_MS",
                var("SCRIM_FLUSH_DEBOUNCE_MS"),
                1000,
            )?,
        })
    }

    pub fn is_admin(&self, user: ChatId) -> bool {
        self.admins.contains(&user)
    }
}

fn parse_chat_id(key: &'static str, raw: &str) -> Result<ChatId, ConfigError> {
    raw.trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| ConfigError::Invalid {
            key,
            value: raw.to_string(),
        })
}

fn parse_millis(
    key: &'static str,
    raw: Option<String>,
    default: u64,
) -> Result<Duration, ConfigError> {
    match raw {
        None => Ok(Duration::from_millis(default)),
        Some(value) => value
            .trim()
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
