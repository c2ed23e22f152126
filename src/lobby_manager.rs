pub mod distribution;
pub mod local_lobby_manager;
pub mod session_store;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use teloxide::types::{ChatId, MessageId};
use thiserror::Error;

/// Hard ceiling on the number of players a lobby accepts.
pub const MAX_PLAYERS: usize = 100;

#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug)]
pub struct SessionId(pub u64);

// Rendered in base 36 so ids stay short in chat messages.
impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut n = self.0;
        let mut buf = Vec::new();
        loop {
            buf.push(DIGITS[(n % 36) as usize]);
            n /= 36;
            if n == 0 {
                break;
            }
        }
        buf.reverse();
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}

#[derive(Eq, PartialEq, Copy, Clone, Debug, derive_more::Display)]
pub enum Format {
    #[display(fmt = "SOLO")]
    Solo,
    #[display(fmt = "DUO")]
    Duo,
    #[display(fmt = "TRIO")]
    Trio,
    #[display(fmt = "SQUAD")]
    Squad,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SOLO" => Ok(Format::Solo),
            "DUO" => Ok(Format::Duo),
            "TRIO" => Ok(Format::Trio),
            "SQUAD" => Ok(Format::Squad),
            other => Err(format!("unknown format '{other}', expected SOLO, DUO, TRIO or SQUAD")),
        }
    }
}

/// Lifecycle of a lobby. A cleared store is the implicit "absent" state.
#[derive(Eq, PartialEq, Copy, Clone, Debug, derive_more::Display)]
pub enum SessionState {
    #[display(fmt = "OPEN")]
    Open,
    #[display(fmt = "LOCKED")]
    Locked,
    #[display(fmt = "DISTRIBUTING")]
    Distributing,
    #[display(fmt = "ENDED")]
    Ended,
}

#[derive(Clone, Debug)]
pub struct CheckIn {
    pub player_id: ChatId,
    pub epic_name: String,
    pub checked_in_at: DateTime<Utc>,
}

/// Where the live status message of a lobby was posted.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct PresentationHandle {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Provides a snapshot of the active lobby. Values handed out by a
/// `LobbyManager` are copies; mutating them has no effect on the lobby.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub host: ChatId,
    pub format: Format,
    pub region: String,
    pub state: SessionState,
    /// Check-ins in arrival order. Keys are unique.
    pub players: Vec<CheckIn>,
    pub match_code: Option<String>,
    pub presentation: Option<PresentationHandle>,
    pub start_time: DateTime<Utc>,
}

impl Session {
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_checked_in(&self, player_id: ChatId) -> bool {
        self.players.iter().any(|p| p.player_id == player_id)
    }

    pub fn code_distributed(&self) -> bool {
        self.match_code.is_some()
    }
}

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum CheckInOutcome {
    CheckedIn,
    AlreadyCheckedIn,
}

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum LobbyError {
    #[error("a lobby is already active")]
    AlreadyActive,

    #[error("there is no active lobby")]
    NoSession,

    #[error("cannot {operation} while the lobby is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("the lobby is full ({capacity} players)")]
    CapacityReached { capacity: usize },

    #[error("check-in is closed, the lobby is {state}")]
    Rejected { state: SessionState },
}

pub trait LobbyManager {
    /// Creates a new lobby in `Open`. Fails if any lobby is active.
    fn open(&self, host: ChatId, format: Format, region: String) -> Result<Session, LobbyError>;

    /// Links the live status message to the lobby. Only the first call for a
    /// given lobby has an effect.
    fn attach_presentation(
        &self,
        session_id: SessionId,
        handle: PresentationHandle,
    ) -> Result<(), LobbyError>;

    /// Adds `player_id` to the roster. Repeat check-ins succeed without
    /// touching the existing record.
    fn check_in(&self, player_id: ChatId, epic_name: String)
        -> Result<CheckInOutcome, LobbyError>;

    fn lock(&self) -> Result<Session, LobbyError>;

    /// Assigns the match code and moves the lobby to `Distributing`. The
    /// returned copy is the frozen roster to notify.
    fn begin_distribution(&self, code: String) -> Result<Session, LobbyError>;

    /// Ends the lobby `session_id` after its fan-out. Returns the final
    /// snapshot, or `None` if that lobby is no longer the active one.
    fn complete_distribution(&self, session_id: SessionId) -> Option<Session>;

    /// Clears the active lobby from any state and returns it marked `Ended`.
    fn end(&self) -> Result<Session, LobbyError>;

    fn snapshot(&self) -> Option<Session>;

    fn is_open(&self) -> bool {
        matches!(self.snapshot(), Some(s) if s.state == SessionState::Open)
    }

    fn capacity(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("squad".parse::<Format>(), Ok(Format::Squad));
        assert_eq!(" Duo ".parse::<Format>(), Ok(Format::Duo));
        assert!("quad".parse::<Format>().is_err());
    }

    #[test]
    fn states_render_upper_case() {
        assert_eq!(SessionState::Distributing.to_string(), "DISTRIBUTING");
        assert_eq!(Format::Trio.to_string(), "TRIO");
    }

    #[test]
    fn session_id_renders_base36() {
        assert_eq!(SessionId(0).to_string(), "0");
        assert_eq!(SessionId(35).to_string(), "z");
        assert_eq!(SessionId(36).to_string(), "10");
    }

    #[test]
    fn errors_describe_state() {
        let err = LobbyError::InvalidState {
            operation: "lock",
            state: SessionState::Locked,
        };
        assert_eq!(err.to_string(), "cannot lock while the lobby is LOCKED");
    }
}
