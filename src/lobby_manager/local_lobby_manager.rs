use chrono::Utc;
use log::{debug, info};

use crate::lobby_manager::session_store::SessionStore;
use crate::lobby_manager::*;

pub struct LocalLobbyManager {
    store: SessionStore,
    capacity: usize,
}

impl LocalLobbyManager {
    pub fn new() -> LocalLobbyManager {
        LocalLobbyManager::with_capacity(MAX_PLAYERS)
    }

    pub fn with_capacity(capacity: usize) -> LocalLobbyManager {
        LocalLobbyManager {
            store: SessionStore::new(),
            capacity,
        }
    }
}

impl Default for LocalLobbyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LobbyManager for LocalLobbyManager {
    fn open(&self, host: ChatId, format: Format, region: String) -> Result<Session, LobbyError> {
        self.store.transact(|slot| {
            if slot.session.is_some() {
                return Err(LobbyError::AlreadyActive);
            }

            let session = Session {
                id: slot.allocate_id(),
                host,
                format,
                region,
                state: SessionState::Open,
                players: Vec::new(),
                match_code: None,
                presentation: None,
                start_time: Utc::now(),
            };
            info!(
                "Lobby {} opened by {}: {} {}",
                session.id, host, session.region, session.format
            );

            Ok(slot.session.insert(session).clone())
        })
    }

    fn attach_presentation(
        &self,
        session_id: SessionId,
        handle: PresentationHandle,
    ) -> Result<(), LobbyError> {
        self.store.transact(|slot| match slot.session.as_mut() {
            Some(session) if session.id == session_id => {
                session.presentation.get_or_insert(handle);
                Ok(())
            }
            _ => Err(LobbyError::NoSession),
        })
    }

    fn check_in(
        &self,
        player_id: ChatId,
        epic_name: String,
    ) -> Result<CheckInOutcome, LobbyError> {
        self.store.transact(|slot| {
            let session = slot.session.as_mut().ok_or(LobbyError::NoSession)?;

            if session.state != SessionState::Open {
                return Err(LobbyError::Rejected {
                    state: session.state,
                });
            }
            if session.is_checked_in(player_id) {
                return Ok(CheckInOutcome::AlreadyCheckedIn);
            }
            if session.players.len() >= self.capacity {
                return Err(LobbyError::CapacityReached {
                    capacity: self.capacity,
                });
            }

            debug!("{} ({}) checked into lobby {}", epic_name, player_id, session.id);
            session.players.push(CheckIn {
                player_id,
                epic_name,
                checked_in_at: Utc::now(),
            });
            Ok(CheckInOutcome::CheckedIn)
        })
    }

    fn lock(&self) -> Result<Session, LobbyError> {
        self.store.transact(|slot| {
            let session = slot.session.as_mut().ok_or(LobbyError::NoSession)?;

            if session.state != SessionState::Open {
                return Err(LobbyError::InvalidState {
                    operation: "lock",
                    state: session.state,
                });
            }

            session.state = SessionState::Locked;
            info!(
                "Lobby {} locked with {} players",
                session.id,
                session.players.len()
            );
            Ok(session.clone())
        })
    }

    fn begin_distribution(&self, code: String) -> Result<Session, LobbyError> {
        self.store.transact(|slot| {
            let session = slot.session.as_mut().ok_or(LobbyError::NoSession)?;

            match session.state {
                SessionState::Open | SessionState::Locked => {}
                state => {
                    return Err(LobbyError::InvalidState {
                        operation: "distribute",
                        state,
                    })
                }
            }

            session.match_code = Some(code);
            session.state = SessionState::Distributing;
            info!(
                "Lobby {} distributing to {} players",
                session.id,
                session.players.len()
            );
            Ok(session.clone())
        })
    }

    fn complete_distribution(&self, session_id: SessionId) -> Option<Session> {
        self.store.transact(|slot| {
            let still_ours = matches!(
                slot.session.as_ref(),
                Some(s) if s.id == session_id && s.state == SessionState::Distributing
            );
            if !still_ours {
                return None;
            }

            let mut session = slot.session.take()?;
            session.state = SessionState::Ended;
            info!("Lobby {} ended after distribution", session.id);
            Some(session)
        })
    }

    fn end(&self) -> Result<Session, LobbyError> {
        let mut session = self.store.clear().ok_or(LobbyError::NoSession)?;
        info!("Lobby {} force-ended from {}", session.id, session.state);
        session.state = SessionState::Ended;
        Ok(session)
    }

    fn snapshot(&self) -> Option<Session> {
        self.store.current()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
