use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::lobby_manager::{Session, SessionId};

/// Contents of the store, visible only inside a `SessionStore::transact` call.
pub struct Slot {
    pub session: Option<Session>,
    next_id: u64,
}

impl Slot {
    /// Ids are strictly increasing for the lifetime of the store, so a stale
    /// id never matches a lobby opened later.
    pub fn allocate_id(&mut self) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Holds the single optional active lobby. Every access goes through one
/// mutex, so each call observes and mutates a consistent session.
pub struct SessionStore {
    slot: Mutex<Slot>,
}

impl SessionStore {
    pub fn new() -> SessionStore {
        let seed = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        SessionStore {
            slot: Mutex::new(Slot {
                session: None,
                next_id: seed,
            }),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Slot> {
        // A panicking writer cannot leave a half-applied session behind: every
        // mutation is a single assignment or push.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<Session> {
        self.guard().session.clone()
    }

    /// Installs `session`, returning whatever was active before.
    pub fn replace(&self, session: Session) -> Option<Session> {
        self.guard().session.replace(session)
    }

    pub fn clear(&self) -> Option<Session> {
        self.guard().session.take()
    }

    /// Runs `f` as one critical section against the store.
    pub fn transact<R>(&self, f: impl FnOnce(&mut Slot) -> R) -> R {
        f(&mut self.guard())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby_manager::{Format, SessionState};
    use teloxide::types::ChatId;

    fn session(id: SessionId) -> Session {
        Session {
            id,
            host: ChatId(1),
            format: Format::Solo,
            region: String::from("Europe"),
            state: SessionState::Open,
            players: vec![],
            match_code: None,
            presentation: None,
            start_time: Utc::now(),
        }
    }

    #[test]
    fn replace_and_clear() {
        let store = SessionStore::new();
        assert!(store.current().is_none());

        assert!(store.replace(session(SessionId(7))).is_none());
        assert_eq!(store.current().map(|s| s.id), Some(SessionId(7)));

        let previous = store.replace(session(SessionId(8)));
        assert_eq!(previous.map(|s| s.id), Some(SessionId(7)));

        assert_eq!(store.clear().map(|s| s.id), Some(SessionId(8)));
        assert!(store.current().is_none());
        assert!(store.clear().is_none());
    }

    #[test]
    fn allocated_ids_increase() {
        let store = SessionStore::new();
        let first = store.transact(|slot| slot.allocate_id());
        let second = store.transact(|slot| slot.allocate_id());
        assert!(second.0 > first.0);
    }

    #[test]
    fn current_is_a_copy() {
        let store = SessionStore::new();
        store.replace(session(SessionId(1)));

        let mut copy = store.current().unwrap();
        copy.state = SessionState::Ended;

        assert_eq!(store.current().unwrap().state, SessionState::Open);
    }
}
