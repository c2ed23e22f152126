use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use teloxide::types::ChatId;

struct Pending {
    nonce: u64,
    expires: Instant,
}

/// Outstanding yes/no prompts, at most one per user. Each prompt carries a
/// nonce so buttons of an older prompt cannot settle a newer one.
#[derive(Default)]
pub struct Confirmations {
    next_nonce: AtomicU64,
    pending: Mutex<HashMap<ChatId, Pending>>,
}

impl Confirmations {
    pub fn new() -> Confirmations {
        Confirmations::default()
    }

    /// Opens a prompt for `owner` that can be settled within `window`,
    /// replacing any earlier one.
    pub fn open(&self, owner: ChatId, window: Duration) -> u64 {
        self.open_at(owner, window, Instant::now())
    }

    pub(crate) fn open_at(&self, owner: ChatId, window: Duration, now: Instant) -> u64 {
        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.insert(
            owner,
            Pending {
                nonce,
                expires: now + window,
            },
        );
        nonce
    }

    /// Consumes the prompt. Returns `false` if it is unknown, superseded or
    /// expired.
    pub fn settle(&self, owner: ChatId, nonce: u64) -> bool {
        self.settle_at(owner, nonce, Instant::now())
    }

    pub(crate) fn settle_at(&self, owner: ChatId, nonce: u64, now: Instant) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.get(&owner) {
            Some(p) if p.nonce == nonce => {
                let live = now < p.expires;
                pending.remove(&owner);
                live
            }
            _ => false,
        }
    }

    /// Drops the prompt if nobody settled it. Returns `true` if it was still
    /// pending.
    pub fn expire(&self, owner: ChatId, nonce: u64) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.get(&owner).is_some_and(|p| p.nonce == nonce) {
            pending.remove(&owner);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(15);

    #[test]
    fn settles_once() {
        let confirmations = Confirmations::new();
        let now = Instant::now();
        let nonce = confirmations.open_at(ChatId(1), WINDOW, now);

        assert!(confirmations.settle_at(ChatId(1), nonce, now));
        assert!(!confirmations.settle_at(ChatId(1), nonce, now));
    }

    #[test]
    fn late_answer_is_refused() {
        let confirmations = Confirmations::new();
        let now = Instant::now();
        let nonce = confirmations.open_at(ChatId(1), WINDOW, now);

        assert!(!confirmations.settle_at(ChatId(1), nonce, now + WINDOW));
        assert!(!confirmations.expire(ChatId(1), nonce));
    }

    #[test]
    fn newer_prompt_supersedes_older() {
        let confirmations = Confirmations::new();
        let now = Instant::now();
        let old = confirmations.open_at(ChatId(1), WINDOW, now);
        let new = confirmations.open_at(ChatId(1), WINDOW, now);

        assert!(!confirmations.expire(ChatId(1), old));
        assert!(!confirmations.settle_at(ChatId(1), old, now));
        assert!(confirmations.settle_at(ChatId(1), new, now));
    }

    #[test]
    fn prompts_are_per_user() {
        let confirmations = Confirmations::new();
        let now = Instant::now();
        let nonce = confirmations.open_at(ChatId(1), WINDOW, now);

        assert!(!confirmations.settle_at(ChatId(2), nonce, now));
        assert!(confirmations.expire(ChatId(1), nonce));
    }
}
