use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use teloxide::types::ChatId;

/// Per-user rate limiting of individual commands.
#[derive(Default)]
pub struct Cooldowns {
    expires: Mutex<HashMap<(&'static str, ChatId), Instant>>,
}

impl Cooldowns {
    pub fn new() -> Cooldowns {
        Cooldowns::default()
    }

    /// Records a use of `command` by `user`, or returns how long they still
    /// have to wait.
    pub fn try_acquire(
        &self,
        command: &'static str,
        user: ChatId,
        window: Duration,
    ) -> Result<(), Duration> {
        self.try_acquire_at(command, user, window, Instant::now())
    }

    pub(crate) fn try_acquire_at(
        &self,
        command: &'static str,
        user: ChatId,
        window: Duration,
        now: Instant,
    ) -> Result<(), Duration> {
        let mut expires = self.expires.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(&until) = expires.get(&(command, user)) {
            if now < until {
                return Err(until - now);
            }
        }

        // Expired entries are dropped lazily so the map stays small.
        expires.retain(|_, until| *until > now);
        expires.insert((command, user), now + window);
        Ok(())
    }
}
