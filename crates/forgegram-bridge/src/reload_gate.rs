//! Once-per-window limiter for the `/reload` command.

use std::sync::Arc;
use std::time::Duration;

use forgegram_core::{deadline_after, Clock, SystemClock, TtlStore};

pub const RELOAD_WINDOW: Duration = Duration::from_secs(10 * 60);

pub struct ReloadRateLimiter {
    next_allowed_unix_ms: TtlStore<i64, u64>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl std::fmt::Debug for ReloadRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadRateLimiter")
            .field("limited_chats", &self.next_allowed_unix_ms.len())
            .field("window", &self.window)
            .finish()
    }
}

impl Default for ReloadRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadRateLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            next_allowed_unix_ms: TtlStore::with_clock(clock.clone()),
            clock,
            window: RELOAD_WINDOW,
        }
    }

    /// `Err(remaining)` while the chat is still inside its window.
    pub fn check(&self, chat_id: i64) -> Result<(), Duration> {
        let Some(next_allowed) = self.next_allowed_unix_ms.get(&chat_id) else {
            return Ok(());
        };
        let now = self.clock.now_unix_ms();
        if now >= next_allowed {
            return Ok(());
        }
        Err(Duration::from_millis(next_allowed - now))
    }

    pub fn mark(&self, chat_id: i64) {
        let next_allowed = deadline_after(self.clock.now_unix_ms(), self.window);
        self.next_allowed_unix_ms
            .set(chat_id, next_allowed, self.window);
    }

    pub fn cleanup(&self) -> usize {
        self.next_allowed_unix_ms.cleanup()
    }
}

/// Whole minutes left, rounded up, as shown to the user.
pub fn remaining_minutes(remaining: Duration) -> u64 {
    remaining.as_secs().div_ceil(60).max(1)
}
