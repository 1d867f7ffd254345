//! Single-use OAuth `state` values tying a GitHub redirect to a Telegram user.

use std::sync::Arc;
use std::time::Duration;

use forgegram_core::{Clock, SystemClock, TtlStore};

use crate::sealing::random_bytes;

pub const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
pub struct OAuthStateStore {
    states: TtlStore<String, i64>,
    ttl: Duration,
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            states: TtlStore::with_clock(clock),
            ttl: OAUTH_STATE_TTL,
        }
    }

    pub fn issue(&self, telegram_user_id: i64) -> String {
        let state = hex::encode(random_bytes::<16>());
        self.states.set(state.clone(), telegram_user_id, self.ttl);
        state
    }

    /// Returns the user the state was issued for and forgets it.
    pub fn consume(&self, state: &str) -> Option<i64> {
        if state.is_empty() {
            return None;
        }
        self.states.take(&state.to_string())
    }

    pub fn cleanup(&self) -> usize {
        self.states.cleanup()
    }
}
