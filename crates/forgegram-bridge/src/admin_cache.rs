//! Per-chat administrator lists cached for an hour.

use std::sync::Arc;
use std::time::Duration;

use forgegram_core::{Clock, SystemClock, TtlStore};
use forgegram_telegram::ChatTransport;

pub const ADMIN_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
pub struct AdminMembershipCache {
    admins: TtlStore<i64, Vec<i64>>,
    ttl: Duration,
}

impl Default for AdminMembershipCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AdminMembershipCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            admins: TtlStore::with_clock(clock),
            ttl: ADMIN_CACHE_TTL,
        }
    }

    /// On a miss the administrator list is fetched and cached. If that call
    /// fails the user's own membership status decides, and any further
    /// failure denies.
    pub async fn is_admin(
        &self,
        transport: &dyn ChatTransport,
        chat_id: i64,
        user_id: i64,
    ) -> bool {
        if let Some(admins) = self.admins.get(&chat_id) {
            return admins.contains(&user_id);
        }
        match transport.get_chat_administrators(chat_id).await {
            Ok(admins) => {
                let is_admin = admins.contains(&user_id);
                self.admins.set(chat_id, admins, self.ttl);
                is_admin
            }
            Err(error) => {
                tracing::warn!(chat_id, %error, "failed to fetch chat administrators");
                match transport.get_chat_member_status(chat_id, user_id).await {
                    Ok(status) => status.is_admin(),
                    Err(error) => {
                        tracing::warn!(chat_id, user_id, %error, "failed to fetch member status");
                        false
                    }
                }
            }
        }
    }

    pub fn invalidate(&self, chat_id: i64) {
        self.admins.delete(&chat_id);
    }

    pub fn cleanup(&self) -> usize {
        self.admins.cleanup()
    }
}
