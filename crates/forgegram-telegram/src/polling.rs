//! Long-polling update loop. Every update runs on its own task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::client::TelegramBotClient;
use crate::types::Update;

#[async_trait]
pub trait UpdateHandler: Send + Sync + 'static {
    async fn handle_update(&self, update: Update);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub timeout_secs: u64,
    pub error_backoff: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 9,
            error_backoff: Duration::from_secs(3),
        }
    }
}

/// Offset to request next so already-seen updates are acknowledged.
pub fn next_update_offset(current: i64, updates: &[Update]) -> i64 {
    updates
        .iter()
        .map(|update| update.update_id.saturating_add(1))
        .fold(current, i64::max)
}

/// Polls until `shutdown` flips to true or its sender is dropped.
pub async fn run_update_polling(
    client: TelegramBotClient,
    config: PollingConfig,
    handler: Arc<dyn UpdateHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut offset = 0_i64;
    tracing::info!(timeout_secs = config.timeout_secs, "telegram polling started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let result = tokio::select! {
            result = client.get_updates(offset, config.timeout_secs) => result,
            _ = shutdown.changed() => break,
        };
        match result {
            Ok(updates) => {
                offset = next_update_offset(offset, &updates);
                for update in updates {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        handler.handle_update(update).await;
                    });
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "telegram polling failed");
                tokio::select! {
                    _ = tokio::time::sleep(config.error_backoff) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
    }
    tracing::info!("telegram polling stopped");
}
