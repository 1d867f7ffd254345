//! Persistent bridge state: connected users, tracked chats and their repository links.

use std::path::{Path, PathBuf};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use forgegram_core::write_text_atomic;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub const BRIDGE_STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub telegram_id: i64,
    #[serde(default)]
    pub github_user_id: u64,
    #[serde(default)]
    pub github_login: String,
    /// OAuth token sealed with the bridge cipher; empty once logged out.
    #[serde(default)]
    pub sealed_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoLink {
    pub repo_full_name: String,
    #[serde(default)]
    pub webhook_id: u64,
}

impl RepoLink {
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        split_full_name(&self.repo_full_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChat {
    pub chat_id: i64,
    #[serde(default)]
    pub chat_kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub links: Vec<RepoLink>,
}

/// Splits `owner/name`; both halves must be non-empty.
pub fn split_full_name(full_name: &str) -> Option<(&str, &str)> {
    match full_name.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Some((owner, name))
        }
        _ => None,
    }
}

#[async_trait]
pub trait BridgeStore: Send + Sync {
    async fn get_user(&self, telegram_id: i64) -> Result<Option<StoredUser>>;
    async fn upsert_user(&self, user: StoredUser) -> Result<()>;
    /// Returns whether a token was actually cleared.
    async fn clear_user_token(&self, telegram_id: i64) -> Result<bool>;
    async fn upsert_chat(&self, chat_id: i64, chat_kind: &str, title: Option<&str>) -> Result<()>;
    async fn chat_links(&self, chat_id: i64) -> Result<Vec<RepoLink>>;
    async fn get_repo_link(&self, chat_id: i64, repo_full_name: &str) -> Result<Option<RepoLink>>;
    /// Replaces any existing link for the same repository name.
    async fn upsert_repo_link(&self, chat_id: i64, link: RepoLink) -> Result<()>;
    async fn remove_repo_link(&self, chat_id: i64, repo_full_name: &str) -> Result<bool>;
    /// Renames the link created by `webhook_id`; `false` when no link matches.
    async fn update_repo_link_name(
        &self,
        chat_id: i64,
        webhook_id: u64,
        new_full_name: &str,
    ) -> Result<bool>;

    async fn sealed_user_token(&self, telegram_id: i64) -> Result<Option<String>> {
        Ok(self
            .get_user(telegram_id)
            .await?
            .map(|user| user.sealed_token)
            .filter(|token| !token.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BridgeStateFile {
    schema_version: u32,
    #[serde(default)]
    users: Vec<StoredUser>,
    #[serde(default)]
    chats: Vec<StoredChat>,
}

impl Default for BridgeStateFile {
    fn default() -> Self {
        Self {
            schema_version: BRIDGE_STATE_SCHEMA_VERSION,
            users: Vec::new(),
            chats: Vec::new(),
        }
    }
}

impl BridgeStateFile {
    fn chat_mut(&mut self, chat_id: i64) -> &mut StoredChat {
        let index = match self.chats.iter().position(|chat| chat.chat_id == chat_id) {
            Some(index) => index,
            None => {
                self.chats.push(StoredChat {
                    chat_id,
                    chat_kind: String::new(),
                    title: None,
                    links: Vec::new(),
                });
                self.chats.len() - 1
            }
        };
        &mut self.chats[index]
    }

    fn chat(&self, chat_id: i64) -> Option<&StoredChat> {
        self.chats.iter().find(|chat| chat.chat_id == chat_id)
    }
}

/// JSON document store rewritten atomically after every change.
#[derive(Debug)]
pub struct FileBridgeStore {
    path: PathBuf,
    state: Mutex<BridgeStateFile>,
}

impl FileBridgeStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = load_bridge_state(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T>(&self, read: impl FnOnce(&BridgeStateFile) -> T) -> Result<T> {
        let state = self.state.lock().await;
        Ok(read(&state))
    }

    /// Applies `change` to a copy, persists it on the blocking pool, then
    /// publishes it. Nothing is written when the copy is unchanged. The lock
    /// is held across the write so saves land in order.
    async fn mutate<T>(&self, change: impl FnOnce(&mut BridgeStateFile) -> T) -> Result<T> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let outcome = change(&mut next);
        if next != *state {
            let path = self.path.clone();
            let saved = tokio::task::spawn_blocking(move || {
                save_bridge_state(&path, &next).map(|()| next)
            })
            .await
            .map_err(|error| anyhow!("bridge state save task failed: {error}"))??;
            *state = saved;
        }
        Ok(outcome)
    }
}

#[async_trait]
impl BridgeStore for FileBridgeStore {
    async fn get_user(&self, telegram_id: i64) -> Result<Option<StoredUser>> {
        self.read(|state| {
            state
                .users
                .iter()
                .find(|user| user.telegram_id == telegram_id)
                .cloned()
        })
        .await
    }

    async fn upsert_user(&self, user: StoredUser) -> Result<()> {
        self.mutate(|state| {
            match state
                .users
                .iter_mut()
                .find(|existing| existing.telegram_id == user.telegram_id)
            {
                Some(existing) => *existing = user,
                None => state.users.push(user),
            }
        })
        .await
    }

    async fn clear_user_token(&self, telegram_id: i64) -> Result<bool> {
        self.mutate(|state| {
            match state
                .users
                .iter_mut()
                .find(|user| user.telegram_id == telegram_id && !user.sealed_token.is_empty())
            {
                Some(user) => {
                    user.sealed_token.clear();
                    true
                }
                None => false,
            }
        })
        .await
    }

    async fn upsert_chat(&self, chat_id: i64, chat_kind: &str, title: Option<&str>) -> Result<()> {
        self.mutate(|state| {
            let chat = state.chat_mut(chat_id);
            chat.chat_kind = chat_kind.to_string();
            chat.title = title.map(str::to_string);
        })
        .await
    }

    async fn chat_links(&self, chat_id: i64) -> Result<Vec<RepoLink>> {
        self.read(|state| {
            state
                .chat(chat_id)
                .map(|chat| chat.links.clone())
                .unwrap_or_default()
        })
        .await
    }

    async fn get_repo_link(&self, chat_id: i64, repo_full_name: &str) -> Result<Option<RepoLink>> {
        self.read(|state| {
            state.chat(chat_id).and_then(|chat| {
                chat.links
                    .iter()
                    .find(|link| link.repo_full_name == repo_full_name)
                    .cloned()
            })
        })
        .await
    }

    async fn upsert_repo_link(&self, chat_id: i64, link: RepoLink) -> Result<()> {
        if split_full_name(&link.repo_full_name).is_none() {
            bail!("invalid repository name '{}'", link.repo_full_name);
        }
        self.mutate(|state| {
            let chat = state.chat_mut(chat_id);
            chat.links
                .retain(|existing| existing.repo_full_name != link.repo_full_name);
            chat.links.push(link);
        })
        .await
    }

    async fn remove_repo_link(&self, chat_id: i64, repo_full_name: &str) -> Result<bool> {
        self.mutate(|state| {
            let Some(chat) = state.chats.iter_mut().find(|chat| chat.chat_id == chat_id) else {
                return false;
            };
            let before = chat.links.len();
            chat.links
                .retain(|link| link.repo_full_name != repo_full_name);
            chat.links.len() != before
        })
        .await
    }

    async fn update_repo_link_name(
        &self,
        chat_id: i64,
        webhook_id: u64,
        new_full_name: &str,
    ) -> Result<bool> {
        if webhook_id == 0 || split_full_name(new_full_name).is_none() {
            return Ok(false);
        }
        self.mutate(|state| {
            let Some(chat) = state.chats.iter_mut().find(|chat| chat.chat_id == chat_id) else {
                return false;
            };
            let Some(index) = chat
                .links
                .iter()
                .position(|link| link.webhook_id == webhook_id)
            else {
                return false;
            };
            chat.links[index].repo_full_name = new_full_name.to_string();
            let mut seen = false;
            chat.links.retain(|link| {
                if link.repo_full_name != new_full_name {
                    return true;
                }
                if link.webhook_id == webhook_id && !seen {
                    seen = true;
                    return true;
                }
                false
            });
            true
        })
        .await
    }
}

fn load_bridge_state(path: &Path) -> Result<BridgeStateFile> {
    if !path.exists() {
        return Ok(BridgeStateFile::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read bridge state {}", path.display()))?;
    let parsed = serde_json::from_str::<BridgeStateFile>(&raw)
        .with_context(|| format!("failed to parse bridge state {}", path.display()))?;
    if parsed.schema_version != BRIDGE_STATE_SCHEMA_VERSION {
        bail!(
            "unsupported bridge state schema_version {} in {} (expected {})",
            parsed.schema_version,
            path.display(),
            BRIDGE_STATE_SCHEMA_VERSION
        );
    }
    Ok(parsed)
}

fn save_bridge_state(path: &Path, state: &BridgeStateFile) -> Result<()> {
    let mut payload =
        serde_json::to_string_pretty(state).context("failed to encode bridge state")?;
    payload.push('\n');
    write_text_atomic(path, &payload)
        .with_context(|| format!("failed to write bridge state {}", path.display()))
}
