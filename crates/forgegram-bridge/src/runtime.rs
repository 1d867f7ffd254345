//! Telegram update handling: chat tracking, commands, replies and button presses.

use std::sync::Arc;

use async_trait::async_trait;
use forgegram_github::{default_hook_events, GithubApi, GithubApiError, HookSpec, RepositoryPage};
use forgegram_telegram::{
    Chat, ChatKind, EditMessageRequest, InlineKeyboardButton, InlineKeyboardMarkup, Message,
    SendMessageRequest, Update, UpdateHandler,
};
use thiserror::Error;

use crate::callback_protocol::CallbackCommand;
use crate::commands::{parse_bot_command, starts_with_command};
use crate::context::{BridgeContext, CredentialError};
use crate::sealing::SealError;
use crate::store::RepoLink;

mod callback_handlers;
mod command_handlers;
#[cfg(test)]
mod tests;

pub const REPO_PICKER_PAGE_SIZE: u32 = 5;

const AUTH_FAILURE_NOTICE: &str =
    "⚠️ GitHub authentication failed.\nIt seems your token has expired or was revoked. Please /connect again.";

#[derive(Debug, Error)]
pub(crate) enum LinkError {
    #[error("failed to generate webhook token")]
    Token(#[from] SealError),
    #[error(transparent)]
    Github(#[from] GithubApiError),
    #[error("failed to store repository link: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Clone)]
pub struct BotRuntime {
    ctx: Arc<BridgeContext>,
}

impl BotRuntime {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    pub async fn handle(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_message(&message).await;
        } else if let Some(query) = update.callback_query {
            self.handle_callback(&query).await;
        }
    }

    async fn handle_message(&self, message: &Message) {
        self.track_chat(&message.chat).await;
        let Some(text) = message.text.as_deref() else {
            return;
        };
        if let Some(command) = parse_bot_command(text, &self.ctx.settings.bot_username) {
            tracing::debug!(
                chat_id = message.chat.id,
                command = command.name(),
                "command received"
            );
            self.handle_command(message, command).await;
            return;
        }
        if is_command_message(message, text) {
            return;
        }
        if message.reply_to_message.is_some() && !text.trim().is_empty() {
            self.handle_reply(message, text).await;
        }
    }

    async fn track_chat(&self, chat: &Chat) {
        if let Err(error) = self
            .ctx
            .store
            .upsert_chat(chat.id, chat_kind_label(chat.kind), chat.title.as_deref())
            .await
        {
            tracing::warn!(
                chat_id = chat.id,
                error = %format!("{error:#}"),
                "failed to track chat"
            );
        }
    }

    pub(crate) async fn send(&self, request: SendMessageRequest) {
        if let Err(error) = self.ctx.transport.send_message(&request).await {
            tracing::warn!(chat_id = request.chat_id, %error, "failed to send message");
        }
    }

    pub(crate) async fn reply(&self, message: &Message, text: impl Into<String>) {
        self.send(SendMessageRequest::plain(message.chat.id, text).replying_to(message.message_id))
            .await;
    }

    pub(crate) async fn edit(&self, request: EditMessageRequest) {
        if let Err(error) = self.ctx.transport.edit_message_text(&request).await {
            tracing::warn!(chat_id = request.chat_id, %error, "failed to edit message");
        }
    }

    /// Private chats have no admins to check against.
    pub(crate) async fn is_chat_admin(&self, chat: &Chat, user_id: i64) -> bool {
        if chat.is_private() {
            return true;
        }
        self.ctx
            .admins
            .is_admin(self.ctx.transport.as_ref(), chat.id, user_id)
            .await
    }

    /// User-facing text for a failed credential lookup.
    pub(crate) fn credential_message(error: &CredentialError) -> &'static str {
        match error {
            CredentialError::NotConnected => "Please /connect your GitHub account first.",
            CredentialError::Unreadable | CredentialError::Client(_) => {
                "Auth error. Reconnect via /connect"
            }
            CredentialError::Store(_) => "Failed to read your account. Please try again.",
        }
    }

    /// Clears the credential on 401/403; otherwise formats the upstream message after `prefix`.
    pub(crate) async fn github_failure_message(
        &self,
        user_id: i64,
        error: &GithubApiError,
        prefix: &str,
    ) -> String {
        if self.ctx.revoke_on_auth_failure(user_id, error).await {
            return AUTH_FAILURE_NOTICE.to_string();
        }
        tracing::warn!(user_id, %error, "github request failed");
        format!("{prefix}: {}", error.user_message())
    }

    /// Creates the webhook for `full_name` and stores the link for `chat_id`.
    pub(crate) async fn link_repository(
        &self,
        chat_id: i64,
        client: &dyn GithubApi,
        owner: &str,
        name: &str,
        full_name: &str,
    ) -> Result<RepoLink, LinkError> {
        let spec = HookSpec {
            url: self.ctx.webhook_url(chat_id)?,
            secret: self.ctx.settings.webhook_secret.clone(),
            events: default_hook_events(),
        };
        let hook = client.create_hook(owner, name, &spec).await?;
        let link = RepoLink {
            repo_full_name: full_name.to_string(),
            webhook_id: hook.id,
        };
        self.ctx
            .store
            .upsert_repo_link(chat_id, link.clone())
            .await
            .map_err(LinkError::Store)?;
        tracing::info!(chat_id, repo = full_name, hook_id = hook.id, "repository linked");
        Ok(link)
    }

    /// Picker text and keyboard for one page of the user's repositories.
    pub(crate) fn repo_picker(&self, page: &RepositoryPage) -> (String, InlineKeyboardMarkup) {
        let mut rows = page
            .repositories
            .iter()
            .filter_map(|repository| {
                let data = self.ctx.callbacks.encode(&CallbackCommand::LinkRepoById {
                    repo_id: repository.id,
                })?;
                Some(vec![InlineKeyboardButton::callback(
                    repository.full_name.as_str(),
                    data,
                )])
            })
            .collect::<Vec<_>>();

        let current = page.page.max(1);
        let mut navigation = Vec::new();
        let mut push_page = |label: String, target: u32| {
            if let Some(data) = self
                .ctx
                .callbacks
                .encode(&CallbackCommand::RepoPickerPage { page: target })
            {
                navigation.push(InlineKeyboardButton::callback(label, data));
            }
        };
        if let Some(prev) = page.prev_page {
            push_page("< Prev".to_string(), prev);
        }
        let start = current.saturating_sub(1).max(1);
        let end = match (page.last_page, page.next_page) {
            (Some(last), _) => current.saturating_add(1).min(last.max(current)),
            (None, Some(next)) => next,
            (None, None) => current,
        };
        for number in start..=end {
            let label = if number == current {
                format!("· {number} ·")
            } else {
                number.to_string()
            };
            push_page(label, number);
        }
        if let Some(next) = page.next_page {
            push_page("Next >".to_string(), next);
        }
        if navigation.len() > 1 {
            rows.push(navigation);
        }
        (
            format!("Select a repository to add (Page {current}):"),
            InlineKeyboardMarkup::new(rows),
        )
    }

    /// One button per linked repository, opening its settings menu.
    pub(crate) fn linked_repo_keyboard(&self, links: &[RepoLink]) -> InlineKeyboardMarkup {
        let rows = links
            .iter()
            .filter_map(|link| {
                let data = self.ctx.callbacks.encode(&CallbackCommand::RepoMenu {
                    repo: link.repo_full_name.clone(),
                })?;
                Some(vec![InlineKeyboardButton::callback(
                    link.repo_full_name.as_str(),
                    data,
                )])
            })
            .collect();
        InlineKeyboardMarkup::new(rows)
    }
}

#[async_trait]
impl UpdateHandler for BotRuntime {
    async fn handle_update(&self, update: Update) {
        self.handle(update).await;
    }
}

fn chat_kind_label(kind: ChatKind) -> &'static str {
    match kind {
        ChatKind::Private => "private",
        ChatKind::Group => "group",
        ChatKind::Supergroup => "supergroup",
        ChatKind::Channel => "channel",
    }
}

fn is_command_message(message: &Message, text: &str) -> bool {
    let leading_command_entity = message
        .entities
        .first()
        .is_some_and(|entity| entity.offset == 0 && entity.kind == "bot_command");
    leading_command_entity || starts_with_command(text)
}
