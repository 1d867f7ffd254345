//! Slash commands and free-text replies.

use forgegram_github::IssueState;
use forgegram_telegram::{markdown_v2_link, Message, SendMessageRequest};

use super::{BotRuntime, LinkError, REPO_PICKER_PAGE_SIZE};
use crate::commands::BotCommand;
use crate::correlation::{EntityContext, EntityKind};
use crate::reload_gate::remaining_minutes;
use crate::store::split_full_name;

const WELCOME_TEXT: &str = "Welcome to the GitHub Bot! 🤖

I can help you manage your GitHub repositories and notifications directly from Telegram.

Get Started:
1. Use /connect to link your GitHub account.
2. Use /addrepo to link a repository and start receiving notifications.
3. Use /settings to customize your notification preferences.

Need help? Type /help for a full list of commands.";

const HELP_TEXT: &str = "GitHub Bot Commands:

Account
/connect - Link your GitHub account (must be used in private chat)
/logout - Forget your GitHub token

Repository Management
/addrepo [owner/repo] - Link a repository
/removerepo owner/repo - Unlink a repository
/repos - List linked repositories
/close - Close an issue or PR (reply to notification)
/reopen - Reopen an issue or PR (reply to notification)
/approve - Approve a PR (reply to notification)

Configuration
/settings - Configure event notifications
/reload - Reload admin cache

Reply to a notification with plain text to post it as a comment.";

const PRIVACY_TEXT: &str = "Privacy Policy

1. Data Collection
• Telegram: your user id, chat ids and chat titles, used to route notifications and check permissions.
• GitHub: your OAuth token, encrypted with AES-GCM before it is stored, plus the names of linked repositories and their webhook ids.
• Events: webhook payloads are processed in memory and never stored.

2. Data Usage
Your data is only used to send notifications, manage repository links and perform the actions you request.

3. Data Sharing
Nothing is shared with third parties. GitHub is called only to carry out your requests.

4. Your Control
Use /logout to forget your token and /removerepo to unlink repositories.";

impl BotRuntime {
    pub(super) async fn handle_command(&self, message: &Message, command: BotCommand) {
        let Some(user_id) = message.from.as_ref().map(|user| user.id) else {
            return;
        };
        match command {
            BotCommand::Start => self.reply(message, WELCOME_TEXT).await,
            BotCommand::Help => self.reply(message, HELP_TEXT).await,
            BotCommand::Privacy => self.reply(message, PRIVACY_TEXT).await,
            BotCommand::Connect => self.command_connect(message, user_id).await,
            BotCommand::AddRepo { repo } => {
                self.command_add_repo(message, user_id, repo.as_deref()).await
            }
            BotCommand::RemoveRepo { repo } => {
                self.command_remove_repo(message, user_id, repo.as_deref())
                    .await
            }
            BotCommand::Repos => self.command_repos(message).await,
            BotCommand::Settings => self.command_settings(message, user_id).await,
            BotCommand::Reload => self.command_reload(message, user_id).await,
            BotCommand::Logout => self.command_logout(message, user_id).await,
            BotCommand::Close => {
                self.command_set_state(message, user_id, IssueState::Closed)
                    .await
            }
            BotCommand::Reopen => {
                self.command_set_state(message, user_id, IssueState::Open)
                    .await
            }
            BotCommand::Approve => self.command_approve(message, user_id).await,
        }
    }

    async fn command_connect(&self, message: &Message, user_id: i64) {
        if !message.chat.is_private() {
            self.reply(
                message,
                "⚠️ The /connect command can only be used in a private chat with the bot.",
            )
            .await;
            return;
        }
        let state = self.ctx.oauth_states.issue(user_id);
        let url = match self.ctx.oauth_config.login_url(&state) {
            Ok(url) => url,
            Err(error) => {
                tracing::warn!(user_id, %error, "failed to build oauth login url");
                self.reply(message, "Failed to build the GitHub login link.")
                    .await;
                return;
            }
        };
        let text = format!(
            "Please {} to enable automatic webhook setup and perform actions like approving PRs\\.",
            markdown_v2_link("connect your GitHub account", &url)
        );
        self.send(
            SendMessageRequest::markdown(message.chat.id, text).replying_to(message.message_id),
        )
        .await;
    }

    async fn command_add_repo(&self, message: &Message, user_id: i64, repo: Option<&str>) {
        if !self.is_chat_admin(&message.chat, user_id).await {
            self.reply(message, "Only admins can add repositories.").await;
            return;
        }
        let Some(full_name) = repo else {
            self.send_repo_picker(message, user_id).await;
            return;
        };
        let Some((owner, name)) = split_full_name(full_name) else {
            self.reply(message, "Invalid repository format. Use owner/repo")
                .await;
            return;
        };
        let client = match self.ctx.github_client_for(user_id).await {
            Ok(client) => client,
            Err(error) => {
                self.reply(message, Self::credential_message(&error)).await;
                return;
            }
        };
        let repository = match client.get_repository(owner, name).await {
            Ok(repository) => repository,
            Err(error) if error.is_not_found() => {
                self.reply(
                    message,
                    "❌ Repository not found.\nPlease check the name and ensure you have access.",
                )
                .await;
                return;
            }
            Err(error) => {
                let text = self
                    .github_failure_message(user_id, &error, "Error fetching repository")
                    .await;
                self.reply(message, text).await;
                return;
            }
        };
        let full_name = if repository.full_name.is_empty() {
            full_name.to_string()
        } else {
            repository.full_name.clone()
        };

        match self
            .link_repository(message.chat.id, client.as_ref(), owner, name, &full_name)
            .await
        {
            Ok(link) => {
                self.reply(
                    message,
                    format!("Repository {} linked successfully!", link.repo_full_name),
                )
                .await;
            }
            Err(LinkError::Github(error)) if error.is_not_found() => {
                self.reply(
                    message,
                    format!(
                        "❌ Insufficient permissions.\nYou need admin access to repository {full_name} to create webhooks."
                    ),
                )
                .await;
            }
            Err(LinkError::Github(error)) => {
                let text = self
                    .github_failure_message(user_id, &error, "⚠️ Webhook creation failed")
                    .await;
                self.reply(message, text).await;
            }
            Err(error) => {
                tracing::warn!(chat_id = message.chat.id, %error, "failed to link repository");
                self.reply(message, "Error linking repository.").await;
            }
        }
    }

    async fn send_repo_picker(&self, message: &Message, user_id: i64) {
        let client = match self.ctx.github_client_for(user_id).await {
            Ok(client) => client,
            Err(error) => {
                self.reply(message, Self::credential_message(&error)).await;
                return;
            }
        };
        let page = match client.list_repositories(1, REPO_PICKER_PAGE_SIZE).await {
            Ok(page) => page,
            Err(error) => {
                let text = self
                    .github_failure_message(
                        user_id,
                        &error,
                        "Failed to fetch repositories from GitHub",
                    )
                    .await;
                self.reply(message, text).await;
                return;
            }
        };
        if page.repositories.is_empty() {
            self.reply(message, "No repositories found.").await;
            return;
        }
        let (text, keyboard) = self.repo_picker(&page);
        self.send(
            SendMessageRequest::plain(message.chat.id, text)
                .with_keyboard(keyboard)
                .replying_to(message.message_id),
        )
        .await;
    }

    async fn command_remove_repo(&self, message: &Message, user_id: i64, repo: Option<&str>) {
        if !self.is_chat_admin(&message.chat, user_id).await {
            self.reply(message, "Only admins can remove repositories.").await;
            return;
        }
        let Some(full_name) = repo else {
            self.reply(message, "Usage: /removerepo owner/repo").await;
            return;
        };
        let Some((owner, name)) = split_full_name(full_name) else {
            self.reply(message, "Invalid repository format. Use owner/repo")
                .await;
            return;
        };
        let chat_id = message.chat.id;
        let link = match self.ctx.store.get_repo_link(chat_id, full_name).await {
            Ok(link) => link,
            Err(error) => {
                tracing::warn!(
                    chat_id,
                    error = %format!("{error:#}"),
                    "failed to read repository link"
                );
                self.reply(message, "Error removing repository.").await;
                return;
            }
        };
        let Some(link) = link else {
            self.reply(message, format!("Repository {full_name} is not linked to this chat."))
                .await;
            return;
        };

        if link.webhook_id != 0 {
            match self.ctx.github_client_for(user_id).await {
                Ok(client) => {
                    if let Err(error) = client.delete_hook(owner, name, link.webhook_id).await {
                        if !self.ctx.revoke_on_auth_failure(user_id, &error).await {
                            tracing::warn!(
                                chat_id,
                                repo = full_name,
                                %error,
                                "failed to delete webhook"
                            );
                        }
                    }
                }
                Err(error) => {
                    tracing::debug!(chat_id, %error, "webhook left in place; no usable credential");
                }
            }
        }

        match self.ctx.store.remove_repo_link(chat_id, full_name).await {
            Ok(_) => {
                tracing::info!(chat_id, repo = full_name, "repository unlinked");
                self.reply(message, format!("Repository {full_name} removed successfully."))
                    .await;
            }
            Err(error) => {
                tracing::warn!(
                    chat_id,
                    error = %format!("{error:#}"),
                    "failed to remove repository link"
                );
                self.reply(message, "Error removing repository.").await;
            }
        }
    }

    async fn command_repos(&self, message: &Message) {
        let links = match self.ctx.store.chat_links(message.chat.id).await {
            Ok(links) => links,
            Err(error) => {
                tracing::warn!(
                    chat_id = message.chat.id,
                    error = %format!("{error:#}"),
                    "failed to list links"
                );
                return;
            }
        };
        if links.is_empty() {
            self.reply(message, "No repositories linked.").await;
            return;
        }
        let mut text = String::from("Linked Repositories:\n");
        for link in &links {
            text.push_str("• ");
            text.push_str(&link.repo_full_name);
            text.push('\n');
        }
        self.reply(message, text.trim_end()).await;
    }

    async fn command_settings(&self, message: &Message, user_id: i64) {
        if !self.is_chat_admin(&message.chat, user_id).await {
            self.reply(message, "Only admins can modify settings.").await;
            return;
        }
        let links = match self.ctx.store.chat_links(message.chat.id).await {
            Ok(links) => links,
            Err(error) => {
                tracing::warn!(
                    chat_id = message.chat.id,
                    error = %format!("{error:#}"),
                    "failed to list links"
                );
                return;
            }
        };
        if links.is_empty() {
            self.reply(message, "No repositories linked. Use /addrepo first.")
                .await;
            return;
        }
        self.send(
            SendMessageRequest::plain(message.chat.id, "Select a repository to configure:")
                .with_keyboard(self.linked_repo_keyboard(&links))
                .replying_to(message.message_id),
        )
        .await;
    }

    async fn command_reload(&self, message: &Message, user_id: i64) {
        if !message.chat.is_group() {
            return;
        }
        let chat_id = message.chat.id;
        if let Err(remaining) = self.ctx.reload_gate.check(chat_id) {
            self.reply(
                message,
                format!(
                    "Please wait {} minutes before reloading again.",
                    remaining_minutes(remaining)
                ),
            )
            .await;
            return;
        }
        let status = match self
            .ctx
            .transport
            .get_chat_member_status(chat_id, user_id)
            .await
        {
            Ok(status) => status,
            Err(error) => {
                tracing::warn!(chat_id, user_id, %error, "failed to check member status");
                self.reply(message, "Failed to check permissions.").await;
                return;
            }
        };
        if !status.is_admin() {
            self.reply(message, "Only admins can reload the cache.").await;
            return;
        }
        self.ctx.admins.invalidate(chat_id);
        self.ctx.reload_gate.mark(chat_id);
        tracing::info!(chat_id, user_id, "admin cache reloaded");
        self.reply(message, "Admin cache reloaded.").await;
    }

    async fn command_logout(&self, message: &Message, user_id: i64) {
        match self.ctx.store.clear_user_token(user_id).await {
            Ok(_) => {
                self.reply(message, "✅ You have been logged out. Use /connect to reconnect.")
                    .await;
            }
            Err(error) => {
                tracing::warn!(user_id, error = %format!("{error:#}"), "failed to clear token");
                self.reply(message, "Error logging out.").await;
            }
        }
    }

    /// Looks up the notification `message` replies to, answering the user on a miss.
    async fn replied_entity(&self, message: &Message) -> Option<EntityContext> {
        let Some(replied_to) = message.reply_to_message.as_deref() else {
            self.reply(message, "Please use this command in reply to a notification.")
                .await;
            return None;
        };
        let entity = self
            .ctx
            .correlation
            .resolve_reply(message.chat.id, replied_to.message_id);
        if entity.is_none() {
            self.reply(message, "Context not found. The message might be too old.")
                .await;
        }
        entity
    }

    async fn command_set_state(&self, message: &Message, user_id: i64, state: IssueState) {
        let Some(entity) = self.replied_entity(message).await else {
            return;
        };
        let client = match self.ctx.github_client_for(user_id).await {
            Ok(client) => client,
            Err(error) => {
                self.reply(message, Self::credential_message(&error)).await;
                return;
            }
        };
        let result = client
            .set_issue_state(&entity.owner, &entity.repo, entity.number, state)
            .await;
        let text = match result {
            Ok(()) => {
                let verb = match state {
                    IssueState::Closed => "closed",
                    IssueState::Open => "reopened",
                };
                format!("✅ Issue/PR #{} {verb}.", entity.number)
            }
            Err(error) => {
                self.github_failure_message(user_id, &error, "Failed to update state")
                    .await
            }
        };
        self.reply(message, text).await;
    }

    async fn command_approve(&self, message: &Message, user_id: i64) {
        let Some(entity) = self.replied_entity(message).await else {
            return;
        };
        if !entity.kind.is_reviewable() {
            self.reply(message, "This command is only for Pull Requests.")
                .await;
            return;
        }
        let client = match self.ctx.github_client_for(user_id).await {
            Ok(client) => client,
            Err(error) => {
                self.reply(message, Self::credential_message(&error)).await;
                return;
            }
        };
        let text = match client
            .approve_pull_request(&entity.owner, &entity.repo, entity.number)
            .await
        {
            Ok(()) => format!("✅ PR #{} approved.", entity.number),
            Err(error) => {
                self.github_failure_message(user_id, &error, "Failed to approve")
                    .await
            }
        };
        self.reply(message, text).await;
    }

    /// Posts a free-text reply to a notification as a GitHub comment.
    pub(super) async fn handle_reply(&self, message: &Message, text: &str) {
        let Some(replied_to) = message.reply_to_message.as_deref() else {
            return;
        };
        let Some(user_id) = message.from.as_ref().map(|user| user.id) else {
            return;
        };
        let chat_id = message.chat.id;
        let Some(entity) = self
            .ctx
            .correlation
            .resolve_reply(chat_id, replied_to.message_id)
        else {
            let bot_username = self.ctx.settings.bot_username.as_str();
            let replied_to_bot = replied_to.from.as_ref().is_some_and(|author| {
                author.is_bot
                    && author
                        .username
                        .as_deref()
                        .is_some_and(|name| name.eq_ignore_ascii_case(bot_username))
            });
            if replied_to_bot {
                self.reply(message, "Context not found. The message might be too old.")
                    .await;
            }
            return;
        };
        let client = match self.ctx.github_client_for(user_id).await {
            Ok(client) => client,
            Err(error) => {
                tracing::debug!(chat_id, user_id, %error, "reply ignored; no usable credential");
                return;
            }
        };
        let result = match (entity.kind, entity.comment_id) {
            (EntityKind::PullRequestReviewComment, Some(comment_id)) if comment_id != 0 => {
                client
                    .reply_to_review_comment(
                        &entity.owner,
                        &entity.repo,
                        entity.number,
                        comment_id,
                        text,
                    )
                    .await
            }
            _ => client
                .create_issue_comment(&entity.owner, &entity.repo, entity.number, text)
                .await,
        };
        match result {
            Ok(comment_id) => {
                tracing::info!(
                    chat_id,
                    repo = %entity.full_name(),
                    number = entity.number,
                    comment_id,
                    "reply posted as comment"
                );
            }
            Err(error) => {
                let text = self
                    .github_failure_message(user_id, &error, "Failed to post comment")
                    .await;
                self.reply(message, text).await;
            }
        }
    }
}
