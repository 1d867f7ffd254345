//! Inline-button presses: the settings menus and PR action buttons.

use std::collections::BTreeSet;

use forgegram_github::{GithubApiError, GithubHook, SUPPORTED_EVENTS};
use forgegram_telegram::{
    CallbackQuery, EditMessageRequest, InlineKeyboardButton, InlineKeyboardMarkup, Message,
};

use super::{BotRuntime, REPO_PICKER_PAGE_SIZE};
use crate::callback_protocol::{CallbackCommand, PresetMode};
use crate::store::RepoLink;

const WILDCARD_EVENT: &str = "*";

/// Toast shown when the press is answered.
struct Toast {
    text: String,
    alert: bool,
}

impl Toast {
    fn alert(text: impl Into<String>) -> Option<Self> {
        Some(Self {
            text: text.into(),
            alert: true,
        })
    }

    fn notice(text: impl Into<String>) -> Option<Self> {
        Some(Self {
            text: text.into(),
            alert: false,
        })
    }
}

/// Chat and user a press came from, plus the message that carries the keyboard.
struct Press<'a> {
    user_id: i64,
    message: &'a Message,
}

impl Press<'_> {
    fn chat_id(&self) -> i64 {
        self.message.chat.id
    }

    fn edit(&self, text: impl Into<String>) -> EditMessageRequest {
        EditMessageRequest::plain(self.message.chat.id, self.message.message_id, text)
    }
}

impl BotRuntime {
    pub(super) async fn handle_callback(&self, query: &CallbackQuery) {
        let toast = self.route_callback(query).await;
        let (text, alert) = match &toast {
            Some(toast) => (Some(toast.text.as_str()), toast.alert),
            None => (None, false),
        };
        if let Err(error) = self
            .ctx
            .transport
            .answer_callback_query(&query.id, text, alert)
            .await
        {
            tracing::warn!(callback_id = %query.id, %error, "failed to answer callback query");
        }
    }

    async fn route_callback(&self, query: &CallbackQuery) -> Option<Toast> {
        let data = query.data.as_deref()?;
        let Some(command) = self.ctx.callbacks.decode(data) else {
            tracing::debug!(data, "ignoring unrecognized callback payload");
            return None;
        };
        let message = query.message.as_ref()?;
        self.track_chat(&message.chat).await;
        let press = Press {
            user_id: query.from.id,
            message,
        };
        if command.is_configuration() && !self.is_chat_admin(&message.chat, press.user_id).await {
            return Toast::alert("Only admins can change settings");
        }

        match command {
            CallbackCommand::ListRepos => self.show_linked_repos(&press).await,
            CallbackCommand::RepoPickerPage { page } => self.show_repo_picker(&press, page).await,
            CallbackCommand::LinkRepoById { repo_id } => {
                self.link_repo_by_id(&press, repo_id).await
            }
            CallbackCommand::RepoMenu { repo } => match self.linked(&press, &repo).await {
                Ok(link) => self.show_repo_menu(&press, &link).await,
                Err(toast) => toast,
            },
            CallbackCommand::ApplyPreset { repo, mode } => match self.linked(&press, &repo).await {
                Ok(link) => self.apply_preset(&press, &link, mode).await,
                Err(toast) => toast,
            },
            CallbackCommand::EventPage { repo, page } => match self.linked(&press, &repo).await {
                Ok(link) => self.show_event_page(&press, &link, page).await,
                Err(toast) => toast,
            },
            CallbackCommand::ToggleEvent { repo, event, page } => {
                match self.linked(&press, &repo).await {
                    Ok(link) => self.toggle_event(&press, &link, &event, page).await,
                    Err(toast) => toast,
                }
            }
            CallbackCommand::Approve { token } => self.run_pr_action(&press, &token, true).await,
            CallbackCommand::ClosePullRequest { token } => {
                self.run_pr_action(&press, &token, false).await
            }
        }
    }

    /// The chat's link for `repo`, or the toast to answer with.
    async fn linked(&self, press: &Press<'_>, repo: &str) -> Result<RepoLink, Option<Toast>> {
        match self.ctx.store.get_repo_link(press.chat_id(), repo).await {
            Ok(Some(link)) => Ok(link),
            Ok(None) => Err(Toast::notice("Repo not found")),
            Err(error) => {
                tracing::warn!(
                    chat_id = press.chat_id(),
                    error = %format!("{error:#}"),
                    "failed to read repository link"
                );
                Err(Toast::notice("Repo not found"))
            }
        }
    }

    async fn show_linked_repos(&self, press: &Press<'_>) -> Option<Toast> {
        let links = match self.ctx.store.chat_links(press.chat_id()).await {
            Ok(links) => links,
            Err(error) => {
                tracing::warn!(
                    chat_id = press.chat_id(),
                    error = %format!("{error:#}"),
                    "failed to list links"
                );
                return Toast::alert("Failed to load linked repositories.");
            }
        };
        if links.is_empty() {
            self.edit(press.edit("No repositories linked. Use /addrepo first."))
                .await;
            return None;
        }
        self.edit(
            press
                .edit("Select a repository to configure:")
                .with_keyboard(self.linked_repo_keyboard(&links)),
        )
        .await;
        None
    }

    async fn show_repo_picker(&self, press: &Press<'_>, page: u32) -> Option<Toast> {
        let client = match self.ctx.github_client_for(press.user_id).await {
            Ok(client) => client,
            Err(_) => return Toast::alert("Auth error. Please /connect again."),
        };
        let listing = match client.list_repositories(page, REPO_PICKER_PAGE_SIZE).await {
            Ok(listing) => listing,
            Err(error) => return self.github_toast(press, &error, "GitHub API error").await,
        };
        if listing.repositories.is_empty() {
            self.edit(press.edit("No repositories found.")).await;
            return None;
        }
        let (text, keyboard) = self.repo_picker(&listing);
        self.edit(press.edit(text).with_keyboard(keyboard)).await;
        None
    }

    async fn link_repo_by_id(&self, press: &Press<'_>, repo_id: u64) -> Option<Toast> {
        let client = match self.ctx.github_client_for(press.user_id).await {
            Ok(client) => client,
            Err(_) => return Toast::alert("Please /connect to GitHub first."),
        };
        let repository = match client.get_repository_by_id(repo_id).await {
            Ok(repository) => repository,
            Err(error) if error.is_auth_failure() => {
                return self.github_toast(press, &error, "Repo not found or access denied").await;
            }
            Err(error) => {
                tracing::warn!(repo_id, %error, "failed to fetch repository");
                return Toast::alert("Repo not found or access denied.");
            }
        };
        let (owner, name) = repository.owner_and_name();
        if owner.is_empty() || name.is_empty() {
            return Toast::alert("Repo not found or access denied.");
        }
        let full_name = format!("{owner}/{name}");
        match self
            .link_repository(press.chat_id(), client.as_ref(), &owner, &name, &full_name)
            .await
        {
            Ok(link) => {
                self.edit(press.edit(format!(
                    "✅ Repository {} linked successfully!",
                    link.repo_full_name
                )))
                .await;
                None
            }
            Err(super::LinkError::Github(error)) => {
                if self.ctx.revoke_on_auth_failure(press.user_id, &error).await {
                    return Toast::alert("GitHub auth error. Token revoked or expired.");
                }
                self.edit(press.edit(format!(
                    "Webhook creation failed: {}. Check permissions",
                    error.user_message()
                )))
                .await;
                None
            }
            Err(error) => {
                tracing::warn!(chat_id = press.chat_id(), %error, "failed to link repository");
                Toast::alert("Error linking repository.")
            }
        }
    }

    async fn show_repo_menu(&self, press: &Press<'_>, link: &RepoLink) -> Option<Toast> {
        let repo = link.repo_full_name.clone();
        let entries = [
            (
                "Just the push event",
                CallbackCommand::ApplyPreset {
                    repo: repo.clone(),
                    mode: PresetMode::PushOnly,
                },
            ),
            (
                "Send me everything",
                CallbackCommand::ApplyPreset {
                    repo: repo.clone(),
                    mode: PresetMode::Everything,
                },
            ),
            (
                "Let me select individual events",
                CallbackCommand::EventPage {
                    repo: repo.clone(),
                    page: 1,
                },
            ),
            ("🔙 Back to Repo List", CallbackCommand::ListRepos),
        ];
        let rows = entries
            .into_iter()
            .filter_map(|(label, command)| {
                let data = self.ctx.callbacks.encode(&command)?;
                Some(vec![InlineKeyboardButton::callback(label, data)])
            })
            .collect();
        self.edit(
            press
                .edit(format!("Configuration for {repo}:"))
                .with_keyboard(InlineKeyboardMarkup::new(rows)),
        )
        .await;
        None
    }

    async fn apply_preset(
        &self,
        press: &Press<'_>,
        link: &RepoLink,
        mode: PresetMode,
    ) -> Option<Toast> {
        let (owner, name) = link.owner_and_name()?;
        let client = match self.ctx.github_client_for(press.user_id).await {
            Ok(client) => client,
            Err(_) => return Toast::alert("Please /connect to GitHub first."),
        };
        if let Err(error) = client
            .update_hook_events(owner, name, link.webhook_id, &mode.hook_events())
            .await
        {
            return self
                .github_toast(press, &error, "Failed to update GitHub hook")
                .await;
        }
        tracing::info!(
            chat_id = press.chat_id(),
            repo = %link.repo_full_name,
            preset = mode.as_str(),
            "hook preset applied"
        );
        let text = match mode {
            PresetMode::PushOnly => {
                "✅ Success! I've updated the repository settings to send push events only."
            }
            PresetMode::Everything => {
                "✅ Success! I've updated the repository settings to send everything."
            }
        };
        self.edit(press.edit(text).with_keyboard(self.back_to_menu(link)))
            .await;
        None
    }

    async fn show_event_page(
        &self,
        press: &Press<'_>,
        link: &RepoLink,
        page: u32,
    ) -> Option<Toast> {
        let (owner, name) = link.owner_and_name()?;
        let client = match self.ctx.github_client_for(press.user_id).await {
            Ok(client) => client,
            Err(_) => {
                self.edit(press.edit(
                    "Error: You must be connected to GitHub to view/edit settings.",
                ))
                .await;
                return None;
            }
        };
        let hook = match client.get_hook(owner, name, link.webhook_id).await {
            Ok(hook) => hook,
            Err(error) => {
                if self.ctx.revoke_on_auth_failure(press.user_id, &error).await {
                    return Toast::alert("GitHub auth error. Token revoked or expired.");
                }
                tracing::warn!(repo = %link.repo_full_name, %error, "failed to fetch hook");
                self.edit(press.edit(
                    "Error fetching webhook settings from GitHub. Check permissions.",
                ))
                .await;
                return None;
            }
        };
        self.render_event_page(press, link, &hook, page).await;
        None
    }

    async fn toggle_event(
        &self,
        press: &Press<'_>,
        link: &RepoLink,
        event: &str,
        page: u32,
    ) -> Option<Toast> {
        let (owner, name) = link.owner_and_name()?;
        let client = match self.ctx.github_client_for(press.user_id).await {
            Ok(client) => client,
            Err(_) => return Toast::alert("Please /connect to GitHub first."),
        };
        let hook = match client.get_hook(owner, name, link.webhook_id).await {
            Ok(hook) => hook,
            Err(error) => {
                return self
                    .github_toast(press, &error, "Failed to fetch GitHub settings")
                    .await;
            }
        };
        let events = toggled_events(&hook.events, event);
        let updated = match client
            .update_hook_events(owner, name, link.webhook_id, &events)
            .await
        {
            Ok(updated) => updated,
            Err(error) => {
                return self
                    .github_toast(press, &error, "Failed to update GitHub")
                    .await;
            }
        };
        tracing::info!(
            chat_id = press.chat_id(),
            repo = %link.repo_full_name,
            event,
            "hook event toggled"
        );
        self.render_event_page(press, link, &updated, page).await;
        None
    }

    async fn render_event_page(
        &self,
        press: &Press<'_>,
        link: &RepoLink,
        hook: &GithubHook,
        page: u32,
    ) {
        let enabled = enabled_events(&hook.events);
        let mut rows = Vec::new();
        let mut row = Vec::new();
        for event in SUPPORTED_EVENTS.iter() {
            let command = CallbackCommand::ToggleEvent {
                repo: link.repo_full_name.clone(),
                event: event.name.to_string(),
                page,
            };
            let Some(data) = self.ctx.callbacks.encode(&command) else {
                continue;
            };
            let status = if enabled.contains(event.name) { "✅" } else { "❌" };
            row.push(InlineKeyboardButton::callback(
                format!("{status} {}", event.label),
                data,
            ));
            if row.len() == 2 {
                rows.push(std::mem::take(&mut row));
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        if let Some((owner, name)) = link.owner_and_name() {
            rows.push(vec![InlineKeyboardButton::link(
                "🌐 Edit more on GitHub",
                format!(
                    "https://github.com/{owner}/{name}/settings/hooks/{}",
                    link.webhook_id
                ),
            )]);
        }
        rows.extend(self.back_to_menu(link).inline_keyboard);
        self.edit(
            press
                .edit(format!("Individual Events for {}:", link.repo_full_name))
                .with_keyboard(InlineKeyboardMarkup::new(rows)),
        )
        .await;
    }

    fn back_to_menu(&self, link: &RepoLink) -> InlineKeyboardMarkup {
        let rows = self
            .ctx
            .callbacks
            .encode(&CallbackCommand::RepoMenu {
                repo: link.repo_full_name.clone(),
            })
            .map(|data| vec![vec![InlineKeyboardButton::callback("🔙 Back", data)]])
            .unwrap_or_default();
        InlineKeyboardMarkup::new(rows)
    }

    async fn run_pr_action(&self, press: &Press<'_>, token: &str, approve: bool) -> Option<Toast> {
        let Some(entity) = self.ctx.correlation.resolve_action(token) else {
            return Toast::alert("Action expired. Please open the PR link manually.");
        };
        let full_name = entity.full_name();
        match self.ctx.store.get_repo_link(press.chat_id(), &full_name).await {
            Ok(Some(_)) => {}
            Ok(None) => return Toast::alert("This chat is not linked to the repo."),
            Err(error) => {
                tracing::warn!(
                    chat_id = press.chat_id(),
                    error = %format!("{error:#}"),
                    "failed to read repository link"
                );
                return Toast::alert("This chat is not linked to the repo.");
            }
        }
        let client = match self.ctx.github_client_for(press.user_id).await {
            Ok(client) => client,
            Err(error) => return Toast::alert(Self::credential_message(&error)),
        };
        let (result, done) = if approve {
            (
                client
                    .approve_pull_request(&entity.owner, &entity.repo, entity.number)
                    .await,
                "Approved!",
            )
        } else {
            (
                client
                    .close_pull_request(&entity.owner, &entity.repo, entity.number)
                    .await,
                "Closed!",
            )
        };
        match result {
            Ok(()) => {
                tracing::info!(
                    chat_id = press.chat_id(),
                    repo = %full_name,
                    number = entity.number,
                    action = if approve { "approve" } else { "close" },
                    "pull request action applied"
                );
                Toast::alert(done)
            }
            Err(error) => self.github_toast(press, &error, "Failed").await,
        }
    }

    async fn github_toast(
        &self,
        press: &Press<'_>,
        error: &GithubApiError,
        prefix: &str,
    ) -> Option<Toast> {
        if self.ctx.revoke_on_auth_failure(press.user_id, error).await {
            return Toast::alert("GitHub auth error. Token revoked or expired.");
        }
        tracing::warn!(chat_id = press.chat_id(), %error, "github request failed");
        Toast::alert(format!("{prefix}: {}", error.user_message()))
    }
}

/// Hook events with `*` expanded to the supported catalog.
fn enabled_events(events: &[String]) -> BTreeSet<String> {
    let mut enabled = BTreeSet::new();
    for event in events {
        if event == WILDCARD_EVENT {
            enabled.extend(SUPPORTED_EVENTS.iter().map(|event| event.name.to_string()));
        } else {
            enabled.insert(event.clone());
        }
    }
    enabled
}

/// Event list after flipping `event`, preserving the order GitHub reported.
pub(super) fn toggled_events(current: &[String], event: &str) -> Vec<String> {
    let mut events = Vec::new();
    for name in current {
        if name == WILDCARD_EVENT {
            for supported in SUPPORTED_EVENTS.iter() {
                if !events.iter().any(|existing: &String| existing == supported.name) {
                    events.push(supported.name.to_string());
                }
            }
        } else if !events.contains(name) {
            events.push(name.clone());
        }
    }
    match events.iter().position(|name| name == event) {
        Some(index) => {
            events.remove(index);
        }
        None => events.push(event.to_string()),
    }
    events
}
