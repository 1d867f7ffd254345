//! Delivery half of the webhook pipeline, run off the request path.

use std::sync::Arc;

use forgegram_github::GithubEvent;
use forgegram_telegram::{InlineKeyboardButton, InlineKeyboardMarkup, SendMessageRequest};

use crate::callback_protocol::CallbackCommand;
use crate::context::BridgeContext;
use crate::correlation::{entity_context_for_event, EntityContext};
use crate::formatter::{normalize_message, Notification, NotificationButton};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent { message_id: i64, correlated: bool },
    Suppressed,
    DeliveryFailed,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    ctx: Arc<BridgeContext>,
}

impl NotificationDispatcher {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self { ctx }
    }

    pub async fn dispatch(
        &self,
        event: &GithubEvent,
        chat_id: i64,
        hook_id: Option<u64>,
    ) -> DispatchOutcome {
        if let GithubEvent::Repository(repository_event) = event {
            if repository_event.action == "renamed" {
                self.apply_rename(chat_id, hook_id, &repository_event.repository.full_name)
                    .await;
            }
        }

        let Some(notification) = self.ctx.formatter.format(event) else {
            tracing::debug!(chat_id, event = event.name(), "notification suppressed");
            return DispatchOutcome::Suppressed;
        };
        let text = normalize_message(&notification.text);
        if text.is_empty() {
            tracing::debug!(chat_id, event = event.name(), "notification suppressed");
            return DispatchOutcome::Suppressed;
        }

        let entity = entity_context_for_event(event);
        let keyboard = self.build_keyboard(&notification, entity.as_ref());
        let request = SendMessageRequest::markdown(chat_id, text).with_keyboard(keyboard);
        let message_id = match self.ctx.transport.send_message(&request).await {
            Ok(message_id) => message_id,
            Err(error) => {
                tracing::warn!(
                    chat_id,
                    event = event.name(),
                    %error,
                    "failed to deliver notification"
                );
                return DispatchOutcome::DeliveryFailed;
            }
        };

        let correlated = match entity {
            Some(entity) => {
                self.ctx
                    .correlation
                    .record_notification(chat_id, message_id, entity);
                true
            }
            None => false,
        };
        tracing::debug!(chat_id, message_id, event = event.name(), correlated, "notification sent");
        DispatchOutcome::Sent {
            message_id,
            correlated,
        }
    }

    async fn apply_rename(&self, chat_id: i64, hook_id: Option<u64>, new_full_name: &str) {
        let Some(hook_id) = hook_id.filter(|id| *id != 0) else {
            return;
        };
        if new_full_name.is_empty() {
            return;
        }
        match self
            .ctx
            .store
            .update_repo_link_name(chat_id, hook_id, new_full_name)
            .await
        {
            Ok(true) => {
                tracing::info!(chat_id, hook_id, repo = new_full_name, "repository link renamed");
            }
            Ok(false) => {
                tracing::warn!(
                    chat_id,
                    hook_id,
                    repo = new_full_name,
                    "no repository link matched rename"
                );
            }
            Err(error) => {
                tracing::warn!(
                    chat_id,
                    hook_id,
                    error = %format!("{error:#}"),
                    "failed to rename repository link"
                );
            }
        }
    }

    fn build_keyboard(
        &self,
        notification: &Notification,
        entity: Option<&EntityContext>,
    ) -> InlineKeyboardMarkup {
        let mut links = Vec::new();
        let mut actions = Vec::new();
        let mut action_token = None;
        for button in &notification.buttons {
            match button {
                NotificationButton::Link { label, url } => {
                    links.push(InlineKeyboardButton::link(label.as_str(), url.as_str()));
                }
                NotificationButton::Approve | NotificationButton::ClosePullRequest => {
                    let Some(entity) = entity.filter(|entity| entity.kind.is_reviewable()) else {
                        continue;
                    };
                    let token = action_token
                        .get_or_insert_with(|| {
                            self.ctx.correlation.issue_action_token(entity.clone())
                        })
                        .clone();
                    let (label, command) = match button {
                        NotificationButton::Approve => {
                            ("✅ Approve", CallbackCommand::Approve { token })
                        }
                        _ => ("❌ Close", CallbackCommand::ClosePullRequest { token }),
                    };
                    match self.ctx.callbacks.encode(&command) {
                        Some(data) => actions.push(InlineKeyboardButton::callback(label, data)),
                        None => tracing::debug!(
                            ?command,
                            "callback payload too long; button skipped"
                        ),
                    }
                }
            }
        }
        let rows = [links, actions]
            .into_iter()
            .filter(|row| !row.is_empty())
            .collect();
        InlineKeyboardMarkup::new(rows)
    }
}
