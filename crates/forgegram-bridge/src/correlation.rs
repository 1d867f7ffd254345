//! Links sent notifications back to the GitHub entity they describe.
//!
//! Two independent tables: message context keyed by `(chat, message)` for replies,
//! and random action tokens for inline buttons whose payload must stay short.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use forgegram_core::{Clock, SystemClock, TtlStore};
use forgegram_github::GithubEvent;

use crate::sealing::random_bytes;

pub const DEFAULT_MESSAGE_RETENTION: Duration = Duration::from_secs(48 * 60 * 60);
pub const DEFAULT_ACTION_TTL: Duration = Duration::from_secs(48 * 60 * 60);
const ACTION_TOKEN_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Issue,
    PullRequest,
    IssueComment,
    PullRequestReview,
    PullRequestReviewComment,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::PullRequest => "pr",
            Self::IssueComment => "issue_comment",
            Self::PullRequestReview => "pr_review",
            Self::PullRequestReviewComment => "pr_review_comment",
        }
    }

    /// Kinds whose number refers to a pull request that can be reviewed.
    pub fn is_reviewable(self) -> bool {
        matches!(self, Self::PullRequest | Self::PullRequestReview)
    }
}

/// Minimal reference needed to act on a notification later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityContext {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub comment_id: Option<u64>,
    pub kind: EntityKind,
}

impl EntityContext {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Extracts the correlation context for event kinds users can reply to.
pub fn entity_context_for_event(event: &GithubEvent) -> Option<EntityContext> {
    let (repository, number, comment_id, kind) = match event {
        GithubEvent::PullRequest(event) => (
            &event.repository,
            event.pull_request.number,
            None,
            EntityKind::PullRequest,
        ),
        GithubEvent::Issues(event) => (
            &event.repository,
            event.issue.number,
            None,
            EntityKind::Issue,
        ),
        GithubEvent::IssueComment(event) => (
            &event.repository,
            event.issue.number,
            Some(event.comment.id),
            EntityKind::IssueComment,
        ),
        GithubEvent::PullRequestReview(event) => (
            &event.repository,
            event.pull_request.number,
            None,
            EntityKind::PullRequestReview,
        ),
        GithubEvent::PullRequestReviewComment(event) => (
            &event.repository,
            event.pull_request.number,
            Some(event.comment.id),
            EntityKind::PullRequestReviewComment,
        ),
        _ => return None,
    };
    let (owner, repo) = repository.owner_and_name();
    if owner.is_empty() || repo.is_empty() || number == 0 {
        return None;
    }
    Some(EntityContext {
        owner,
        repo,
        number,
        comment_id: comment_id.filter(|id| *id != 0),
        kind,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationConfig {
    pub message_retention: Duration,
    pub action_ttl: Duration,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            message_retention: DEFAULT_MESSAGE_RETENTION,
            action_ttl: DEFAULT_ACTION_TTL,
        }
    }
}

#[derive(Debug)]
pub struct CorrelationManager {
    messages: TtlStore<String, EntityContext>,
    actions: TtlStore<String, EntityContext>,
    config: CorrelationConfig,
}

impl CorrelationManager {
    pub fn new(config: CorrelationConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CorrelationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            messages: TtlStore::with_clock(clock.clone()),
            actions: TtlStore::with_clock(clock),
            config,
        }
    }

    pub fn record_notification(&self, chat_id: i64, message_id: i64, context: EntityContext) {
        self.messages.set(
            message_key(chat_id, message_id),
            context,
            self.config.message_retention,
        );
    }

    pub fn resolve_reply(&self, chat_id: i64, replied_to_message_id: i64) -> Option<EntityContext> {
        self.messages
            .get(&message_key(chat_id, replied_to_message_id))
    }

    /// Stores `context` behind a fresh 128-bit token safe to embed in callback data.
    pub fn issue_action_token(&self, context: EntityContext) -> String {
        let token = URL_SAFE_NO_PAD.encode(random_bytes::<ACTION_TOKEN_BYTES>());
        self.actions
            .set(token.clone(), context, self.config.action_ttl);
        token
    }

    /// Looks up a button token. The token stays valid so a failed action can be retried.
    pub fn resolve_action(&self, token: &str) -> Option<EntityContext> {
        if token.is_empty() {
            return None;
        }
        self.actions.get(&token.to_string())
    }

    pub fn revoke_action(&self, token: &str) {
        self.actions.delete(&token.to_string());
    }

    /// Evicts expired entries from both tables; returns `(messages, actions)` evicted.
    pub fn cleanup(&self) -> (usize, usize) {
        (self.messages.cleanup(), self.actions.cleanup())
    }
}

fn message_key(chat_id: i64, message_id: i64) -> String {
    format!("{chat_id}:{message_id}")
}
