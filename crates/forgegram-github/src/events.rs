//! Typed GitHub webhook payloads.
//!
//! Each documented event kind the bridge renders gets its own variant; any other
//! event name still has to be valid JSON and lands in [`GithubEvent::Other`].

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const GITHUB_EVENT_HEADER: &str = "x-github-event";
pub const GITHUB_HOOK_ID_HEADER: &str = "x-github-hook-id";

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("event type header is missing")]
    MissingEventType,
    #[error("failed to parse '{event}' payload: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubUser {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubRepository {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub owner: GithubUser,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
}

impl GithubRepository {
    /// Splits `full_name` into `(owner, name)`, falling back to the discrete fields.
    pub fn owner_and_name(&self) -> (String, String) {
        match self.full_name.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
                (owner.to_string(), name.to_string())
            }
            _ => (self.owner.login.clone(), self.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubCommitAuthor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubCommit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub author: GithubCommitAuthor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubPullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub user: GithubUser,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubIssue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: GithubUser,
    #[serde(default)]
    pub pull_request: Option<Value>,
}

impl GithubIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubComment {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub user: GithubUser,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubReview {
    pub id: u64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub user: GithubUser,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubRelease {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub prerelease: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubRenameChange {
    #[serde(default)]
    pub from: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubRepositoryChanges {
    #[serde(default)]
    pub repository: Option<GithubRepositoryNameChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubRepositoryNameChange {
    #[serde(default)]
    pub name: Option<GithubRenameChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PingEvent {
    #[serde(default)]
    pub zen: String,
    #[serde(default)]
    pub hook_id: u64,
    #[serde(default)]
    pub repository: Option<GithubRepository>,
    #[serde(default)]
    pub sender: GithubUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub commits: Vec<GithubCommit>,
    #[serde(default)]
    pub head_commit: Option<GithubCommit>,
    #[serde(default)]
    pub compare: String,
    #[serde(default)]
    pub forced: bool,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub deleted: bool,
    pub repository: GithubRepository,
    #[serde(default)]
    pub sender: GithubUser,
}

impl PushEvent {
    /// Branch or tag name without the `refs/heads/` or `refs/tags/` prefix.
    pub fn short_ref(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .or_else(|| self.git_ref.strip_prefix("refs/tags/"))
            .unwrap_or(&self.git_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    #[serde(default)]
    pub number: u64,
    pub pull_request: GithubPullRequest,
    pub repository: GithubRepository,
    #[serde(default)]
    pub sender: GithubUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssuesEvent {
    pub action: String,
    pub issue: GithubIssue,
    pub repository: GithubRepository,
    #[serde(default)]
    pub sender: GithubUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueCommentEvent {
    pub action: String,
    pub issue: GithubIssue,
    pub comment: GithubComment,
    pub repository: GithubRepository,
    #[serde(default)]
    pub sender: GithubUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestReviewEvent {
    pub action: String,
    pub review: GithubReview,
    pub pull_request: GithubPullRequest,
    pub repository: GithubRepository,
    #[serde(default)]
    pub sender: GithubUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestReviewCommentEvent {
    pub action: String,
    pub comment: GithubComment,
    pub pull_request: GithubPullRequest,
    pub repository: GithubRepository,
    #[serde(default)]
    pub sender: GithubUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryEvent {
    pub action: String,
    pub repository: GithubRepository,
    #[serde(default)]
    pub changes: Option<GithubRepositoryChanges>,
    #[serde(default)]
    pub sender: GithubUser,
}

impl RepositoryEvent {
    pub fn previous_name(&self) -> Option<&str> {
        self.changes
            .as_ref()
            .and_then(|changes| changes.repository.as_ref())
            .and_then(|repository| repository.name.as_ref())
            .map(|change| change.from.as_str())
            .filter(|from| !from.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StarEvent {
    pub action: String,
    pub repository: GithubRepository,
    #[serde(default)]
    pub sender: GithubUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchEvent {
    #[serde(default)]
    pub action: String,
    pub repository: GithubRepository,
    #[serde(default)]
    pub sender: GithubUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ForkEvent {
    pub forkee: GithubRepository,
    pub repository: GithubRepository,
    #[serde(default)]
    pub sender: GithubUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseEvent {
    pub action: String,
    pub release: GithubRelease,
    pub repository: GithubRepository,
    #[serde(default)]
    pub sender: GithubUser,
}

/// Payload shared by `create` and `delete`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub ref_type: String,
    pub repository: GithubRepository,
    #[serde(default)]
    pub sender: GithubUser,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GithubEvent {
    Ping(PingEvent),
    Push(PushEvent),
    PullRequest(PullRequestEvent),
    Issues(IssuesEvent),
    IssueComment(IssueCommentEvent),
    PullRequestReview(PullRequestReviewEvent),
    PullRequestReviewComment(PullRequestReviewCommentEvent),
    Repository(RepositoryEvent),
    Star(StarEvent),
    Watch(WatchEvent),
    Fork(ForkEvent),
    Release(ReleaseEvent),
    Create(RefEvent),
    Delete(RefEvent),
    Other { name: String, payload: Value },
}

impl GithubEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::Ping(_) => "ping",
            Self::Push(_) => "push",
            Self::PullRequest(_) => "pull_request",
            Self::Issues(_) => "issues",
            Self::IssueComment(_) => "issue_comment",
            Self::PullRequestReview(_) => "pull_request_review",
            Self::PullRequestReviewComment(_) => "pull_request_review_comment",
            Self::Repository(_) => "repository",
            Self::Star(_) => "star",
            Self::Watch(_) => "watch",
            Self::Fork(_) => "fork",
            Self::Release(_) => "release",
            Self::Create(_) => "create",
            Self::Delete(_) => "delete",
            Self::Other { name, .. } => name.as_str(),
        }
    }

    pub fn repository(&self) -> Option<&GithubRepository> {
        match self {
            Self::Ping(event) => event.repository.as_ref(),
            Self::Push(event) => Some(&event.repository),
            Self::PullRequest(event) => Some(&event.repository),
            Self::Issues(event) => Some(&event.repository),
            Self::IssueComment(event) => Some(&event.repository),
            Self::PullRequestReview(event) => Some(&event.repository),
            Self::PullRequestReviewComment(event) => Some(&event.repository),
            Self::Repository(event) => Some(&event.repository),
            Self::Star(event) => Some(&event.repository),
            Self::Watch(event) => Some(&event.repository),
            Self::Fork(event) => Some(&event.repository),
            Self::Release(event) => Some(&event.repository),
            Self::Create(event) | Self::Delete(event) => Some(&event.repository),
            Self::Other { .. } => None,
        }
    }
}

/// Parses `body` according to the `X-GitHub-Event` header value.
pub fn parse_github_event(
    event_type: Option<&str>,
    body: &[u8],
) -> Result<GithubEvent, EventParseError> {
    let event_type = event_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(EventParseError::MissingEventType)?;
    let event = match event_type {
        "ping" => GithubEvent::Ping(decode(event_type, body)?),
        "push" => GithubEvent::Push(decode(event_type, body)?),
        "pull_request" => GithubEvent::PullRequest(decode(event_type, body)?),
        "issues" => GithubEvent::Issues(decode(event_type, body)?),
        "issue_comment" => GithubEvent::IssueComment(decode(event_type, body)?),
        "pull_request_review" => GithubEvent::PullRequestReview(decode(event_type, body)?),
        "pull_request_review_comment" => {
            GithubEvent::PullRequestReviewComment(decode(event_type, body)?)
        }
        "repository" => GithubEvent::Repository(decode(event_type, body)?),
        "star" => GithubEvent::Star(decode(event_type, body)?),
        "watch" => GithubEvent::Watch(decode(event_type, body)?),
        "fork" => GithubEvent::Fork(decode(event_type, body)?),
        "release" => GithubEvent::Release(decode(event_type, body)?),
        "create" => GithubEvent::Create(decode(event_type, body)?),
        "delete" => GithubEvent::Delete(decode(event_type, body)?),
        other => GithubEvent::Other {
            name: other.to_string(),
            payload: decode(event_type, body)?,
        },
    };
    Ok(event)
}

fn decode<T: DeserializeOwned>(event: &str, body: &[u8]) -> Result<T, EventParseError> {
    serde_json::from_slice(body).map_err(|source| EventParseError::InvalidPayload {
        event: event.to_string(),
        source,
    })
}
