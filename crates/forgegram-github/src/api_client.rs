//! GitHub REST collaborator used by chat commands and button actions.
//!
//! Calls are made once. Retrying, if wanted, is the caller's business; a 401/403
//! is surfaced through [`GithubApiError::is_auth_failure`] so the caller can
//! drop the stored credential.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::events::{GithubRepository, GithubUser};

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const ERROR_MESSAGE_LIMIT: usize = 400;

#[derive(Debug, Error)]
pub enum GithubApiError {
    #[error("github api {operation} failed with status {status}: {message}")]
    Status {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[error("github api {operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode github {operation}: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid github client configuration: {0}")]
    Config(String),
    #[error("invalid repository path segment '{0}'")]
    InvalidRepository(String),
}

impl GithubApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when GitHub rejected the credential itself.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// A malformed owner or name counts as not found; no such repository can exist.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404) || matches!(self, Self::InvalidRepository(_))
    }

    /// Short text suitable for echoing back to a chat user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Status {
                status, message, ..
            } => format!("GitHub responded with {status}: {message}"),
            Self::Transport { .. } => "GitHub could not be reached, try again later".to_string(),
            Self::Decode { .. } => "GitHub returned an unexpected response".to_string(),
            Self::Config(message) => message.clone(),
            Self::InvalidRepository(segment) => {
                format!("'{segment}' is not a valid repository name")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GithubHook {
    pub id: u64,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSpec {
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
}

/// One page of the authenticated user's repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryPage {
    pub repositories: Vec<GithubRepository>,
    pub page: u32,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
    pub last_page: Option<u32>,
}

/// Page numbers advertised by a `Link` response header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkPages {
    pub prev: Option<u32>,
    pub next: Option<u32>,
    pub last: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CreatedComment {
    id: u64,
}

#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn current_user(&self) -> Result<GithubUser, GithubApiError>;
    async fn list_repositories(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<RepositoryPage, GithubApiError>;
    async fn get_repository(&self, owner: &str, name: &str)
        -> Result<GithubRepository, GithubApiError>;
    async fn get_repository_by_id(&self, id: u64) -> Result<GithubRepository, GithubApiError>;
    async fn create_hook(
        &self,
        owner: &str,
        name: &str,
        spec: &HookSpec,
    ) -> Result<GithubHook, GithubApiError>;
    async fn get_hook(&self, owner: &str, name: &str, hook_id: u64)
        -> Result<GithubHook, GithubApiError>;
    async fn update_hook_events(
        &self,
        owner: &str,
        name: &str,
        hook_id: u64,
        events: &[String],
    ) -> Result<GithubHook, GithubApiError>;
    async fn delete_hook(&self, owner: &str, name: &str, hook_id: u64)
        -> Result<(), GithubApiError>;
    async fn create_issue_comment(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        body: &str,
    ) -> Result<u64, GithubApiError>;
    async fn reply_to_review_comment(
        &self,
        owner: &str,
        name: &str,
        pull_number: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<u64, GithubApiError>;
    async fn set_issue_state(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        state: IssueState,
    ) -> Result<(), GithubApiError>;
    async fn approve_pull_request(
        &self,
        owner: &str,
        name: &str,
        number: u64,
    ) -> Result<(), GithubApiError>;
    async fn close_pull_request(
        &self,
        owner: &str,
        name: &str,
        number: u64,
    ) -> Result<(), GithubApiError>;
}

/// Builds per-user API clients from a decrypted OAuth token.
pub trait GithubClientFactory: Send + Sync {
    fn client_for_token(&self, token: &str) -> Result<Arc<dyn GithubApi>, GithubApiError>;
}

#[derive(Debug, Clone)]
pub struct GithubRestClientFactory {
    api_base: String,
    request_timeout: Duration,
}

impl GithubRestClientFactory {
    pub fn new(api_base: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            api_base: api_base.into(),
            request_timeout,
        }
    }
}

impl GithubClientFactory for GithubRestClientFactory {
    fn client_for_token(&self, token: &str) -> Result<Arc<dyn GithubApi>, GithubApiError> {
        let client = GithubRestClient::new(&self.api_base, token, self.request_timeout)?;
        Ok(Arc::new(client))
    }
}

#[derive(Debug, Clone)]
pub struct GithubRestClient {
    http: reqwest::Client,
    api_base: String,
}

impl GithubRestClient {
    pub fn new(
        api_base: &str,
        token: &str,
        request_timeout: Duration,
    ) -> Result<Self, GithubApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("forgegram-bridge"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_header)
                .map_err(|_| GithubApiError::Config("invalid github token".to_string()))?,
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout.max(Duration::from_millis(1)))
            .build()
            .map_err(|error| GithubApiError::Config(error.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, GithubApiError> {
        let response = request
            .send()
            .await
            .map_err(|source| GithubApiError::Transport { operation, source })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GithubApiError::Status {
            operation,
            status: status.as_u16(),
            message: error_message_from_body(&body),
        })
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GithubApiError> {
        self.send(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|source| GithubApiError::Decode { operation, source })
    }
}

#[async_trait]
impl GithubApi for GithubRestClient {
    async fn current_user(&self) -> Result<GithubUser, GithubApiError> {
        self.request_json("get user", self.http.get(self.url("/user")))
            .await
    }

    async fn list_repositories(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<RepositoryPage, GithubApiError> {
        let page = page.max(1);
        let request = self.http.get(self.url("/user/repos")).query(&[
            ("sort", "updated".to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.clamp(1, 100).to_string()),
        ]);
        let response = self.send("list repositories", request).await?;
        let links = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(parse_link_header)
            .unwrap_or_default();
        let repositories = response
            .json::<Vec<GithubRepository>>()
            .await
            .map_err(|source| GithubApiError::Decode {
                operation: "list repositories",
                source,
            })?;
        Ok(RepositoryPage {
            repositories,
            page,
            prev_page: links.prev,
            next_page: links.next,
            last_page: links.last,
        })
    }

    async fn get_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<GithubRepository, GithubApiError> {
        let repo = repo_path(owner, name)?;
        self.request_json(
            "get repository",
            self.http.get(self.url(&repo)),
        )
        .await
    }

    async fn get_repository_by_id(&self, id: u64) -> Result<GithubRepository, GithubApiError> {
        self.request_json(
            "get repository by id",
            self.http.get(self.url(&format!("/repositories/{id}"))),
        )
        .await
    }

    async fn create_hook(
        &self,
        owner: &str,
        name: &str,
        spec: &HookSpec,
    ) -> Result<GithubHook, GithubApiError> {
        let repo = repo_path(owner, name)?;
        let payload = json!({
            "name": "web",
            "active": true,
            "events": spec.events,
            "config": {
                "url": spec.url,
                "content_type": "json",
                "secret": spec.secret,
                "insecure_ssl": "0",
            },
        });
        self.request_json(
            "create hook",
            self.http
                .post(self.url(&format!("{repo}/hooks")))
                .json(&payload),
        )
        .await
    }

    async fn get_hook(
        &self,
        owner: &str,
        name: &str,
        hook_id: u64,
    ) -> Result<GithubHook, GithubApiError> {
        let repo = repo_path(owner, name)?;
        self.request_json(
            "get hook",
            self.http.get(self.url(&format!("{repo}/hooks/{hook_id}"))),
        )
        .await
    }

    async fn update_hook_events(
        &self,
        owner: &str,
        name: &str,
        hook_id: u64,
        events: &[String],
    ) -> Result<GithubHook, GithubApiError> {
        let repo = repo_path(owner, name)?;
        self.request_json(
            "update hook",
            self.http
                .patch(self.url(&format!("{repo}/hooks/{hook_id}")))
                .json(&json!({ "events": events })),
        )
        .await
    }

    async fn delete_hook(
        &self,
        owner: &str,
        name: &str,
        hook_id: u64,
    ) -> Result<(), GithubApiError> {
        let repo = repo_path(owner, name)?;
        self.send(
            "delete hook",
            self.http.delete(self.url(&format!("{repo}/hooks/{hook_id}"))),
        )
        .await
        .map(|_| ())
    }

    async fn create_issue_comment(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        body: &str,
    ) -> Result<u64, GithubApiError> {
        let repo = repo_path(owner, name)?;
        let created: CreatedComment = self
            .request_json(
                "create issue comment",
                self.http
                    .post(self.url(&format!("{repo}/issues/{number}/comments")))
                    .json(&json!({ "body": body })),
            )
            .await?;
        Ok(created.id)
    }

    async fn reply_to_review_comment(
        &self,
        owner: &str,
        name: &str,
        pull_number: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<u64, GithubApiError> {
        let repo = repo_path(owner, name)?;
        let created: CreatedComment = self
            .request_json(
                "reply to review comment",
                self.http
                    .post(self.url(&format!(
                        "{repo}/pulls/{pull_number}/comments/{comment_id}/replies"
                    )))
                    .json(&json!({ "body": body })),
            )
            .await?;
        Ok(created.id)
    }

    async fn set_issue_state(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        state: IssueState,
    ) -> Result<(), GithubApiError> {
        let repo = repo_path(owner, name)?;
        self.send(
            "update issue state",
            self.http
                .patch(self.url(&format!("{repo}/issues/{number}")))
                .json(&json!({ "state": state.as_str() })),
        )
        .await
        .map(|_| ())
    }

    async fn approve_pull_request(
        &self,
        owner: &str,
        name: &str,
        number: u64,
    ) -> Result<(), GithubApiError> {
        let repo = repo_path(owner, name)?;
        self.send(
            "approve pull request",
            self.http
                .post(self.url(&format!("{repo}/pulls/{number}/reviews")))
                .json(&ReviewRequest { event: "APPROVE" }),
        )
        .await
        .map(|_| ())
    }

    async fn close_pull_request(
        &self,
        owner: &str,
        name: &str,
        number: u64,
    ) -> Result<(), GithubApiError> {
        let repo = repo_path(owner, name)?;
        self.send(
            "close pull request",
            self.http
                .patch(self.url(&format!("{repo}/pulls/{number}")))
                .json(&json!({ "state": "closed" })),
        )
        .await
        .map(|_| ())
    }
}

fn is_valid_path_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-'))
}

/// `/repos/{owner}/{name}`, refusing segments that could escape the repository path.
fn repo_path(owner: &str, name: &str) -> Result<String, GithubApiError> {
    for segment in [owner, name] {
        if !is_valid_path_segment(segment) {
            return Err(GithubApiError::InvalidRepository(segment.to_string()));
        }
    }
    Ok(format!("/repos/{owner}/{name}"))
}

#[derive(Serialize)]
struct ReviewRequest {
    event: &'static str,
}

/// Extracts `rel="prev|next|last"` page numbers from a GitHub `Link` header.
pub fn parse_link_header(raw: &str) -> LinkPages {
    let mut pages = LinkPages::default();
    for part in raw.split(',') {
        let mut segments = part.split(';');
        let Some(target) = segments.next() else {
            continue;
        };
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        let Some(page) = reqwest::Url::parse(target).ok().and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "page")
                .and_then(|(_, value)| value.parse::<u32>().ok())
        }) else {
            continue;
        };
        for segment in segments {
            match segment.trim() {
                r#"rel="prev""# => pages.prev = Some(page),
                r#"rel="next""# => pages.next = Some(page),
                r#"rel="last""# => pages.last = Some(page),
                _ => {}
            }
        }
    }
    pages
}

fn error_message_from_body(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    if message.chars().count() <= ERROR_MESSAGE_LIMIT {
        return message;
    }
    let truncated = message.chars().take(ERROR_MESSAGE_LIMIT).collect::<String>();
    format!("{truncated}...")
}
