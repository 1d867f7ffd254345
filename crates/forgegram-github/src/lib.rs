//! GitHub side of the bridge: webhook payload typing, signature checks, and
//! the REST/OAuth collaborators used by chat commands.

pub mod api_client;
pub mod catalog;
pub mod events;
pub mod oauth;
pub mod signature;

pub use api_client::{
    parse_link_header, GithubApi, GithubApiError, GithubClientFactory, GithubHook,
    GithubRestClient, GithubRestClientFactory, HookSpec, IssueState, LinkPages, RepositoryPage,
    DEFAULT_GITHUB_API_BASE,
};
pub use catalog::{default_hook_events, SupportedEvent, SUPPORTED_EVENTS};
pub use events::{
    parse_github_event, EventParseError, GithubComment, GithubCommit, GithubEvent, GithubIssue,
    GithubPullRequest, GithubRelease, GithubRepository, GithubReview, GithubUser,
    GITHUB_EVENT_HEADER, GITHUB_HOOK_ID_HEADER,
};
pub use oauth::{
    GithubOAuthClient, GithubOAuthConfig, OAuthCodeExchange, DEFAULT_GITHUB_OAUTH_BASE,
    DEFAULT_OAUTH_SCOPES,
};
pub use signature::{
    sign_github_payload, verify_github_signature, SignatureError, GITHUB_SIGNATURE_HEADER,
};
