//! GitHub OAuth web flow: authorize URL construction and code exchange.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;

use crate::api_client::GithubApiError;

pub const DEFAULT_GITHUB_OAUTH_BASE: &str = "https://github.com";
pub const DEFAULT_OAUTH_SCOPES: &str = "repo admin:repo_hook";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub oauth_base: String,
    pub scopes: String,
}

impl GithubOAuthConfig {
    /// Authorize URL the user opens to grant access; `state` comes back on the callback.
    pub fn login_url(&self, state: &str) -> Result<String, GithubApiError> {
        let base = format!(
            "{}/login/oauth/authorize",
            self.oauth_base.trim_end_matches('/')
        );
        let url = reqwest::Url::parse_with_params(
            &base,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("scope", self.scopes.as_str()),
                ("state", state),
            ],
        )
        .map_err(|error| GithubApiError::Config(format!("invalid oauth base url: {error}")))?;
        Ok(url.to_string())
    }
}

/// Exchanges an authorization code for an access token.
#[async_trait]
pub trait OAuthCodeExchange: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<String, GithubApiError>;
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GithubOAuthClient {
    http: reqwest::Client,
    config: GithubOAuthConfig,
}

impl GithubOAuthClient {
    pub fn new(
        config: GithubOAuthConfig,
        request_timeout: Duration,
    ) -> Result<Self, GithubApiError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout.max(Duration::from_millis(1)))
            .build()
            .map_err(|error| GithubApiError::Config(error.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GithubOAuthConfig {
        &self.config
    }
}

#[async_trait]
impl OAuthCodeExchange for GithubOAuthClient {
    async fn exchange_code(&self, code: &str) -> Result<String, GithubApiError> {
        const OPERATION: &str = "oauth code exchange";
        let url = format!(
            "{}/login/oauth/access_token",
            self.config.oauth_base.trim_end_matches('/')
        );
        let response = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, "forgegram-bridge")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
            ])
            .send()
            .await
            .map_err(|source| GithubApiError::Transport {
                operation: OPERATION,
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(GithubApiError::Status {
                operation: OPERATION,
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let parsed = response
            .json::<AccessTokenResponse>()
            .await
            .map_err(|source| GithubApiError::Decode {
                operation: OPERATION,
                source,
            })?;
        match parsed.access_token.filter(|token| !token.trim().is_empty()) {
            Some(token) => Ok(token),
            None => Err(GithubApiError::Status {
                operation: OPERATION,
                status: status.as_u16(),
                message: parsed
                    .error_description
                    .or(parsed.error)
                    .unwrap_or_else(|| "no access token returned".to_string()),
            }),
        }
    }
}
