//! Shared runtime state handed to the HTTP server, the update loop and every handler.

use std::sync::Arc;

use forgegram_core::{Clock, SystemClock};
use forgegram_github::{
    GithubApi, GithubApiError, GithubClientFactory, GithubOAuthConfig, OAuthCodeExchange,
    SUPPORTED_EVENTS,
};
use forgegram_telegram::ChatTransport;
use thiserror::Error;

use crate::admin_cache::AdminMembershipCache;
use crate::callback_protocol::CallbackCodec;
use crate::correlation::{CorrelationConfig, CorrelationManager};
use crate::formatter::NotificationFormatter;
use crate::oauth_state::OAuthStateStore;
use crate::reload_gate::ReloadRateLimiter;
use crate::sealing::{open_text, SealError, SealingCipher};
use crate::store::BridgeStore;
use crate::tenant_token::TenantTokenCodec;

pub const WEBHOOK_PATH_PREFIX: &str = "/webhook/";

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Externally reachable base URL, without a trailing slash.
    pub public_url: String,
    pub webhook_secret: String,
    /// Bot username without `@`, used to accept `/cmd@bot` forms.
    pub bot_username: String,
    pub correlation: CorrelationConfig,
}

pub struct BridgeDependencies {
    pub transport: Arc<dyn ChatTransport>,
    pub store: Arc<dyn BridgeStore>,
    pub github: Arc<dyn GithubClientFactory>,
    pub oauth_config: GithubOAuthConfig,
    pub oauth_exchange: Arc<dyn OAuthCodeExchange>,
    pub sealer: Arc<dyn SealingCipher>,
    pub formatter: Arc<dyn NotificationFormatter>,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("user has not connected a GitHub account")]
    NotConnected,
    #[error("stored GitHub token could not be opened")]
    Unreadable,
    #[error("failed to read stored credentials: {0:#}")]
    Store(anyhow::Error),
    #[error(transparent)]
    Client(#[from] GithubApiError),
}

/// Entries evicted by one cleanup sweep, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub message_contexts: usize,
    pub action_tokens: usize,
    pub admin_lists: usize,
    pub reload_marks: usize,
    pub oauth_states: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.message_contexts
            + self.action_tokens
            + self.admin_lists
            + self.reload_marks
            + self.oauth_states
    }
}

pub struct BridgeContext {
    pub settings: BridgeSettings,
    pub transport: Arc<dyn ChatTransport>,
    pub store: Arc<dyn BridgeStore>,
    pub github: Arc<dyn GithubClientFactory>,
    pub oauth_config: GithubOAuthConfig,
    pub oauth_exchange: Arc<dyn OAuthCodeExchange>,
    pub sealer: Arc<dyn SealingCipher>,
    pub formatter: Arc<dyn NotificationFormatter>,
    pub tenant_tokens: Arc<TenantTokenCodec>,
    pub correlation: CorrelationManager,
    pub callbacks: CallbackCodec,
    pub admins: AdminMembershipCache,
    pub reload_gate: ReloadRateLimiter,
    pub oauth_states: OAuthStateStore,
}

impl BridgeContext {
    pub fn new(settings: BridgeSettings, dependencies: BridgeDependencies) -> Self {
        Self::with_clock(settings, dependencies, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: BridgeSettings,
        dependencies: BridgeDependencies,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let BridgeDependencies {
            transport,
            store,
            github,
            oauth_config,
            oauth_exchange,
            sealer,
            formatter,
        } = dependencies;
        let correlation = CorrelationManager::with_clock(settings.correlation, clock.clone());
        Self {
            tenant_tokens: Arc::new(TenantTokenCodec::new(sealer.clone())),
            correlation,
            callbacks: CallbackCodec::new(&SUPPORTED_EVENTS),
            admins: AdminMembershipCache::with_clock(clock.clone()),
            reload_gate: ReloadRateLimiter::with_clock(clock.clone()),
            oauth_states: OAuthStateStore::with_clock(clock),
            settings,
            transport,
            store,
            github,
            oauth_config,
            oauth_exchange,
            sealer,
            formatter,
        }
    }

    /// Webhook URL for `chat_id`; a fresh token is sealed on every call.
    pub fn webhook_url(&self, chat_id: i64) -> Result<String, SealError> {
        let token = self.tenant_tokens.encode(chat_id)?;
        Ok(format!(
            "{}{WEBHOOK_PATH_PREFIX}{token}",
            self.settings.public_url.trim_end_matches('/')
        ))
    }

    /// Opens the user's stored token and builds an API client for it.
    pub async fn github_client_for(
        &self,
        telegram_user_id: i64,
    ) -> Result<Arc<dyn GithubApi>, CredentialError> {
        let sealed = self
            .store
            .sealed_user_token(telegram_user_id)
            .await
            .map_err(CredentialError::Store)?
            .ok_or(CredentialError::NotConnected)?;
        let token = open_text(self.sealer.as_ref(), &sealed).ok_or(CredentialError::Unreadable)?;
        Ok(self.github.client_for_token(&token)?)
    }

    /// Clears the user's credential when GitHub rejected it. Returns whether it did.
    pub async fn revoke_on_auth_failure(
        &self,
        telegram_user_id: i64,
        error: &GithubApiError,
    ) -> bool {
        if !error.is_auth_failure() {
            return false;
        }
        tracing::warn!(
            user_id = telegram_user_id,
            status = ?error.status(),
            "github rejected stored credential; clearing token"
        );
        if let Err(error) = self.store.clear_user_token(telegram_user_id).await {
            tracing::warn!(
                user_id = telegram_user_id,
                error = %format!("{error:#}"),
                "failed to clear user token"
            );
        }
        true
    }

    pub fn sweep_expired(&self) -> SweepReport {
        let (message_contexts, action_tokens) = self.correlation.cleanup();
        SweepReport {
            message_contexts,
            action_tokens,
            admin_lists: self.admins.cleanup(),
            reload_marks: self.reload_gate.cleanup(),
            oauth_states: self.oauth_states.cleanup(),
        }
    }
}
