//! Completion of the GitHub OAuth handshake started by `/connect`.

use std::sync::Arc;

use axum::http::StatusCode;
use forgegram_github::GithubApiError;
use forgegram_telegram::{escape_markdown_v2, SendMessageRequest};
use thiserror::Error;

use crate::context::BridgeContext;
use crate::sealing::{seal_text, SealError};
use crate::store::StoredUser;

#[derive(Debug, Error)]
pub enum OAuthCallbackError {
    #[error("missing code")]
    MissingCode,
    #[error("invalid or expired state")]
    InvalidState,
    #[error("failed to exchange code: {0}")]
    Exchange(#[source] GithubApiError),
    #[error("failed to fetch user: {0}")]
    Profile(#[source] GithubApiError),
    #[error("encryption failed")]
    Seal(#[from] SealError),
    #[error("failed to store user: {0:#}")]
    Store(anyhow::Error),
}

impl OAuthCallbackError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCode | Self::InvalidState => StatusCode::BAD_REQUEST,
            Self::Exchange(_) | Self::Profile(_) | Self::Seal(_) | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short plain-text body returned to the browser.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MissingCode => "Missing code",
            Self::InvalidState => "Invalid or expired state",
            Self::Exchange(_) => "Failed to exchange code",
            Self::Profile(_) => "Failed to fetch user",
            Self::Seal(_) => "Encryption failed",
            Self::Store(_) => "Failed to save account",
        }
    }
}

pub struct OAuthCallbackService {
    ctx: Arc<BridgeContext>,
}

impl OAuthCallbackService {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self { ctx }
    }

    /// Exchanges `code`, stores the sealed token for the user bound to `state`
    /// and returns the confirmation page.
    pub async fn complete(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<String, OAuthCallbackError> {
        let code = code
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .ok_or(OAuthCallbackError::MissingCode)?;
        let telegram_id = state
            .and_then(|state| self.ctx.oauth_states.consume(state.trim()))
            .ok_or(OAuthCallbackError::InvalidState)?;

        let access_token = self
            .ctx
            .oauth_exchange
            .exchange_code(code)
            .await
            .map_err(OAuthCallbackError::Exchange)?;
        let client = self
            .ctx
            .github
            .client_for_token(&access_token)
            .map_err(OAuthCallbackError::Profile)?;
        let profile = client
            .current_user()
            .await
            .map_err(OAuthCallbackError::Profile)?;
        let sealed_token = seal_text(self.ctx.sealer.as_ref(), &access_token)?;

        self.ctx
            .store
            .upsert_user(StoredUser {
                telegram_id,
                github_user_id: profile.id,
                github_login: profile.login.clone(),
                sealed_token,
            })
            .await
            .map_err(OAuthCallbackError::Store)?;
        tracing::info!(user_id = telegram_id, login = %profile.login, "github account connected");

        let notice = SendMessageRequest::markdown(
            telegram_id,
            format!(
                "✅ GitHub account *{}* connected successfully\\!",
                escape_markdown_v2(&profile.login)
            ),
        );
        if let Err(error) = self.ctx.transport.send_message(&notice).await {
            tracing::warn!(chat_id = telegram_id, %error, "failed to send connection notice");
        }

        Ok(render_connected_page(&self.ctx.settings.bot_username))
    }
}

pub fn render_connected_page(bot_username: &str) -> String {
    format!(
        r#"<html>
<head><title>Connected</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px;">
  <h1>Authentication Successful</h1>
  <p>Your GitHub account has been connected.</p>
  <script>
    window.opener = null;
    setTimeout(function() {{ window.close(); }}, 1000);
    setTimeout(function() {{ window.location.href = "https://t.me/{bot_username}"; }}, 2000);
  </script>
  <p>If the window does not close automatically, you can <a href="https://t.me/{bot_username}">return to Telegram</a>.</p>
</body>
</html>
"#
    )
}
