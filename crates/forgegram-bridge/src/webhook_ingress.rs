//! Validation half of the webhook pipeline: tenant token, signature, typed event.
//!
//! Everything here runs on the request path and must finish before the HTTP
//! acknowledgement. Delivery happens afterwards in [`crate::dispatch`].

use std::sync::Arc;

use axum::http::StatusCode;
use forgegram_github::{
    parse_github_event, verify_github_signature, EventParseError, GithubEvent, SignatureError,
};
use thiserror::Error;

use crate::tenant_token::TenantTokenCodec;

const UNAUTHORIZED_MESSAGE: &str = "webhook authentication failed";

/// Raw pieces of an inbound webhook request.
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    pub token: &'a str,
    pub signature: Option<&'a str>,
    pub event_type: Option<&'a str>,
    pub hook_id: Option<&'a str>,
    pub body: &'a [u8],
}

#[derive(Debug)]
pub struct AcceptedWebhook {
    pub chat_id: i64,
    pub hook_id: Option<u64>,
    pub event: GithubEvent,
}

#[derive(Debug, Error)]
pub enum IngressRejection {
    #[error("tenant token could not be opened")]
    InvalidToken,
    #[error("signature check failed: {0}")]
    InvalidSignature(#[source] SignatureError),
    #[error("payload could not be parsed: {0}")]
    UnparseablePayload(#[source] EventParseError),
}

impl IngressRejection {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidToken | Self::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            Self::UnparseablePayload(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for the response body. Token and signature failures share one.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidToken | Self::InvalidSignature(_) => "unauthorized",
            Self::UnparseablePayload(_) => "unparseable_payload",
        }
    }

    /// Caller-facing message. Never says which authentication stage failed.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidToken | Self::InvalidSignature(_) => UNAUTHORIZED_MESSAGE,
            Self::UnparseablePayload(_) => "webhook payload could not be processed",
        }
    }

    fn stage(&self) -> &'static str {
        match self {
            Self::InvalidToken => "tenant_token",
            Self::InvalidSignature(_) => "signature",
            Self::UnparseablePayload(_) => "event_parse",
        }
    }
}

pub struct WebhookIngress {
    tokens: Arc<TenantTokenCodec>,
    secret: String,
}

impl WebhookIngress {
    pub fn new(tokens: Arc<TenantTokenCodec>, secret: impl Into<String>) -> Self {
        Self {
            tokens,
            secret: secret.into(),
        }
    }

    /// Runs token decode, signature verification and event parsing in that order.
    pub fn ingest(&self, request: WebhookRequest<'_>) -> Result<AcceptedWebhook, IngressRejection> {
        let result = self.validate(request);
        if let Err(rejection) = &result {
            match rejection {
                IngressRejection::UnparseablePayload(error) => tracing::error!(
                    stage = rejection.stage(),
                    event_type = request.event_type.unwrap_or(""),
                    %error,
                    "webhook payload rejected"
                ),
                _ => tracing::warn!(
                    stage = rejection.stage(),
                    %rejection,
                    "webhook rejected"
                ),
            }
        }
        result
    }

    fn validate(&self, request: WebhookRequest<'_>) -> Result<AcceptedWebhook, IngressRejection> {
        let token = request.token.trim();
        if token.is_empty() {
            return Err(IngressRejection::InvalidToken);
        }
        let chat_id = self
            .tokens
            .decode(token)
            .ok_or(IngressRejection::InvalidToken)?;

        verify_github_signature(request.body, request.signature, &self.secret)
            .map_err(IngressRejection::InvalidSignature)?;

        let event = parse_github_event(request.event_type, request.body)
            .map_err(IngressRejection::UnparseablePayload)?;
        let hook_id = request
            .hook_id
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|id| *id != 0);

        Ok(AcceptedWebhook {
            chat_id,
            hook_id,
            event,
        })
    }
}
