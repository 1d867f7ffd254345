//! HTTP surface: GitHub webhook ingress, the OAuth redirect target and health probes.

use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use forgegram_github::{GITHUB_EVENT_HEADER, GITHUB_HOOK_ID_HEADER, GITHUB_SIGNATURE_HEADER};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use crate::context::BridgeContext;
use crate::dispatch::NotificationDispatcher;
use crate::oauth_flow::OAuthCallbackService;
use crate::webhook_ingress::{WebhookIngress, WebhookRequest};

struct BridgeServerState {
    ctx: Arc<BridgeContext>,
    ingress: WebhookIngress,
    dispatcher: NotificationDispatcher,
    oauth: OAuthCallbackService,
}

#[derive(Debug, Default, Deserialize)]
struct OAuthCallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

pub fn build_bridge_router(ctx: Arc<BridgeContext>) -> Router {
    let state = Arc::new(BridgeServerState {
        ingress: WebhookIngress::new(
            ctx.tenant_tokens.clone(),
            ctx.settings.webhook_secret.clone(),
        ),
        dispatcher: NotificationDispatcher::new(ctx.clone()),
        oauth: OAuthCallbackService::new(ctx.clone()),
        ctx,
    });
    Router::new()
        .route("/", get(handle_landing))
        .route("/healthz", get(handle_health))
        .route("/oauth/callback", get(handle_oauth_callback))
        .route("/webhook/{*token}", post(handle_github_webhook))
        .with_state(state)
}

/// Serves the bridge router on `listener` until ctrl-c.
pub async fn serve_bridge(listener: TcpListener, ctx: Arc<BridgeContext>) -> anyhow::Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bridge server bound address")?;
    tracing::info!(addr = %local_addr, "bridge http server listening");
    let app = build_bridge_router(ctx);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("bridge http server exited unexpectedly")
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status":"ok"})))
}

async fn handle_landing(State(state): State<Arc<BridgeServerState>>) -> impl IntoResponse {
    Html(render_landing_page(&state.ctx.settings.bot_username))
}

async fn handle_github_webhook(
    State(state): State<Arc<BridgeServerState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request = WebhookRequest {
        token: token.as_str(),
        signature: header_str(&headers, GITHUB_SIGNATURE_HEADER),
        event_type: header_str(&headers, GITHUB_EVENT_HEADER),
        hook_id: header_str(&headers, GITHUB_HOOK_ID_HEADER),
        body: body.as_ref(),
    };
    let accepted = match state.ingress.ingest(request) {
        Ok(accepted) => accepted,
        Err(rejection) => {
            return (
                rejection.status_code(),
                Json(
                    json!({"error":{"code":rejection.code(),"message":rejection.public_message()}}),
                ),
            );
        }
    };

    let event_name = accepted.event.name().to_string();
    let server_state = state.clone();
    tokio::spawn(async move {
        let outcome = server_state
            .dispatcher
            .dispatch(&accepted.event, accepted.chat_id, accepted.hook_id)
            .await;
        tracing::debug!(
            chat_id = accepted.chat_id,
            event = %accepted.event.name(),
            ?outcome,
            "webhook dispatched"
        );
    });
    (
        StatusCode::OK,
        Json(json!({"status":"accepted","event":event_name})),
    )
}

async fn handle_oauth_callback(
    State(state): State<Arc<BridgeServerState>>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    match state
        .oauth
        .complete(query.code.as_deref(), query.state.as_deref())
        .await
    {
        Ok(page) => Html(page).into_response(),
        Err(error) => {
            tracing::warn!(%error, "oauth callback failed");
            (error.status_code(), error.public_message()).into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn render_landing_page(bot_username: &str) -> String {
    format!(
        r#"<html>
<head><title>Forgegram</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px;">
  <h1>GitHub notifications for Telegram</h1>
  <p>Link repositories to your chats and act on pull requests without leaving Telegram.</p>
  <p><a href="https://t.me/{bot_username}">Open @{bot_username}</a></p>
</body>
</html>
"#
    )
}
