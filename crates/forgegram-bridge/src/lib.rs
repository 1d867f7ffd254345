//! GitHub to Telegram bridge runtime.
//!
//! Routes signed GitHub webhooks to the chat a sealed path token names,
//! remembers which notification belongs to which issue or pull request so
//! replies and inline buttons can act on it, and serves the bot's chat
//! commands and settings menus.

pub mod admin_cache;
pub mod callback_protocol;
pub mod commands;
pub mod context;
pub mod correlation;
pub mod dispatch;
pub mod formatter;
pub mod http_server;
pub mod oauth_flow;
pub mod oauth_state;
pub mod reload_gate;
pub mod runtime;
pub mod sealing;
pub mod store;
pub mod tenant_token;
pub mod webhook_ingress;

#[cfg(test)]
mod test_support;

pub use admin_cache::{AdminMembershipCache, ADMIN_CACHE_TTL};
pub use callback_protocol::{CallbackCodec, CallbackCommand, PresetMode, CALLBACK_DATA_LIMIT};
pub use commands::{parse_bot_command, BotCommand};
pub use context::{
    BridgeContext, BridgeDependencies, BridgeSettings, CredentialError, SweepReport,
    WEBHOOK_PATH_PREFIX,
};
pub use correlation::{
    entity_context_for_event, CorrelationConfig, CorrelationManager, EntityContext, EntityKind,
    DEFAULT_ACTION_TTL, DEFAULT_MESSAGE_RETENTION,
};
pub use dispatch::{DispatchOutcome, NotificationDispatcher};
pub use formatter::{DefaultFormatter, Notification, NotificationButton, NotificationFormatter};
pub use http_server::{build_bridge_router, serve_bridge};
pub use oauth_flow::{OAuthCallbackError, OAuthCallbackService};
pub use oauth_state::{OAuthStateStore, OAUTH_STATE_TTL};
pub use reload_gate::{ReloadRateLimiter, RELOAD_WINDOW};
pub use runtime::BotRuntime;
pub use sealing::{AesGcmSealer, CipherKeyError, SealError, SealingCipher};
pub use store::{BridgeStore, FileBridgeStore, RepoLink, StoredChat, StoredUser};
pub use tenant_token::TenantTokenCodec;
pub use webhook_ingress::{AcceptedWebhook, IngressRejection, WebhookIngress, WebhookRequest};
