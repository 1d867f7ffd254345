use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use forgegram_bridge::CorrelationConfig;
use forgegram_github::{DEFAULT_GITHUB_API_BASE, DEFAULT_GITHUB_OAUTH_BASE};
use forgegram_telegram::DEFAULT_TELEGRAM_API_BASE;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_non_empty(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("value cannot be empty".to_string());
    }
    Ok(trimmed.to_string())
}

fn parse_base_url(value: &str) -> Result<String, String> {
    let trimmed = parse_non_empty(value)?;
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err("value must be an http(s) URL".to_string());
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "forgegram",
    about = "Bridge GitHub webhooks and actions into Telegram chats",
    version
)]
pub struct Cli {
    #[arg(
        long = "telegram-token",
        env = "TELEGRAM_TOKEN",
        hide_env_values = true,
        value_parser = parse_non_empty,
        help = "Telegram bot token."
    )]
    pub telegram_token: String,

    #[arg(
        long = "public-url",
        env = "FORGEGRAM_PUBLIC_URL",
        value_parser = parse_base_url,
        help = "Externally reachable base URL used for webhook and OAuth redirect URLs."
    )]
    pub public_url: String,

    #[arg(
        long = "github-webhook-secret",
        env = "GITHUB_WEBHOOK_SECRET",
        hide_env_values = true,
        value_parser = parse_non_empty,
        help = "Shared secret GitHub signs webhook deliveries with."
    )]
    pub github_webhook_secret: String,

    #[arg(
        long = "github-client-id",
        env = "GITHUB_CLIENT_ID",
        value_parser = parse_non_empty,
        help = "GitHub OAuth app client id."
    )]
    pub github_client_id: String,

    #[arg(
        long = "github-client-secret",
        env = "GITHUB_CLIENT_SECRET",
        hide_env_values = true,
        value_parser = parse_non_empty,
        help = "GitHub OAuth app client secret."
    )]
    pub github_client_secret: String,

    #[arg(
        long = "encryption-key",
        env = "ENCRYPTION_KEY",
        hide_env_values = true,
        help = "AES-GCM key: 64 hex chars, or a raw 16/24/32-byte string."
    )]
    pub encryption_key: String,

    #[arg(
        long,
        env = "FORGEGRAM_BIND",
        default_value = "0.0.0.0:8080",
        help = "Socket address the HTTP server binds."
    )]
    pub bind: String,

    #[arg(
        long = "state-path",
        env = "FORGEGRAM_STATE_PATH",
        default_value = ".forgegram/state.json",
        help = "JSON state file for users, chats and repository links."
    )]
    pub state_path: PathBuf,

    #[arg(
        long = "telegram-api-base",
        env = "TELEGRAM_API_BASE",
        default_value = DEFAULT_TELEGRAM_API_BASE,
        value_parser = parse_base_url
    )]
    pub telegram_api_base: String,

    #[arg(
        long = "github-api-base",
        env = "GITHUB_API_BASE",
        default_value = DEFAULT_GITHUB_API_BASE,
        value_parser = parse_base_url
    )]
    pub github_api_base: String,

    #[arg(
        long = "github-oauth-base",
        env = "GITHUB_OAUTH_BASE",
        default_value = DEFAULT_GITHUB_OAUTH_BASE,
        value_parser = parse_base_url
    )]
    pub github_oauth_base: String,

    #[arg(
        long = "message-retention-hours",
        env = "FORGEGRAM_MESSAGE_RETENTION_HOURS",
        default_value_t = 48,
        value_parser = parse_positive_u64,
        help = "How long replies to a notification can still act on it."
    )]
    pub message_retention_hours: u64,

    #[arg(
        long = "action-ttl-hours",
        env = "FORGEGRAM_ACTION_TTL_HOURS",
        default_value_t = 48,
        value_parser = parse_positive_u64,
        help = "How long pull request action buttons stay usable."
    )]
    pub action_ttl_hours: u64,

    #[arg(
        long = "cleanup-interval-secs",
        env = "FORGEGRAM_CLEANUP_INTERVAL_SECS",
        default_value_t = 300,
        value_parser = parse_positive_u64
    )]
    pub cleanup_interval_secs: u64,

    #[arg(
        long = "http-timeout-ms",
        env = "FORGEGRAM_HTTP_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64
    )]
    pub http_timeout_ms: u64,

    #[arg(
        long = "poll-timeout-secs",
        env = "FORGEGRAM_POLL_TIMEOUT_SECS",
        default_value_t = 9,
        value_parser = parse_positive_u64,
        help = "Long-poll timeout passed to getUpdates."
    )]
    pub poll_timeout_secs: u64,
}

impl Cli {
    pub fn correlation_config(&self) -> CorrelationConfig {
        CorrelationConfig {
            message_retention: hours(self.message_retention_hours),
            action_ttl: hours(self.action_ttl_hours),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn oauth_redirect_url(&self) -> String {
        format!("{}/oauth/callback", self.public_url)
    }
}

fn hours(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60 * 60))
}
