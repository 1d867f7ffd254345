use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use forgegram_bridge::{
    serve_bridge, AesGcmSealer, BotRuntime, BridgeContext, BridgeDependencies, BridgeSettings,
    DefaultFormatter, FileBridgeStore,
};
use forgegram_github::{
    GithubOAuthClient, GithubOAuthConfig, GithubRestClientFactory, DEFAULT_OAUTH_SCOPES,
};
use forgegram_telegram::{run_update_polling, PollingConfig, TelegramBotClient};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::cli_args::Cli;

/// Builds the shared bridge state from validated configuration.
pub fn build_bridge_context(
    cli: &Cli,
    telegram: TelegramBotClient,
    bot_username: String,
) -> Result<Arc<BridgeContext>> {
    let sealer = AesGcmSealer::from_key_string(&cli.encryption_key)
        .context("ENCRYPTION_KEY is not a valid AES-GCM key")?;
    let store = FileBridgeStore::open(cli.state_path.clone())
        .with_context(|| format!("failed to open state file {}", cli.state_path.display()))?;
    let oauth_config = GithubOAuthConfig {
        client_id: cli.github_client_id.clone(),
        client_secret: cli.github_client_secret.clone(),
        redirect_url: cli.oauth_redirect_url(),
        oauth_base: cli.github_oauth_base.clone(),
        scopes: DEFAULT_OAUTH_SCOPES.to_string(),
    };
    let oauth_exchange = GithubOAuthClient::new(oauth_config.clone(), cli.http_timeout())
        .context("failed to build github oauth client")?;

    let settings = BridgeSettings {
        public_url: cli.public_url.clone(),
        webhook_secret: cli.github_webhook_secret.clone(),
        bot_username,
        correlation: cli.correlation_config(),
    };
    let dependencies = BridgeDependencies {
        transport: Arc::new(telegram),
        store: Arc::new(store),
        github: Arc::new(GithubRestClientFactory::new(
            cli.github_api_base.clone(),
            cli.http_timeout(),
        )),
        oauth_config,
        oauth_exchange: Arc::new(oauth_exchange),
        sealer: Arc::new(sealer),
        formatter: Arc::new(DefaultFormatter),
    };
    Ok(Arc::new(BridgeContext::new(settings, dependencies)))
}

/// Sweeps every expiring table each `interval` until `shutdown` flips.
pub async fn run_cleanup_loop(
    ctx: Arc<BridgeContext>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = ctx.sweep_expired();
                if report.total() > 0 {
                    tracing::debug!(
                        message_contexts = report.message_contexts,
                        action_tokens = report.action_tokens,
                        admin_lists = report.admin_lists,
                        reload_marks = report.reload_marks,
                        oauth_states = report.oauth_states,
                        "expired state swept"
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

pub async fn run_bridge(cli: Cli) -> Result<()> {
    // Reject a bad key before any network call.
    AesGcmSealer::from_key_string(&cli.encryption_key)
        .context("ENCRYPTION_KEY is not a valid AES-GCM key")?;

    let telegram = TelegramBotClient::new(
        &cli.telegram_api_base,
        &cli.telegram_token,
        cli.http_timeout(),
    )
    .context("failed to build telegram client")?;
    let bot = telegram
        .get_me()
        .await
        .context("failed to resolve bot identity via getMe")?;
    let bot_username = bot
        .username
        .filter(|username| !username.trim().is_empty())
        .ok_or_else(|| anyhow!("telegram bot has no username"))?;
    tracing::info!(bot = %bot_username, "telegram bot identified");

    let ctx = build_bridge_context(&cli, telegram.clone(), bot_username)?;
    let listener = TcpListener::bind(cli.bind.as_str())
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleanup = tokio::spawn(run_cleanup_loop(
        ctx.clone(),
        cli.cleanup_interval(),
        shutdown_rx.clone(),
    ));
    let polling = tokio::spawn(run_update_polling(
        telegram,
        PollingConfig {
            timeout_secs: cli.poll_timeout_secs,
            ..PollingConfig::default()
        },
        Arc::new(BotRuntime::new(ctx.clone())),
        shutdown_rx,
    ));

    let served = serve_bridge(listener, ctx).await;
    let _ = shutdown_tx.send(true);
    let _ = polling.await;
    let _ = cleanup.await;
    tracing::info!("bridge stopped");
    served
}
