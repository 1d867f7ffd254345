use std::sync::Arc;
use std::time::Duration;

use forgegram_bridge::sealing::seal_text;
use forgegram_bridge::{
    serve_bridge, AesGcmSealer, BotRuntime, BridgeContext, BridgeDependencies, BridgeSettings,
    BridgeStore, CorrelationConfig, DefaultFormatter, EntityKind, FileBridgeStore, StoredUser,
};
use forgegram_github::{
    sign_github_payload, GithubOAuthClient, GithubOAuthConfig, GithubRestClientFactory,
};
use forgegram_telegram::{TelegramBotClient, Update};
use httpmock::prelude::*;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const WEBHOOK_SECRET: &str = "integration-secret";
const GROUP_CHAT: i64 = -1001;
const MEMBER: i64 = 77;
const NOTIFICATION_ID: i64 = 321;

struct Bridge {
    ctx: Arc<BridgeContext>,
    base_url: String,
    server: tokio::task::JoinHandle<()>,
    _state_dir: tempfile::TempDir,
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn start_bridge(telegram: &MockServer, github: &MockServer) -> Bridge {
    let state_dir = tempfile::tempdir().expect("tempdir");
    let timeout = Duration::from_secs(5);
    let transport =
        TelegramBotClient::new(&telegram.base_url(), "bot-token", timeout).expect("telegram");
    let oauth_config = GithubOAuthConfig {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        redirect_url: "https://bridge.example/oauth/callback".to_string(),
        oauth_base: github.base_url(),
        scopes: "repo admin:repo_hook".to_string(),
    };
    let oauth_exchange = GithubOAuthClient::new(oauth_config.clone(), timeout).expect("oauth");
    let store = FileBridgeStore::open(state_dir.path().join("state.json")).expect("store");
    let sealer = AesGcmSealer::from_key_bytes(&[9u8; 32]).expect("sealer");

    let ctx = Arc::new(BridgeContext::new(
        BridgeSettings {
            public_url: "https://bridge.example".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            bot_username: "forgegram_bot".to_string(),
            correlation: CorrelationConfig::default(),
        },
        BridgeDependencies {
            transport: Arc::new(transport),
            store: Arc::new(store),
            github: Arc::new(GithubRestClientFactory::new(github.base_url(), timeout)),
            oauth_config,
            oauth_exchange: Arc::new(oauth_exchange),
            sealer: Arc::new(sealer),
            formatter: Arc::new(DefaultFormatter),
        },
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server_ctx = ctx.clone();
    let server = tokio::spawn(async move {
        let _ = serve_bridge(listener, server_ctx).await;
    });
    Bridge {
        ctx,
        base_url: format!("http://{addr}"),
        server,
        _state_dir: state_dir,
    }
}

fn repository() -> Value {
    json!({
        "id": 55,
        "name": "widgets",
        "full_name": "acme/widgets",
        "html_url": "https://github.com/acme/widgets",
        "owner": { "login": "acme", "id": 1 }
    })
}

async fn deliver(bridge: &Bridge, event: &str, payload: &Value) -> reqwest::Response {
    let token = bridge.ctx.tenant_tokens.encode(GROUP_CHAT).expect("token");
    let body = payload.to_string();
    reqwest::Client::new()
        .post(format!("{}/webhook/{token}", bridge.base_url))
        .header("x-github-event", event)
        .header("x-github-hook-id", "9001")
        .header(
            "x-hub-signature-256",
            sign_github_payload(body.as_bytes(), WEBHOOK_SECRET),
        )
        .body(body)
        .send()
        .await
        .expect("deliver webhook")
}

async fn wait_for_hits(mock: &httpmock::Mock<'_>, expected: usize) {
    for _ in 0..200 {
        if mock.hits_async().await >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {expected} hits, saw {}", mock.hits_async().await);
}

#[tokio::test]
async fn integration_webhook_notification_reply_roundtrip() {
    let telegram = MockServer::start_async().await;
    let github = MockServer::start_async().await;
    let send_message = telegram
        .mock_async(|when, then| {
            when.method(POST).path("/botbot-token/sendMessage");
            then.status(200).json_body(json!({
                "ok": true,
                "result": { "message_id": NOTIFICATION_ID, "chat": { "id": GROUP_CHAT, "type": "supergroup" } }
            }));
        })
        .await;
    let create_comment = github
        .mock_async(|when, then| {
            when.method(POST)
                .path("/repos/acme/widgets/issues/7/comments")
                .header("authorization", "Bearer gho_member")
                .json_body(json!({ "body": "Ship it" }));
            then.status(201).json_body(json!({ "id": 4001 }));
        })
        .await;
    let bridge = start_bridge(&telegram, &github).await;

    // A push without commits is acknowledged but produces nothing.
    let empty_push = json!({
        "ref": "refs/heads/main",
        "commits": [],
        "repository": repository(),
        "sender": { "login": "octocat" }
    });
    let response = deliver(&bridge, "push", &empty_push).await;
    assert_eq!(response.status().as_u16(), 200);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(send_message.hits_async().await, 0);
    assert!(bridge
        .ctx
        .correlation
        .resolve_reply(GROUP_CHAT, NOTIFICATION_ID)
        .is_none());

    let opened = json!({
        "action": "opened",
        "number": 7,
        "pull_request": {
            "number": 7,
            "title": "Add gears",
            "html_url": "https://github.com/acme/widgets/pull/7",
            "user": { "login": "octocat" }
        },
        "repository": repository(),
        "sender": { "login": "octocat" }
    });
    let response = deliver(&bridge, "pull_request", &opened).await;
    assert_eq!(response.status().as_u16(), 200);
    wait_for_hits(&send_message, 1).await;

    let context = bridge
        .ctx
        .correlation
        .resolve_reply(GROUP_CHAT, NOTIFICATION_ID)
        .expect("correlated notification");
    assert_eq!(context.owner, "acme");
    assert_eq!(context.repo, "widgets");
    assert_eq!(context.number, 7);
    assert_eq!(context.kind, EntityKind::PullRequest);

    let sealed = seal_text(bridge.ctx.sealer.as_ref(), "gho_member").expect("seal");
    bridge
        .ctx
        .store
        .upsert_user(StoredUser {
            telegram_id: MEMBER,
            github_user_id: 12,
            github_login: "member".to_string(),
            sealed_token: sealed,
        })
        .await
        .expect("store user");

    let reply: Update = serde_json::from_value(json!({
        "update_id": 1,
        "message": {
            "message_id": 400,
            "chat": { "id": GROUP_CHAT, "type": "supergroup", "title": "Team" },
            "from": { "id": MEMBER, "is_bot": false, "first_name": "Member" },
            "text": "Ship it",
            "reply_to_message": {
                "message_id": NOTIFICATION_ID,
                "chat": { "id": GROUP_CHAT, "type": "supergroup" },
                "from": { "id": 4242, "is_bot": true, "first_name": "Bridge", "username": "forgegram_bot" },
                "text": "notification"
            }
        }
    }))
    .expect("update");
    BotRuntime::new(bridge.ctx.clone()).handle(reply).await;

    create_comment.assert_async().await;
    assert_eq!(send_message.hits_async().await, 1);
}

#[tokio::test]
async fn integration_forged_signature_is_rejected_without_delivery() {
    let telegram = MockServer::start_async().await;
    let github = MockServer::start_async().await;
    let send_message = telegram
        .mock_async(|when, then| {
            when.method(POST).path("/botbot-token/sendMessage");
            then.status(200).json_body(json!({
                "ok": true,
                "result": { "message_id": 1, "chat": { "id": GROUP_CHAT } }
            }));
        })
        .await;
    let bridge = start_bridge(&telegram, &github).await;
    let token = bridge.ctx.tenant_tokens.encode(GROUP_CHAT).expect("token");
    let body = json!({ "zen": "Keep it logically awesome.", "hook_id": 1 }).to_string();

    let response = reqwest::Client::new()
        .post(format!("{}/webhook/{token}", bridge.base_url))
        .header("x-github-event", "ping")
        .header(
            "x-hub-signature-256",
            sign_github_payload(body.as_bytes(), "wrong-secret"),
        )
        .body(body)
        .send()
        .await
        .expect("deliver");
    assert_eq!(response.status().as_u16(), 401);
    let error: Value = response.json().await.expect("json");
    assert_eq!(error["error"]["code"], "unauthorized");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(send_message.hits_async().await, 0);
}
