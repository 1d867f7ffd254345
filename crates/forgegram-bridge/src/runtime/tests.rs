use std::time::Duration;

use forgegram_github::{parse_github_event, HookSpec};
use forgegram_telegram::{ChatMemberStatus, ParseMode, Update};
use serde_json::json;

use super::callback_handlers::toggled_events;
use super::BotRuntime;
use crate::dispatch::DispatchOutcome;
use crate::store::RepoLink;
use crate::test_support::{callback_query, reply_message, text_message, TestHarness};

const GROUP: i64 = -100;
const ADMIN: i64 = 1;
const MEMBER: i64 = 2;

fn message_update(message: forgegram_telegram::Message) -> Update {
    Update {
        update_id: 1,
        message: Some(message),
        ..Update::default()
    }
}

fn callback_update(chat_id: i64, from: i64, data: &str) -> Update {
    Update {
        update_id: 2,
        callback_query: Some(callback_query(chat_id, from, data)),
        ..Update::default()
    }
}

async fn send_text(runtime: &BotRuntime, chat_id: i64, from: i64, text: &str) {
    runtime
        .handle(message_update(text_message(chat_id, from, text)))
        .await;
}

fn last_text(harness: &TestHarness) -> String {
    harness
        .transport
        .sent_texts()
        .last()
        .cloned()
        .expect("a message was sent")
}

async fn link(harness: &TestHarness, chat_id: i64, repo: &str, webhook_id: u64) {
    harness
        .ctx
        .store
        .upsert_repo_link(
            chat_id,
            RepoLink {
                repo_full_name: repo.to_string(),
                webhook_id,
            },
        )
        .await
        .expect("link");
}

/// Dispatches a notification for `acme/widgets` and returns its message id.
async fn notify(harness: &TestHarness, event_type: &str, payload: serde_json::Value) -> i64 {
    let event =
        parse_github_event(Some(event_type), payload.to_string().as_bytes()).expect("parse");
    match harness.dispatcher().dispatch(&event, GROUP, None).await {
        DispatchOutcome::Sent { message_id, .. } => message_id,
        other => panic!("expected delivery, got {other:?}"),
    }
}

fn repository() -> serde_json::Value {
    json!({
        "name": "widgets",
        "full_name": "acme/widgets",
        "html_url": "https://github.com/acme/widgets",
        "owner": { "login": "acme" }
    })
}

fn pull_request_opened() -> serde_json::Value {
    json!({
        "action": "opened",
        "pull_request": { "number": 7, "title": "Gears", "html_url": "https://github.com/acme/widgets/pull/7" },
        "repository": repository(),
        "sender": { "login": "octocat" }
    })
}

fn review_comment() -> serde_json::Value {
    json!({
        "action": "created",
        "comment": { "id": 991, "body": "nit", "html_url": "https://github.com/acme/widgets/pull/7#discussion_r991" },
        "pull_request": { "number": 7, "title": "Gears", "html_url": "https://github.com/acme/widgets/pull/7" },
        "repository": repository(),
        "sender": { "login": "octocat" }
    })
}

#[tokio::test]
async fn functional_start_and_unknown_commands() {
    let harness = TestHarness::new();
    let runtime = harness.runtime();
    send_text(&runtime, 10, 10, "/start").await;
    assert!(last_text(&harness).contains("/connect"));
    send_text(&runtime, 10, 10, "/deploy now").await;
    assert_eq!(harness.transport.sent_messages().len(), 1);
}

#[tokio::test]
async fn functional_connect_issues_state_only_in_private_chats() {
    let harness = TestHarness::new();
    let runtime = harness.runtime();
    send_text(&runtime, GROUP, ADMIN, "/connect").await;
    assert!(last_text(&harness).contains("only be used in a private chat"));

    send_text(&runtime, 10, 10, "/connect").await;
    let sent = harness.transport.sent_messages();
    let request = sent.last().expect("connect reply");
    assert_eq!(request.parse_mode, Some(ParseMode::MarkdownV2));
    let state = request
        .text
        .split("state=")
        .nth(1)
        .map(|rest| rest.chars().take_while(char::is_ascii_hexdigit).collect::<String>())
        .expect("state in login url");
    assert_eq!(state.len(), 32);
    assert_eq!(harness.ctx.oauth_states.consume(&state), Some(10));
}

#[tokio::test]
async fn functional_addrepo_creates_hook_with_sealed_tenant_url() {
    let harness = TestHarness::new();
    let runtime = harness.runtime();
    harness.github.add_repository(42, "acme/widgets");
    harness.connect_user(10, "gho_user").await;

    send_text(&runtime, 10, 10, "/addrepo acme/widgets").await;
    assert_eq!(last_text(&harness), "Repository acme/widgets linked successfully!");

    let hooks: Vec<HookSpec> = harness.github.created_hooks();
    assert_eq!(hooks.len(), 1);
    let token = hooks[0]
        .url
        .strip_prefix("https://bridge.example/webhook/")
        .expect("webhook url prefix");
    assert_eq!(harness.ctx.tenant_tokens.decode(token), Some(10));
    assert_eq!(hooks[0].secret, crate::test_support::TEST_WEBHOOK_SECRET);
    assert_eq!(hooks[0].events.len(), 10);

    let link = harness
        .ctx
        .store
        .get_repo_link(10, "acme/widgets")
        .await
        .expect("read")
        .expect("link stored");
    assert_eq!(link.webhook_id, 101);
    assert_eq!(harness.github_factory.tokens(), vec!["gho_user".to_string()]);
}

#[tokio::test]
async fn regression_addrepo_requires_connection_and_valid_name() {
    let harness = TestHarness::new();
    let runtime = harness.runtime();
    send_text(&runtime, 10, 10, "/addrepo acme/widgets").await;
    assert_eq!(last_text(&harness), "Please /connect your GitHub account first.");
    send_text(&runtime, 10, 10, "/add widgets").await;
    assert_eq!(last_text(&harness), "Invalid repository format. Use owner/repo");
    harness.connect_user(10, "gho_user").await;
    send_text(&runtime, 10, 10, "/addrepo acme/missing").await;
    assert!(last_text(&harness).contains("Repository not found"));
    assert!(harness.github.created_hooks().is_empty());
}

#[tokio::test]
async fn functional_group_configuration_is_admin_only() {
    let harness = TestHarness::new();
    harness.transport.set_admins(GROUP, vec![ADMIN]);
    let runtime = harness.runtime();
    send_text(&runtime, GROUP, MEMBER, "/addrepo acme/widgets").await;
    assert_eq!(last_text(&harness), "Only admins can add repositories.");
    send_text(&runtime, GROUP, MEMBER, "/settings").await;
    assert_eq!(last_text(&harness), "Only admins can modify settings.");
    send_text(&runtime, GROUP, ADMIN, "/settings").await;
    assert_eq!(last_text(&harness), "No repositories linked. Use /addrepo first.");
    assert_eq!(harness.transport.admin_fetches(), 1);
}

#[tokio::test]
async fn functional_repo_picker_paginates() {
    let harness = TestHarness::new();
    for id in 1..=12u64 {
        harness.github.add_repository(id, &format!("acme/repo{id}"));
    }
    harness.connect_user(10, "gho_user").await;
    let runtime = harness.runtime();
    send_text(&runtime, 10, 10, "/addrepo").await;

    let sent = harness.transport.sent_messages();
    let picker = sent.last().expect("picker");
    assert_eq!(picker.text, "Select a repository to add (Page 1):");
    let keyboard = picker.keyboard.clone().expect("keyboard");
    assert_eq!(keyboard.inline_keyboard.len(), 6);
    assert_eq!(
        keyboard.inline_keyboard[0][0].callback_data.as_deref(),
        Some("c:ar:id:1")
    );
    let navigation = keyboard.inline_keyboard[5]
        .iter()
        .map(|button| button.text.as_str())
        .collect::<Vec<_>>();
    assert_eq!(navigation, vec!["· 1 ·", "2", "Next >"]);

    runtime.handle(callback_update(10, 10, "c:ar:pg:3")).await;
    let edits = harness.transport.edits();
    let last_page = edits.last().expect("edited picker");
    assert_eq!(last_page.text, "Select a repository to add (Page 3):");
    let rows = &last_page.keyboard.as_ref().expect("keyboard").inline_keyboard;
    let navigation = rows
        .last()
        .expect("nav row")
        .iter()
        .map(|button| button.text.as_str())
        .collect::<Vec<_>>();
    assert_eq!(navigation, vec!["< Prev", "2", "· 3 ·"]);
}

#[tokio::test]
async fn functional_removerepo_deletes_hook_and_link() {
    let harness = TestHarness::new();
    harness.connect_user(10, "gho_user").await;
    harness.github.set_hook_events(77, &["push"]);
    link(&harness, 10, "acme/widgets", 77).await;
    let runtime = harness.runtime();

    send_text(&runtime, 10, 10, "/removerepo").await;
    assert_eq!(last_text(&harness), "Usage: /removerepo owner/repo");
    send_text(&runtime, 10, 10, "/rm acme/widgets").await;
    assert_eq!(last_text(&harness), "Repository acme/widgets removed successfully.");
    assert_eq!(harness.github.hook_events(77), None);
    assert!(harness.ctx.store.chat_links(10).await.expect("links").is_empty());
}

#[tokio::test]
async fn functional_repos_lists_links() {
    let harness = TestHarness::new();
    let runtime = harness.runtime();
    send_text(&runtime, 10, 10, "/repos").await;
    assert_eq!(last_text(&harness), "No repositories linked.");
    link(&harness, 10, "acme/widgets", 1).await;
    link(&harness, 10, "acme/gadgets", 2).await;
    send_text(&runtime, 10, 10, "/repos").await;
    assert_eq!(
        last_text(&harness),
        "Linked Repositories:\n• acme/widgets\n• acme/gadgets"
    );
}

#[tokio::test]
async fn functional_reload_is_rate_limited_per_chat() {
    let harness = TestHarness::new();
    harness.transport.set_admins(GROUP, vec![ADMIN]);
    harness
        .transport
        .set_member_status(GROUP, MEMBER, ChatMemberStatus::Member);
    let runtime = harness.runtime();

    send_text(&runtime, GROUP, MEMBER, "/reload").await;
    assert_eq!(last_text(&harness), "Only admins can reload the cache.");
    send_text(&runtime, GROUP, ADMIN, "/reload").await;
    assert_eq!(last_text(&harness), "Admin cache reloaded.");
    harness.clock.advance(Duration::from_secs(60));
    send_text(&runtime, GROUP, ADMIN, "/reload").await;
    assert_eq!(last_text(&harness), "Please wait 9 minutes before reloading again.");
    harness.clock.advance(Duration::from_secs(10 * 60));
    send_text(&runtime, GROUP, ADMIN, "/reload").await;
    assert_eq!(last_text(&harness), "Admin cache reloaded.");

    let before = harness.transport.sent_messages().len();
    send_text(&runtime, 10, 10, "/reload").await;
    assert_eq!(harness.transport.sent_messages().len(), before);
}

#[tokio::test]
async fn functional_logout_clears_token() {
    let harness = TestHarness::new();
    harness.connect_user(10, "gho_user").await;
    let runtime = harness.runtime();
    send_text(&runtime, 10, 10, "/logout").await;
    assert_eq!(
        last_text(&harness),
        "✅ You have been logged out. Use /connect to reconnect."
    );
    assert_eq!(
        harness.ctx.store.sealed_user_token(10).await.expect("read"),
        None
    );
}

#[tokio::test]
async fn integration_reply_to_notification_posts_comment() {
    let harness = TestHarness::new();
    harness.connect_user(ADMIN, "gho_user").await;
    let message_id = notify(&harness, "pull_request", pull_request_opened()).await;
    let runtime = harness.runtime();

    runtime
        .handle(message_update(reply_message(GROUP, ADMIN, message_id, "Looks good")))
        .await;
    assert!(harness
        .github
        .calls()
        .contains(&"create_issue_comment acme/widgets#7 Looks good".to_string()));
}

#[tokio::test]
async fn functional_reply_to_review_comment_is_threaded() {
    let harness = TestHarness::new();
    harness.connect_user(ADMIN, "gho_user").await;
    let message_id = notify(&harness, "pull_request_review_comment", review_comment()).await;
    let runtime = harness.runtime();

    runtime
        .handle(message_update(reply_message(GROUP, ADMIN, message_id, "fixed")))
        .await;
    assert!(harness
        .github
        .calls()
        .contains(&"reply_to_review_comment acme/widgets#7 991 fixed".to_string()));
}

#[tokio::test]
async fn regression_reply_without_context_reports_expiry() {
    let harness = TestHarness::new();
    let runtime = harness.runtime();
    runtime
        .handle(message_update(reply_message(GROUP, ADMIN, 555, "hello?")))
        .await;
    assert_eq!(
        last_text(&harness),
        "Context not found. The message might be too old."
    );

    let mut human_reply = reply_message(GROUP, ADMIN, 556, "chatting");
    if let Some(replied) = human_reply.reply_to_message.as_mut() {
        replied.from = Some(crate::test_support::user(MEMBER));
    }
    let before = harness.transport.sent_messages().len();
    runtime.handle(message_update(human_reply)).await;
    assert_eq!(harness.transport.sent_messages().len(), before);
}

#[tokio::test]
async fn functional_reply_commands_act_on_correlated_entity() {
    let harness = TestHarness::new();
    harness.connect_user(ADMIN, "gho_user").await;
    let message_id = notify(&harness, "pull_request", pull_request_opened()).await;
    let runtime = harness.runtime();

    runtime
        .handle(message_update(reply_message(GROUP, ADMIN, message_id, "/approve")))
        .await;
    assert_eq!(last_text(&harness), "✅ PR #7 approved.");
    runtime
        .handle(message_update(reply_message(GROUP, ADMIN, message_id, "/close")))
        .await;
    assert_eq!(last_text(&harness), "✅ Issue/PR #7 closed.");
    runtime
        .handle(message_update(reply_message(GROUP, ADMIN, message_id, "/reopen")))
        .await;
    assert_eq!(last_text(&harness), "✅ Issue/PR #7 reopened.");

    let calls = harness.github.calls();
    assert!(calls.contains(&"approve_pull_request acme/widgets#7".to_string()));
    assert!(calls.contains(&"set_issue_state acme/widgets#7 closed".to_string()));
    assert!(calls.contains(&"set_issue_state acme/widgets#7 open".to_string()));
    assert!(!calls.iter().any(|call| call.starts_with("create_issue_comment")));
}

#[tokio::test]
async fn regression_approve_rejects_issues_and_missing_reply() {
    let harness = TestHarness::new();
    harness.connect_user(ADMIN, "gho_user").await;
    let message_id = notify(
        &harness,
        "issues",
        json!({
            "action": "opened",
            "issue": { "number": 3, "title": "Bug" },
            "repository": repository()
        }),
    )
    .await;
    let runtime = harness.runtime();
    send_text(&runtime, GROUP, ADMIN, "/approve").await;
    assert_eq!(
        last_text(&harness),
        "Please use this command in reply to a notification."
    );
    runtime
        .handle(message_update(reply_message(GROUP, ADMIN, message_id, "/approve")))
        .await;
    assert_eq!(last_text(&harness), "This command is only for Pull Requests.");
}

#[tokio::test]
async fn regression_github_auth_failure_clears_credential() {
    let harness = TestHarness::new();
    harness.connect_user(ADMIN, "gho_user").await;
    let message_id = notify(&harness, "pull_request", pull_request_opened()).await;
    harness.github.fail_with(401);
    let runtime = harness.runtime();

    runtime
        .handle(message_update(reply_message(GROUP, ADMIN, message_id, "/approve")))
        .await;
    assert!(last_text(&harness).contains("Please /connect again"));
    assert_eq!(
        harness.ctx.store.sealed_user_token(ADMIN).await.expect("read"),
        None
    );
}

#[tokio::test]
async fn functional_pr_action_buttons_use_action_tokens() {
    let harness = TestHarness::new();
    harness.transport.set_admins(GROUP, vec![ADMIN]);
    harness.connect_user(MEMBER, "gho_member").await;
    link(&harness, GROUP, "acme/widgets", 9).await;
    notify(&harness, "pull_request", pull_request_opened()).await;
    let keyboard = harness.transport.sent_messages()[0]
        .keyboard
        .clone()
        .expect("keyboard");
    let approve = keyboard.inline_keyboard[1][0]
        .callback_data
        .clone()
        .expect("approve");
    let close = keyboard.inline_keyboard[1][1]
        .callback_data
        .clone()
        .expect("close");
    let runtime = harness.runtime();

    runtime.handle(callback_update(GROUP, MEMBER, &approve)).await;
    runtime.handle(callback_update(GROUP, MEMBER, &close)).await;
    runtime
        .handle(callback_update(GROUP, MEMBER, "act:approve:unknown"))
        .await;

    let answers = harness.transport.answers();
    let texts = answers
        .iter()
        .map(|answer| answer.text.as_deref().unwrap_or(""))
        .collect::<Vec<_>>();
    assert_eq!(
        texts,
        vec![
            "Approved!",
            "Closed!",
            "Action expired. Please open the PR link manually."
        ]
    );
    let calls = harness.github.calls();
    assert!(calls.contains(&"approve_pull_request acme/widgets#7".to_string()));
    assert!(calls.contains(&"close_pull_request acme/widgets#7".to_string()));
}

#[tokio::test]
async fn regression_pr_action_requires_linked_repo() {
    let harness = TestHarness::new();
    harness.connect_user(MEMBER, "gho_member").await;
    notify(&harness, "pull_request", pull_request_opened()).await;
    let approve = harness.transport.sent_messages()[0]
        .keyboard
        .clone()
        .expect("keyboard")
        .inline_keyboard[1][0]
        .callback_data
        .clone()
        .expect("approve");
    harness
        .runtime()
        .handle(callback_update(GROUP, MEMBER, &approve))
        .await;
    assert_eq!(
        harness.transport.answers()[0].text.as_deref(),
        Some("This chat is not linked to the repo.")
    );
    assert!(harness.github.calls().is_empty());
}

#[tokio::test]
async fn functional_settings_callbacks_toggle_hook_events() {
    let harness = TestHarness::new();
    harness.connect_user(10, "gho_user").await;
    harness.github.set_hook_events(9, &["*"]);
    link(&harness, 10, "acme/widgets", 9).await;
    let runtime = harness.runtime();

    runtime.handle(callback_update(10, 10, "c:r:acme/widgets")).await;
    let menu = harness.transport.edits().pop().expect("menu");
    assert_eq!(menu.text, "Configuration for acme/widgets:");
    let menu_data = menu
        .keyboard
        .expect("keyboard")
        .inline_keyboard
        .iter()
        .map(|row| row[0].callback_data.clone().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(
        menu_data,
        vec![
            "c:presets:acme/widgets:push",
            "c:presets:acme/widgets:all",
            "c:ep:acme/widgets:1",
            "c:ls"
        ]
    );

    runtime
        .handle(callback_update(10, 10, "c:te:acme/widgets:p:1"))
        .await;
    let events = harness.github.hook_events(9).expect("hook");
    assert!(!events.contains(&"push".to_string()));
    assert_eq!(events.len(), 9);
    let page = harness.transport.edits().pop().expect("event page");
    assert_eq!(page.text, "Individual Events for acme/widgets:");
    let rows = page.keyboard.expect("keyboard").inline_keyboard;
    assert_eq!(rows[0][0].text, "❌ Code");
    assert_eq!(rows[0][1].text, "✅ Issues");
    assert_eq!(
        rows[5][0].url.as_deref(),
        Some("https://github.com/acme/widgets/settings/hooks/9")
    );

    runtime
        .handle(callback_update(10, 10, "c:presets:acme/widgets:push"))
        .await;
    assert_eq!(harness.github.hook_events(9), Some(vec!["push".to_string()]));
}

#[tokio::test]
async fn functional_link_repo_by_id_callback() {
    let harness = TestHarness::new();
    harness.connect_user(10, "gho_user").await;
    harness.github.add_repository(42, "acme/widgets");
    harness
        .runtime()
        .handle(callback_update(10, 10, "c:ar:id:42"))
        .await;
    assert_eq!(
        harness.transport.edits().pop().expect("edit").text,
        "✅ Repository acme/widgets linked successfully!"
    );
    assert!(harness
        .ctx
        .store
        .get_repo_link(10, "acme/widgets")
        .await
        .expect("read")
        .is_some());
}

#[tokio::test]
async fn regression_group_settings_callbacks_require_admin() {
    let harness = TestHarness::new();
    harness.transport.set_admins(GROUP, vec![ADMIN]);
    harness
        .runtime()
        .handle(callback_update(GROUP, MEMBER, "c:ls"))
        .await;
    let answer = harness.transport.answers().pop().expect("answer");
    assert_eq!(answer.text.as_deref(), Some("Only admins can change settings"));
    assert!(answer.show_alert);
    assert!(harness.transport.edits().is_empty());
}

#[tokio::test]
async fn regression_malformed_callbacks_are_ignored() {
    let harness = TestHarness::new();
    let runtime = harness.runtime();
    for data in ["c:bogus", "c", "act:approve", "zzz:1:2", "c:te:nope:p"] {
        runtime.handle(callback_update(10, 10, data)).await;
    }
    assert!(harness.transport.edits().is_empty());
    assert!(harness.transport.sent_messages().is_empty());
    assert!(harness
        .transport
        .answers()
        .iter()
        .all(|answer| answer.text.is_none()));
}

#[test]
fn unit_toggled_events_expands_wildcard() {
    let toggled = toggled_events(&["*".to_string()], "star");
    assert_eq!(toggled.len(), 9);
    assert!(!toggled.contains(&"star".to_string()));

    let added = toggled_events(&["push".to_string()], "issues");
    assert_eq!(added, vec!["push".to_string(), "issues".to_string()]);
    assert!(toggled_events(&["push".to_string()], "push").is_empty());
}
