//! In-process fakes for the chat transport and GitHub collaborators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use forgegram_core::ManualClock;
use forgegram_github::{
    GithubApi, GithubApiError, GithubClientFactory, GithubHook, GithubOAuthConfig,
    GithubRepository, GithubUser, HookSpec, IssueState, OAuthCodeExchange, RepositoryPage,
};
use forgegram_telegram::{
    CallbackQuery, Chat, ChatKind, ChatMemberStatus, ChatTransport, EditMessageRequest, Message,
    SendMessageRequest, TelegramApiError, User,
};
use tempfile::TempDir;

use crate::context::{BridgeContext, BridgeDependencies, BridgeSettings};
use crate::correlation::CorrelationConfig;
use crate::dispatch::NotificationDispatcher;
use crate::formatter::DefaultFormatter;
use crate::runtime::BotRuntime;
use crate::sealing::{seal_text, AesGcmSealer};
use crate::store::{BridgeStore, FileBridgeStore, StoredUser};

pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const TEST_BOT_USERNAME: &str = "forgegram_bot";
pub const TEST_BOT_USER_ID: i64 = 4242;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackAnswer {
    pub id: String,
    pub text: Option<String>,
    pub show_alert: bool,
}

#[derive(Default)]
struct TransportState {
    sent: Vec<SendMessageRequest>,
    edits: Vec<EditMessageRequest>,
    answers: Vec<CallbackAnswer>,
    admins: HashMap<i64, Vec<i64>>,
    member_status: HashMap<(i64, i64), ChatMemberStatus>,
    admin_fetches: usize,
    fail_sends: bool,
    next_message_id: i64,
}

#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<TransportState>,
}

impl FakeTransport {
    fn with_state<T>(&self, f: impl FnOnce(&mut TransportState) -> T) -> T {
        let mut state = self.state.lock().expect("transport state");
        f(&mut state)
    }

    pub fn set_admins(&self, chat_id: i64, admins: Vec<i64>) {
        self.with_state(|state| {
            state.admins.insert(chat_id, admins);
        });
    }

    pub fn set_member_status(&self, chat_id: i64, user_id: i64, status: ChatMemberStatus) {
        self.with_state(|state| {
            state.member_status.insert((chat_id, user_id), status);
        });
    }

    pub fn fail_sends(&self, fail: bool) {
        self.with_state(|state| state.fail_sends = fail);
    }

    pub fn admin_fetches(&self) -> usize {
        self.with_state(|state| state.admin_fetches)
    }

    pub fn sent_messages(&self) -> Vec<SendMessageRequest> {
        self.with_state(|state| state.sent.clone())
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.with_state(|state| state.sent.iter().map(|sent| sent.text.clone()).collect())
    }

    pub fn edits(&self) -> Vec<EditMessageRequest> {
        self.with_state(|state| state.edits.clone())
    }

    pub fn answers(&self) -> Vec<CallbackAnswer> {
        self.with_state(|state| state.answers.clone())
    }
}

fn telegram_error(method: &'static str) -> TelegramApiError {
    TelegramApiError::Api {
        method,
        code: 400,
        description: "Bad Request: chat not found".to_string(),
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn send_message(&self, request: &SendMessageRequest) -> Result<i64, TelegramApiError> {
        self.with_state(|state| {
            if state.fail_sends {
                return Err(telegram_error("sendMessage"));
            }
            state.next_message_id += 1;
            state.sent.push(request.clone());
            Ok(1_000 + state.next_message_id)
        })
    }

    async fn edit_message_text(
        &self,
        request: &EditMessageRequest,
    ) -> Result<(), TelegramApiError> {
        self.with_state(|state| state.edits.push(request.clone()));
        Ok(())
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TelegramApiError> {
        self.with_state(|state| {
            state.answers.push(CallbackAnswer {
                id: callback_query_id.to_string(),
                text: text.map(str::to_string),
                show_alert,
            })
        });
        Ok(())
    }

    async fn get_chat_administrators(&self, chat_id: i64) -> Result<Vec<i64>, TelegramApiError> {
        self.with_state(|state| {
            state.admin_fetches += 1;
            state
                .admins
                .get(&chat_id)
                .cloned()
                .ok_or_else(|| telegram_error("getChatAdministrators"))
        })
    }

    async fn get_chat_member_status(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<ChatMemberStatus, TelegramApiError> {
        self.with_state(|state| {
            if let Some(status) = state.member_status.get(&(chat_id, user_id)) {
                return Ok(*status);
            }
            match state.admins.get(&chat_id) {
                Some(admins) if admins.contains(&user_id) => Ok(ChatMemberStatus::Administrator),
                Some(_) => Ok(ChatMemberStatus::Member),
                None => Err(telegram_error("getChatMember")),
            }
        })
    }
}

struct GithubState {
    calls: Vec<String>,
    failure: Option<u16>,
    user: GithubUser,
    repositories: Vec<GithubRepository>,
    hooks: HashMap<u64, Vec<String>>,
    created_hooks: Vec<HookSpec>,
    next_hook_id: u64,
}

pub struct FakeGithub {
    state: Mutex<GithubState>,
}

impl Default for FakeGithub {
    fn default() -> Self {
        Self {
            state: Mutex::new(GithubState {
                calls: Vec::new(),
                failure: None,
                user: GithubUser {
                    login: "octocat".to_string(),
                    id: 583_231,
                    html_url: "https://github.com/octocat".to_string(),
                },
                repositories: Vec::new(),
                hooks: HashMap::new(),
                created_hooks: Vec::new(),
                next_hook_id: 100,
            }),
        }
    }
}

impl FakeGithub {
    fn with_state<T>(&self, f: impl FnOnce(&mut GithubState) -> T) -> T {
        let mut state = self.state.lock().expect("github state");
        f(&mut state)
    }

    /// Every subsequent call fails with `status`.
    pub fn fail_with(&self, status: u16) {
        self.with_state(|state| state.failure = Some(status));
    }

    pub fn add_repository(&self, id: u64, full_name: &str) {
        let (owner, name) = full_name.split_once('/').expect("owner/name");
        self.with_state(|state| {
            state.repositories.push(GithubRepository {
                id,
                name: name.to_string(),
                full_name: full_name.to_string(),
                html_url: format!("https://github.com/{full_name}"),
                owner: GithubUser {
                    login: owner.to_string(),
                    ..GithubUser::default()
                },
                ..GithubRepository::default()
            })
        });
    }

    pub fn set_hook_events(&self, hook_id: u64, events: &[&str]) {
        self.with_state(|state| {
            state
                .hooks
                .insert(hook_id, events.iter().map(|event| event.to_string()).collect());
        });
    }

    pub fn hook_events(&self, hook_id: u64) -> Option<Vec<String>> {
        self.with_state(|state| state.hooks.get(&hook_id).cloned())
    }

    pub fn created_hooks(&self) -> Vec<HookSpec> {
        self.with_state(|state| state.created_hooks.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|state| state.calls.clone())
    }

    fn record(&self, operation: &'static str, call: String) -> Result<(), GithubApiError> {
        self.with_state(|state| {
            state.calls.push(call);
            match state.failure {
                Some(status) => Err(GithubApiError::Status {
                    operation,
                    status,
                    message: "Bad credentials".to_string(),
                }),
                None => Ok(()),
            }
        })
    }
}

fn not_found(operation: &'static str) -> GithubApiError {
    GithubApiError::Status {
        operation,
        status: 404,
        message: "Not Found".to_string(),
    }
}

#[async_trait]
impl GithubApi for FakeGithub {
    async fn current_user(&self) -> Result<GithubUser, GithubApiError> {
        self.record("get user", "current_user".to_string())?;
        Ok(self.with_state(|state| state.user.clone()))
    }

    async fn list_repositories(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<RepositoryPage, GithubApiError> {
        self.record("list repositories", format!("list_repositories page={page}"))?;
        Ok(self.with_state(|state| {
            let per_page = per_page.max(1) as usize;
            let total = state.repositories.len();
            let last = total.div_ceil(per_page).max(1) as u32;
            let start = (page.saturating_sub(1) as usize) * per_page;
            RepositoryPage {
                repositories: state
                    .repositories
                    .iter()
                    .skip(start)
                    .take(per_page)
                    .cloned()
                    .collect(),
                page,
                prev_page: (page > 1).then(|| page - 1),
                next_page: (page < last).then(|| page + 1),
                last_page: (page < last).then_some(last),
            }
        }))
    }

    async fn get_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<GithubRepository, GithubApiError> {
        self.record("get repository", format!("get_repository {owner}/{name}"))?;
        let full_name = format!("{owner}/{name}");
        self.with_state(|state| {
            state
                .repositories
                .iter()
                .find(|repository| repository.full_name == full_name)
                .cloned()
                .ok_or_else(|| not_found("get repository"))
        })
    }

    async fn get_repository_by_id(&self, id: u64) -> Result<GithubRepository, GithubApiError> {
        self.record("get repository", format!("get_repository_by_id {id}"))?;
        self.with_state(|state| {
            state
                .repositories
                .iter()
                .find(|repository| repository.id == id)
                .cloned()
                .ok_or_else(|| not_found("get repository"))
        })
    }

    async fn create_hook(
        &self,
        owner: &str,
        name: &str,
        spec: &HookSpec,
    ) -> Result<GithubHook, GithubApiError> {
        self.record("create hook", format!("create_hook {owner}/{name}"))?;
        Ok(self.with_state(|state| {
            state.next_hook_id += 1;
            let id = state.next_hook_id;
            state.hooks.insert(id, spec.events.clone());
            state.created_hooks.push(spec.clone());
            GithubHook {
                id,
                events: spec.events.clone(),
                active: true,
            }
        }))
    }

    async fn get_hook(
        &self,
        owner: &str,
        name: &str,
        hook_id: u64,
    ) -> Result<GithubHook, GithubApiError> {
        self.record("get hook", format!("get_hook {owner}/{name} {hook_id}"))?;
        self.with_state(|state| {
            state
                .hooks
                .get(&hook_id)
                .map(|events| GithubHook {
                    id: hook_id,
                    events: events.clone(),
                    active: true,
                })
                .ok_or_else(|| not_found("get hook"))
        })
    }

    async fn update_hook_events(
        &self,
        owner: &str,
        name: &str,
        hook_id: u64,
        events: &[String],
    ) -> Result<GithubHook, GithubApiError> {
        self.record(
            "update hook",
            format!("update_hook_events {owner}/{name} {hook_id} {}", events.join(",")),
        )?;
        Ok(self.with_state(|state| {
            state.hooks.insert(hook_id, events.to_vec());
            GithubHook {
                id: hook_id,
                events: events.to_vec(),
                active: true,
            }
        }))
    }

    async fn delete_hook(
        &self,
        owner: &str,
        name: &str,
        hook_id: u64,
    ) -> Result<(), GithubApiError> {
        self.record("delete hook", format!("delete_hook {owner}/{name} {hook_id}"))?;
        self.with_state(|state| state.hooks.remove(&hook_id));
        Ok(())
    }

    async fn create_issue_comment(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        body: &str,
    ) -> Result<u64, GithubApiError> {
        self.record(
            "create comment",
            format!("create_issue_comment {owner}/{name}#{number} {body}"),
        )?;
        Ok(1)
    }

    async fn reply_to_review_comment(
        &self,
        owner: &str,
        name: &str,
        pull_number: u64,
        comment_id: u64,
        body: &str,
    ) -> Result<u64, GithubApiError> {
        self.record(
            "reply to review comment",
            format!("reply_to_review_comment {owner}/{name}#{pull_number} {comment_id} {body}"),
        )?;
        Ok(2)
    }

    async fn set_issue_state(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        state: IssueState,
    ) -> Result<(), GithubApiError> {
        let state = match state {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
        };
        self.record(
            "update issue",
            format!("set_issue_state {owner}/{name}#{number} {state}"),
        )
    }

    async fn approve_pull_request(
        &self,
        owner: &str,
        name: &str,
        number: u64,
    ) -> Result<(), GithubApiError> {
        self.record("approve", format!("approve_pull_request {owner}/{name}#{number}"))
    }

    async fn close_pull_request(
        &self,
        owner: &str,
        name: &str,
        number: u64,
    ) -> Result<(), GithubApiError> {
        self.record("close", format!("close_pull_request {owner}/{name}#{number}"))
    }
}

pub struct FakeGithubFactory {
    api: Arc<FakeGithub>,
    tokens: Mutex<Vec<String>>,
}

impl FakeGithubFactory {
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().expect("tokens").clone()
    }
}

impl GithubClientFactory for FakeGithubFactory {
    fn client_for_token(&self, token: &str) -> Result<Arc<dyn GithubApi>, GithubApiError> {
        self.tokens.lock().expect("tokens").push(token.to_string());
        Ok(self.api.clone())
    }
}

pub struct FakeOAuthExchange {
    token: Mutex<Option<String>>,
}

impl FakeOAuthExchange {
    pub fn set_token(&self, token: Option<&str>) {
        *self.token.lock().expect("token") = token.map(str::to_string);
    }
}

#[async_trait]
impl OAuthCodeExchange for FakeOAuthExchange {
    async fn exchange_code(&self, code: &str) -> Result<String, GithubApiError> {
        self.token
            .lock()
            .expect("token")
            .clone()
            .filter(|_| code != "bad-code")
            .ok_or_else(|| GithubApiError::Status {
                operation: "exchange oauth code",
                status: 400,
                message: "bad_verification_code".to_string(),
            })
    }
}

pub struct TestHarness {
    pub ctx: Arc<BridgeContext>,
    pub transport: Arc<FakeTransport>,
    pub github: Arc<FakeGithub>,
    pub github_factory: Arc<FakeGithubFactory>,
    pub oauth_exchange: Arc<FakeOAuthExchange>,
    pub clock: Arc<ManualClock>,
    _state_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let state_dir = tempfile::tempdir().expect("tempdir");
        let store = FileBridgeStore::open(state_dir.path().join("bridge.json")).expect("store");
        let transport = Arc::new(FakeTransport::default());
        let github = Arc::new(FakeGithub::default());
        let github_factory = Arc::new(FakeGithubFactory {
            api: github.clone(),
            tokens: Mutex::new(Vec::new()),
        });
        let oauth_exchange = Arc::new(FakeOAuthExchange {
            token: Mutex::new(Some("gho_fresh".to_string())),
        });
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let sealer = AesGcmSealer::from_key_bytes(&[7u8; 32]).expect("key");
        let ctx = BridgeContext::with_clock(
            BridgeSettings {
                public_url: "https://bridge.example".to_string(),
                webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
                bot_username: TEST_BOT_USERNAME.to_string(),
                correlation: CorrelationConfig::default(),
            },
            BridgeDependencies {
                transport: transport.clone(),
                store: Arc::new(store),
                github: github_factory.clone(),
                oauth_config: GithubOAuthConfig {
                    client_id: "client-id".to_string(),
                    client_secret: "client-secret".to_string(),
                    redirect_url: "https://bridge.example/oauth/callback".to_string(),
                    oauth_base: "https://github.com".to_string(),
                    scopes: "repo admin:repo_hook".to_string(),
                },
                oauth_exchange: oauth_exchange.clone(),
                sealer: Arc::new(sealer),
                formatter: Arc::new(DefaultFormatter),
            },
            clock.clone(),
        );
        Self {
            ctx: Arc::new(ctx),
            transport,
            github,
            github_factory,
            oauth_exchange,
            clock,
            _state_dir: state_dir,
        }
    }

    pub fn dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(self.ctx.clone())
    }

    pub fn runtime(&self) -> BotRuntime {
        BotRuntime::new(self.ctx.clone())
    }

    /// Stores a sealed OAuth token for `user_id`.
    pub async fn connect_user(&self, user_id: i64, token: &str) {
        let sealed = seal_text(self.ctx.sealer.as_ref(), token).expect("seal");
        self.ctx
            .store
            .upsert_user(StoredUser {
                telegram_id: user_id,
                github_user_id: 1,
                github_login: "octocat".to_string(),
                sealed_token: sealed,
            })
            .await
            .expect("store user");
    }
}

pub fn user(id: i64) -> User {
    User {
        id,
        is_bot: false,
        first_name: format!("user{id}"),
        username: None,
    }
}

pub fn bot_user() -> User {
    User {
        id: TEST_BOT_USER_ID,
        is_bot: true,
        first_name: "Forgegram".to_string(),
        username: Some(TEST_BOT_USERNAME.to_string()),
    }
}

pub fn chat(id: i64) -> Chat {
    Chat {
        id,
        kind: if id > 0 {
            ChatKind::Private
        } else {
            ChatKind::Supergroup
        },
        title: (id < 0).then(|| "Team".to_string()),
    }
}

pub fn text_message(chat_id: i64, from: i64, text: &str) -> Message {
    Message {
        message_id: 10,
        chat: chat(chat_id),
        from: Some(user(from)),
        text: Some(text.to_string()),
        ..Message::default()
    }
}

/// A message replying to `replied_to_id`, which was sent by the bot.
pub fn reply_message(chat_id: i64, from: i64, replied_to_id: i64, text: &str) -> Message {
    let mut message = text_message(chat_id, from, text);
    message.reply_to_message = Some(Box::new(Message {
        message_id: replied_to_id,
        chat: chat(chat_id),
        from: Some(bot_user()),
        text: Some("notification".to_string()),
        ..Message::default()
    }));
    message
}

pub fn callback_query(chat_id: i64, from: i64, data: &str) -> CallbackQuery {
    CallbackQuery {
        id: "cb-1".to_string(),
        from: user(from),
        message: Some(Message {
            message_id: 77,
            chat: chat(chat_id),
            from: Some(bot_user()),
            text: Some("menu".to_string()),
            ..Message::default()
        }),
        data: Some(data.to_string()),
    }
}
