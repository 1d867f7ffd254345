//! Telegram Bot API transport.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::types::{
    ChatMember, ChatMemberStatus, EditMessageRequest, InlineKeyboardMarkup, Message, ParseMode,
    SendMessageRequest, Update, User,
};

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum TelegramApiError {
    #[error("telegram {method} request failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("telegram {method} rejected (code {code}): {description}")]
    Api {
        method: &'static str,
        code: u16,
        description: String,
    },
    #[error("failed to decode telegram {method} response: {message}")]
    Decode {
        method: &'static str,
        message: String,
    },
    #[error("invalid telegram client configuration: {0}")]
    Config(String),
}

impl TelegramApiError {
    fn is_message_not_modified(&self) -> bool {
        matches!(
            self,
            Self::Api { description, .. } if description.contains("message is not modified")
        )
    }
}

/// Outbound side of the chat platform as seen by the bridge.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends a message and returns the id Telegram assigned to it.
    async fn send_message(&self, request: &SendMessageRequest) -> Result<i64, TelegramApiError>;
    async fn edit_message_text(&self, request: &EditMessageRequest)
        -> Result<(), TelegramApiError>;
    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TelegramApiError>;
    /// User ids of every administrator of `chat_id`.
    async fn get_chat_administrators(&self, chat_id: i64) -> Result<Vec<i64>, TelegramApiError>;
    async fn get_chat_member_status(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<ChatMemberStatus, TelegramApiError>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct TelegramBotClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramBotClient {
    pub fn new(
        api_base: &str,
        token: &str,
        request_timeout: Duration,
    ) -> Result<Self, TelegramApiError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TelegramApiError::Config(
                "telegram bot token cannot be empty".to_string(),
            ));
        }
        let api_base = api_base.trim().trim_end_matches('/');
        if api_base.is_empty() {
            return Err(TelegramApiError::Config(
                "telegram api base cannot be empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout.max(Duration::from_millis(1)))
            .build()
            .map_err(|error| TelegramApiError::Config(error.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.to_string(),
            token: token.to_string(),
        })
    }

    /// Identity of the bot behind the token. Also validates the token at startup.
    pub async fn get_me(&self) -> Result<User, TelegramApiError> {
        self.call("getMe", json!({})).await
    }

    /// Long-polls for updates after `offset`. The HTTP timeout must exceed `timeout_secs`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramApiError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        payload: Value,
    ) -> Result<T, TelegramApiError> {
        let url = format!("{}/bot{}/{method}", self.api_base, self.token);
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|source| TelegramApiError::Transport {
                method,
                source: source.without_url(),
            })?;
        let status = response.status().as_u16();
        let envelope = response
            .json::<ApiEnvelope<T>>()
            .await
            .map_err(|error| TelegramApiError::Decode {
                method,
                message: error.without_url().to_string(),
            })?;
        if !envelope.ok {
            return Err(TelegramApiError::Api {
                method,
                code: envelope.error_code.unwrap_or(status),
                description: envelope.description.unwrap_or_default(),
            });
        }
        envelope.result.ok_or(TelegramApiError::Decode {
            method,
            message: "response missing result".to_string(),
        })
    }
}

fn message_payload(
    chat_id: i64,
    text: &str,
    parse_mode: Option<ParseMode>,
    keyboard: Option<&InlineKeyboardMarkup>,
) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("chat_id".to_string(), json!(chat_id));
    payload.insert("text".to_string(), json!(text));
    if let Some(parse_mode) = parse_mode {
        payload.insert("parse_mode".to_string(), json!(parse_mode));
    }
    if let Some(keyboard) = keyboard {
        payload.insert("reply_markup".to_string(), json!(keyboard));
    }
    payload
}

#[async_trait]
impl ChatTransport for TelegramBotClient {
    async fn send_message(&self, request: &SendMessageRequest) -> Result<i64, TelegramApiError> {
        let mut payload = message_payload(
            request.chat_id,
            &request.text,
            request.parse_mode,
            request.keyboard.as_ref(),
        );
        if request.disable_link_preview {
            payload.insert(
                "link_preview_options".to_string(),
                json!({ "is_disabled": true }),
            );
        }
        if let Some(reply_to) = request.reply_to_message_id {
            payload.insert(
                "reply_parameters".to_string(),
                json!({ "message_id": reply_to, "allow_sending_without_reply": true }),
            );
        }
        let message: Message = self.call("sendMessage", Value::Object(payload)).await?;
        Ok(message.message_id)
    }

    async fn edit_message_text(
        &self,
        request: &EditMessageRequest,
    ) -> Result<(), TelegramApiError> {
        let mut payload = message_payload(
            request.chat_id,
            &request.text,
            request.parse_mode,
            request.keyboard.as_ref(),
        );
        payload.insert("message_id".to_string(), json!(request.message_id));
        payload.insert(
            "link_preview_options".to_string(),
            json!({ "is_disabled": true }),
        );
        match self
            .call::<Value>("editMessageText", Value::Object(payload))
            .await
        {
            Ok(_) => Ok(()),
            Err(error) if error.is_message_not_modified() => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TelegramApiError> {
        let mut payload = json!({
            "callback_query_id": callback_query_id,
            "show_alert": show_alert,
        });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        self.call::<bool>("answerCallbackQuery", payload)
            .await
            .map(|_| ())
    }

    async fn get_chat_administrators(&self, chat_id: i64) -> Result<Vec<i64>, TelegramApiError> {
        let members: Vec<ChatMember> = self
            .call("getChatAdministrators", json!({ "chat_id": chat_id }))
            .await?;
        Ok(members.into_iter().map(|member| member.user.id).collect())
    }

    async fn get_chat_member_status(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<ChatMemberStatus, TelegramApiError> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                json!({ "chat_id": chat_id, "user_id": user_id }),
            )
            .await?;
        Ok(member.status)
    }
}
