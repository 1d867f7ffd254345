//! Telegram Bot API surface used by the bridge: wire types, the outbound
//! transport, MarkdownV2 escaping, and the long-polling loop.

pub mod client;
pub mod markdown;
pub mod polling;
pub mod types;

pub use client::{ChatTransport, TelegramApiError, TelegramBotClient, DEFAULT_TELEGRAM_API_BASE};
pub use markdown::{escape_markdown_v2, escape_markdown_v2_url, markdown_v2_link};
pub use polling::{next_update_offset, run_update_polling, PollingConfig, UpdateHandler};
pub use types::{
    CallbackQuery, Chat, ChatKind, ChatMember, ChatMemberStatus, EditMessageRequest,
    InlineKeyboardButton, InlineKeyboardMarkup, Message, MessageEntity, ParseMode,
    SendMessageRequest, Update, User,
};
