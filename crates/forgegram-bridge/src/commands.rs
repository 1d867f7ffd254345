//! Slash-command parsing for chat messages.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Privacy,
    Connect,
    AddRepo { repo: Option<String> },
    RemoveRepo { repo: Option<String> },
    Repos,
    Settings,
    Reload,
    Logout,
    Close,
    Reopen,
    Approve,
}

impl BotCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Privacy => "privacy",
            Self::Connect => "connect",
            Self::AddRepo { .. } => "addrepo",
            Self::RemoveRepo { .. } => "removerepo",
            Self::Repos => "repos",
            Self::Settings => "settings",
            Self::Reload => "reload",
            Self::Logout => "logout",
            Self::Close => "close",
            Self::Reopen => "reopen",
            Self::Approve => "approve",
        }
    }
}

/// Whether `text` opens with a slash command, known or not.
pub fn starts_with_command(text: &str) -> bool {
    text.trim_start()
        .strip_prefix('/')
        .and_then(|rest| rest.chars().next())
        .is_some_and(|first| first.is_ascii_alphanumeric())
}

/// Parses `/command[@bot] [arg]`. Commands addressed to a different bot and
/// unknown commands yield `None`.
pub fn parse_bot_command(text: &str, bot_username: &str) -> Option<BotCommand> {
    let trimmed = text.trim();
    let mut pieces = trimmed.split_whitespace();
    let head = pieces.next()?.strip_prefix('/')?;
    let name = match head.split_once('@') {
        Some((name, addressee)) => {
            if !addressee.eq_ignore_ascii_case(bot_username.trim_start_matches('@')) {
                return None;
            }
            name
        }
        None => head,
    };
    let argument = pieces.next().map(str::to_string);
    let command = match name.to_ascii_lowercase().as_str() {
        "start" => BotCommand::Start,
        "help" => BotCommand::Help,
        "privacy" => BotCommand::Privacy,
        "connect" => BotCommand::Connect,
        "addrepo" | "add" => BotCommand::AddRepo { repo: argument },
        "removerepo" | "rm" => BotCommand::RemoveRepo { repo: argument },
        "repos" => BotCommand::Repos,
        "settings" | "config" => BotCommand::Settings,
        "reload" => BotCommand::Reload,
        "logout" => BotCommand::Logout,
        "close" => BotCommand::Close,
        "reopen" => BotCommand::Reopen,
        "approve" => BotCommand::Approve,
        _ => return None,
    };
    Some(command)
}
