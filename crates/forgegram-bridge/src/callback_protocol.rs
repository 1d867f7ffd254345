//! Colon-delimited inline-button payloads: `<namespace>:<action>[:<arg>]*`.
//!
//! The only variable-length argument is a repository full name, which never
//! contains `:` and always sits at a fixed position. Anything the decoder does
//! not recognize is ignored, so stale buttons from an older layout are harmless.

use std::collections::HashMap;

use forgegram_github::SupportedEvent;

/// Telegram rejects `callback_data` longer than this many bytes.
pub const CALLBACK_DATA_LIMIT: usize = 64;

const CONFIG_NAMESPACE: &str = "c";
const ACTION_NAMESPACE: &str = "act";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetMode {
    PushOnly,
    Everything,
}

impl PresetMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PushOnly => "push",
            Self::Everything => "all",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "push" => Some(Self::PushOnly),
            "all" => Some(Self::Everything),
            _ => None,
        }
    }

    /// Hook event list installed by the preset.
    pub fn hook_events(self) -> Vec<String> {
        match self {
            Self::PushOnly => vec!["push".to_string()],
            Self::Everything => vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackCommand {
    ListRepos,
    RepoPickerPage { page: u32 },
    LinkRepoById { repo_id: u64 },
    RepoMenu { repo: String },
    ApplyPreset { repo: String, mode: PresetMode },
    EventPage { repo: String, page: u32 },
    ToggleEvent { repo: String, event: String, page: u32 },
    Approve { token: String },
    ClosePullRequest { token: String },
}

impl CallbackCommand {
    /// Configuration commands are gated on chat-admin membership in groups.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Approve { .. } | Self::ClosePullRequest { .. })
    }
}

/// Owns the event alias tables built once at startup.
#[derive(Debug, Clone)]
pub struct CallbackCodec {
    short_by_event: HashMap<String, String>,
    event_by_short: HashMap<String, String>,
}

impl CallbackCodec {
    pub fn new(events: &[SupportedEvent]) -> Self {
        let mut short_by_event = HashMap::with_capacity(events.len());
        let mut event_by_short = HashMap::with_capacity(events.len());
        for event in events {
            short_by_event.insert(event.name.to_string(), event.short.to_string());
            event_by_short.insert(event.short.to_string(), event.name.to_string());
        }
        Self {
            short_by_event,
            event_by_short,
        }
    }

    pub fn short_code(&self, event: &str) -> Option<&str> {
        self.short_by_event.get(event).map(String::as_str)
    }

    fn resolve_event(&self, code: &str) -> Option<String> {
        if let Some(event) = self.event_by_short.get(code) {
            return Some(event.clone());
        }
        self.short_by_event
            .contains_key(code)
            .then(|| code.to_string())
    }

    /// Decodes a payload; `None` means "ignore this press".
    pub fn decode(&self, data: &str) -> Option<CallbackCommand> {
        let parts = data.split(':').collect::<Vec<_>>();
        match parts.as_slice() {
            [CONFIG_NAMESPACE, rest @ ..] => self.decode_config(rest),
            [ACTION_NAMESPACE, "approve", token] if !token.is_empty() => {
                Some(CallbackCommand::Approve {
                    token: (*token).to_string(),
                })
            }
            [ACTION_NAMESPACE, "close", token] if !token.is_empty() => {
                Some(CallbackCommand::ClosePullRequest {
                    token: (*token).to_string(),
                })
            }
            _ => None,
        }
    }

    fn decode_config(&self, parts: &[&str]) -> Option<CallbackCommand> {
        match parts {
            ["ls"] => Some(CallbackCommand::ListRepos),
            ["ar", "pg", page] => Some(CallbackCommand::RepoPickerPage {
                page: parse_page(page),
            }),
            ["ar", "id", repo_id] => repo_id
                .parse::<u64>()
                .ok()
                .filter(|id| *id != 0)
                .map(|repo_id| CallbackCommand::LinkRepoById { repo_id }),
            ["r", repo] => valid_repo(repo).map(|repo| CallbackCommand::RepoMenu { repo }),
            ["presets", repo, mode] => {
                let repo = valid_repo(repo)?;
                let mode = PresetMode::parse(mode)?;
                Some(CallbackCommand::ApplyPreset { repo, mode })
            }
            ["iev" | "ep", repo, page] => valid_repo(repo).map(|repo| CallbackCommand::EventPage {
                repo,
                page: parse_page(page),
            }),
            ["te", repo, code] => self.decode_toggle(repo, code, 1),
            ["te", repo, code, page] => self.decode_toggle(repo, code, parse_page(page)),
            _ => None,
        }
    }

    fn decode_toggle(&self, repo: &str, code: &str, page: u32) -> Option<CallbackCommand> {
        let repo = valid_repo(repo)?;
        let event = self.resolve_event(code)?;
        Some(CallbackCommand::ToggleEvent { repo, event, page })
    }

    /// Renders `command` to a payload, or `None` when it would not fit in
    /// [`CALLBACK_DATA_LIMIT`] or names an event without a short code.
    pub fn encode(&self, command: &CallbackCommand) -> Option<String> {
        let data = match command {
            CallbackCommand::ListRepos => "c:ls".to_string(),
            CallbackCommand::RepoPickerPage { page } => format!("c:ar:pg:{page}"),
            CallbackCommand::LinkRepoById { repo_id } => format!("c:ar:id:{repo_id}"),
            CallbackCommand::RepoMenu { repo } => format!("c:r:{repo}"),
            CallbackCommand::ApplyPreset { repo, mode } => {
                format!("c:presets:{repo}:{}", mode.as_str())
            }
            CallbackCommand::EventPage { repo, page } => format!("c:ep:{repo}:{page}"),
            CallbackCommand::ToggleEvent { repo, event, page } => {
                format!("c:te:{repo}:{}:{page}", self.short_code(event)?)
            }
            CallbackCommand::Approve { token } => format!("act:approve:{token}"),
            CallbackCommand::ClosePullRequest { token } => format!("act:close:{token}"),
        };
        (data.len() <= CALLBACK_DATA_LIMIT).then_some(data)
    }
}

fn parse_page(raw: &str) -> u32 {
    raw.parse::<u32>()
        .ok()
        .filter(|page| *page >= 1)
        .unwrap_or(1)
}

fn valid_repo(raw: &str) -> Option<String> {
    match raw.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Some(raw.to_string()),
        _ => None,
    }
}
