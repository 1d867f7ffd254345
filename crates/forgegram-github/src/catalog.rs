/// A webhook event kind users can toggle from chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedEvent {
    /// Event name as GitHub spells it in hook configuration and `X-GitHub-Event`.
    pub name: &'static str,
    /// Button label shown in the settings keyboard.
    pub label: &'static str,
    /// Compact alias used inside callback payloads.
    pub short: &'static str,
}

/// Events offered in the per-repository settings menu, in display order.
pub const SUPPORTED_EVENTS: [SupportedEvent; 10] = [
    SupportedEvent {
        name: "push",
        label: "Code",
        short: "p",
    },
    SupportedEvent {
        name: "issues",
        label: "Issues",
        short: "i",
    },
    SupportedEvent {
        name: "pull_request",
        label: "Pull requests",
        short: "pr",
    },
    SupportedEvent {
        name: "gollum",
        label: "Wikis",
        short: "g",
    },
    SupportedEvent {
        name: "repository",
        label: "Settings",
        short: "rep",
    },
    SupportedEvent {
        name: "meta",
        label: "Webhooks and services",
        short: "mt",
    },
    SupportedEvent {
        name: "deploy_key",
        label: "Deploy keys",
        short: "dk",
    },
    SupportedEvent {
        name: "member",
        label: "Collaboration invites",
        short: "m",
    },
    SupportedEvent {
        name: "fork",
        label: "Forks",
        short: "f",
    },
    SupportedEvent {
        name: "star",
        label: "Stars",
        short: "s",
    },
];

/// Event names a newly created webhook subscribes to.
pub fn default_hook_events() -> Vec<String> {
    SUPPORTED_EVENTS
        .iter()
        .map(|event| event.name.to_string())
        .collect()
}
