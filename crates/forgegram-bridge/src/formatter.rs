//! Renders typed webhook events into Telegram MarkdownV2 notifications.
//!
//! Formatting is a pure function of the event. Action buttons are described
//! symbolically; the dispatcher turns them into short-lived callback tokens.

use forgegram_github::events::{
    ForkEvent, IssueCommentEvent, IssuesEvent, PingEvent, PullRequestEvent,
    PullRequestReviewCommentEvent, PullRequestReviewEvent, PushEvent, RefEvent, ReleaseEvent,
    RepositoryEvent, StarEvent, WatchEvent,
};
use forgegram_github::{GithubCommit, GithubEvent, GithubRepository, GithubUser};
use forgegram_telegram::{escape_markdown_v2, markdown_v2_link};

/// Longest message the formatter emits before falling back to a summary.
pub const MESSAGE_SOFT_LIMIT: usize = 4000;
const BODY_EXCERPT_CHARS: usize = 800;
const PR_ACTION_BUTTON_ACTIONS: [&str; 3] = ["opened", "reopened", "ready_for_review"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationButton {
    Link { label: String, url: String },
    Approve,
    ClosePullRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub buttons: Vec<NotificationButton>,
}

impl Notification {
    fn new(text: String) -> Self {
        Self {
            text,
            buttons: Vec::new(),
        }
    }

    fn with_link(mut self, label: &str, url: &str) -> Self {
        if !url.trim().is_empty() {
            self.buttons.push(NotificationButton::Link {
                label: label.to_string(),
                url: url.to_string(),
            });
        }
        self
    }
}

pub trait NotificationFormatter: Send + Sync {
    /// `None` suppresses the notification.
    fn format(&self, event: &GithubEvent) -> Option<Notification>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl NotificationFormatter for DefaultFormatter {
    fn format(&self, event: &GithubEvent) -> Option<Notification> {
        let notification = match event {
            GithubEvent::Ping(event) => format_ping(event),
            GithubEvent::Push(event) => format_push(event)?,
            GithubEvent::PullRequest(event) => format_pull_request(event),
            GithubEvent::Issues(event) => format_issues(event),
            GithubEvent::IssueComment(event) => format_issue_comment(event),
            GithubEvent::PullRequestReview(event) => format_review(event),
            GithubEvent::PullRequestReviewComment(event) => format_review_comment(event),
            GithubEvent::Repository(event) => format_repository(event),
            GithubEvent::Star(event) => format_star(event)?,
            GithubEvent::Watch(event) => format_watch(event)?,
            GithubEvent::Fork(event) => format_fork(event),
            GithubEvent::Release(event) => format_release(event),
            GithubEvent::Create(event) => format_create(event),
            GithubEvent::Delete(event) => format_delete(event),
            GithubEvent::Other { .. } => return None,
        };
        if notification.text.trim().is_empty() {
            return None;
        }
        Some(notification)
    }
}

/// Trims trailing blanks per line, collapses runs of 3+ newlines to 2, trims the whole text.
pub fn normalize_message(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut pending_newlines = 0usize;
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            pending_newlines += 1;
        }
        let line = line.trim_end_matches([' ', '\t']);
        if line.is_empty() {
            continue;
        }
        for _ in 0..pending_newlines.min(2) {
            normalized.push('\n');
        }
        pending_newlines = 0;
        normalized.push_str(line);
    }
    normalized.trim().to_string()
}

fn format_ping(event: &PingEvent) -> Notification {
    let mut text = "🏓 *Webhook Ping Received*\n\n".to_string();
    if !event.zen.is_empty() {
        text.push_str(&format!("🧘 _{}_\n", escape_markdown_v2(&event.zen)));
    }
    if let Some(repository) = &event.repository {
        text.push_str(&format!("📦 {}\n", repo_link(repository)));
    }
    if !event.sender.login.is_empty() {
        text.push_str(&format!("👤 *By:* {}\n", user_link(&event.sender)));
    }
    Notification::new(text)
}

fn format_push(event: &PushEvent) -> Option<Notification> {
    let commits: Vec<&GithubCommit> = if event.commits.is_empty() {
        event.head_commit.iter().collect()
    } else {
        event.commits.iter().collect()
    };
    let first = commits.first()?;
    let count = commits.len();
    let repo_name = escape_markdown_v2(&event.repository.name);
    let branch = escape_markdown_v2(event.short_ref());
    let plural = if count == 1 { "" } else { "s" };

    let mut text = format!("🔨 *{count} new commit{plural} to* `{repo_name}:{branch}`\n\n");
    if event.created {
        text.push_str("🌱 _New branch created_\n");
    } else if event.deleted {
        text.push_str("🗑️ _Branch deleted_\n");
    } else if event.forced {
        text.push_str("⚠️ _Force pushed_\n");
    }
    for commit in &commits {
        let short_sha: String = commit.id.chars().take(7).collect();
        let author = match commit.author.username.as_deref().filter(|name| !name.is_empty()) {
            Some(login) => markdown_v2_link(login, &format!("https://github.com/{login}")),
            None => escape_markdown_v2(&commit.author.name),
        };
        let summary = commit.message.lines().next().unwrap_or_default();
        text.push_str(&format!(
            "\\- {}: {} by {}\n",
            markdown_v2_link(&short_sha, &commit_url(&event.repository, commit)),
            escape_markdown_v2(summary),
            author
        ));
    }
    if text.len() > MESSAGE_SOFT_LIMIT {
        text = format!(
            "🔨 *{count} new commits to* `{repo_name}:{branch}`\n\n⚠️ _Too many commits to display, check the repository for details\\._\n"
        );
    }

    let notification = Notification::new(text);
    Some(if count == 1 {
        notification.with_link("View Commit", &commit_url(&event.repository, first))
    } else {
        notification.with_link("View Commits", &event.compare)
    })
}

fn format_pull_request(event: &PullRequestEvent) -> Notification {
    let pull_request = &event.pull_request;
    let mut text = format!(
        "*🚀 PR {} \\#{}: {}*\n\n*Repository:* {}\n*By:* {} \\| *State:* {}\n",
        escape_markdown_v2(&title_case(&event.action)),
        pull_request.number,
        escape_markdown_v2(&pull_request.title),
        repo_link(&event.repository),
        user_link(&event.sender),
        escape_markdown_v2(&pull_request.state),
    );
    match event.action.as_str() {
        "opened" | "edited" => {
            if let Some(body) = non_empty(pull_request.body.as_deref()) {
                text.push_str(&format!("*Description:*\n{}\n", excerpt(body)));
            }
        }
        "closed" if pull_request.merged => text.push_str("✅ Merged\n"),
        "closed" => text.push_str("❌ Closed without merging\n"),
        "reopened" => text.push_str("🔄 Reopened\n"),
        "synchronize" => text.push_str("🔄 New commits pushed\n"),
        "ready_for_review" => text.push_str("👀 Ready for review\n"),
        _ => {}
    }

    let mut notification = Notification::new(text).with_link("View PR", &pull_request.html_url);
    if PR_ACTION_BUTTON_ACTIONS.contains(&event.action.as_str()) {
        notification.buttons.push(NotificationButton::Approve);
        notification.buttons.push(NotificationButton::ClosePullRequest);
    }
    notification
}

fn format_issues(event: &IssuesEvent) -> Notification {
    let issue = &event.issue;
    let mut text = format!(
        "*📌 {} issue \\#{}*\n*Title:* {}\n\n*Repository:* {}\n*By:* {}\n",
        escape_markdown_v2(&title_case(&event.action)),
        issue.number,
        escape_markdown_v2(&issue.title),
        repo_link(&event.repository),
        user_link(&event.sender),
    );
    match event.action.as_str() {
        "opened" | "edited" => {
            if let Some(body) = non_empty(issue.body.as_deref()) {
                text.push_str(&format!("*Description:*\n{}\n", excerpt(body)));
            }
        }
        "reopened" => text.push_str("_Issue reopened_\n"),
        _ => {}
    }
    Notification::new(text).with_link("View Issue", &issue.html_url)
}

fn format_issue_comment(event: &IssueCommentEvent) -> Notification {
    let issue = &event.issue;
    let mut text = format!(
        "{} *{} {} comment on* {}\n\n*Title:* {}\n",
        comment_emoji(&event.action),
        user_link(&event.sender),
        escape_markdown_v2(&event.action),
        markdown_v2_link(
            &format!("{}#{}", event.repository.full_name, issue.number),
            &issue.html_url
        ),
        escape_markdown_v2(&issue.title),
    );
    if matches!(event.action.as_str(), "created" | "edited") {
        text.push_str(&format!("*Comment:* {}", excerpt(&event.comment.body)));
    }
    Notification::new(text).with_link("View Comment", &event.comment.html_url)
}

fn format_review(event: &PullRequestReviewEvent) -> Notification {
    let review = &event.review;
    let pull_request = &event.pull_request;
    let emoji = match review.state.to_ascii_lowercase().as_str() {
        "approved" => "✅",
        "changes_requested" => "✏️",
        "commented" => "💬",
        "dismissed" => "❌",
        _ => "🔍",
    };
    let mut text = format!(
        "{emoji} *PR Review {}*\n\n*Repository:* {}\n*PR:* {}\n*State:* {}\n*By:* {}\n",
        escape_markdown_v2(&event.action),
        repo_link(&event.repository),
        markdown_v2_link(
            &format!("{}#{}", pull_request.title, pull_request.number),
            &pull_request.html_url
        ),
        escape_markdown_v2(&review.state),
        user_link(&event.sender),
    );
    if let Some(body) = non_empty(review.body.as_deref()) {
        text.push_str(&format!("*Review:* {}\n", excerpt(body)));
    }
    Notification::new(text).with_link("View Review", &review.html_url)
}

fn format_review_comment(event: &PullRequestReviewCommentEvent) -> Notification {
    let pull_request = &event.pull_request;
    let text = format!(
        "{} *PR Review Comment {}*\n\n*Repository:* {}\n*PR:* {}\n*By:* {}\n*Comment:* {}\n",
        comment_emoji(&event.action),
        escape_markdown_v2(&event.action),
        repo_link(&event.repository),
        markdown_v2_link(
            &format!("{}#{}", pull_request.title, pull_request.number),
            &pull_request.html_url
        ),
        user_link(&event.sender),
        excerpt(&event.comment.body),
    );
    Notification::new(text).with_link("View Comment", &event.comment.html_url)
}

fn format_repository(event: &RepositoryEvent) -> Notification {
    let (emoji, description) = match event.action.as_str() {
        "created" => ("🎉", "created".to_string()),
        "renamed" => {
            let from = event
                .previous_name()
                .map(|from| format!(" from {from}"))
                .unwrap_or_default();
            ("🔄", format!("renamed{from} to {}", event.repository.name))
        }
        "archived" => ("🔒", "archived".to_string()),
        "unarchived" => ("🔓", "unarchived".to_string()),
        "publicized" => ("🌍", "made public".to_string()),
        "privatized" => ("🔐", "made private".to_string()),
        "deleted" => ("🗑️", "deleted".to_string()),
        other => ("⚠️", format!("performed {other} action")),
    };
    let text = format!(
        "{emoji} {} {}\n\n👤 *By:* {}",
        repo_link(&event.repository),
        escape_markdown_v2(&description),
        user_link(&event.sender),
    );
    Notification::new(text).with_link("View Repository", &event.repository.html_url)
}

fn format_star(event: &StarEvent) -> Option<Notification> {
    let (emoji, verb) = match event.action.as_str() {
        "created" => ("⭐", "starred"),
        "deleted" => ("❌", "unstarred"),
        _ => return None,
    };
    Some(star_like(emoji, verb, &event.sender, &event.repository))
}

fn format_watch(event: &WatchEvent) -> Option<Notification> {
    (event.action == "started")
        .then(|| star_like("⭐", "starred", &event.sender, &event.repository))
}

fn star_like(
    emoji: &str,
    verb: &str,
    sender: &GithubUser,
    repository: &GithubRepository,
) -> Notification {
    let text = format!(
        "{emoji} {} {verb} {}\n\n✨ *Stars:* {} \\| 🍴 *Forks:* {}",
        user_link(sender),
        repo_link(repository),
        repository.stargazers_count,
        repository.forks_count,
    );
    Notification::new(text).with_link("View Repository", &repository.html_url)
}

fn format_fork(event: &ForkEvent) -> Notification {
    let text = format!(
        "🍴 {} forked by {}\n\n✨ *Stars:* {} \\| 🍴 *Forks:* {}",
        repo_link(&event.repository),
        user_link(&event.sender),
        event.repository.stargazers_count,
        event.repository.forks_count,
    );
    let fork_url = if event.forkee.html_url.is_empty() {
        format!("https://github.com/{}", event.forkee.full_name)
    } else {
        event.forkee.html_url.clone()
    };
    Notification::new(text).with_link("View Fork", &fork_url)
}

fn format_release(event: &ReleaseEvent) -> Notification {
    let release = &event.release;
    let (emoji, verb) = match event.action.as_str() {
        "created" => ("🎉", "New release".to_string()),
        "published" => ("🚀", "Release published".to_string()),
        "released" => ("🚀", "Release released".to_string()),
        "prereleased" => ("🧪", "Pre-release published".to_string()),
        "deleted" => ("🗑️", "Release deleted".to_string()),
        "edited" => ("✏️", "Release edited".to_string()),
        other => ("⚠️", format!("Unknown action ({other})")),
    };
    let mut text = format!(
        "{emoji} *{} in* {}\n\n*Tag:* {}\n*By:* {}",
        escape_markdown_v2(&verb),
        repo_link(&event.repository),
        escape_markdown_v2(&release.tag_name),
        user_link(&event.sender),
    );
    if let Some(name) = non_empty(release.name.as_deref()) {
        if name != release.tag_name {
            text.push_str(&format!("\n*Name:* {}", escape_markdown_v2(name)));
        }
    }
    Notification::new(text).with_link("View Release", &release.html_url)
}

fn format_create(event: &RefEvent) -> Notification {
    let text = format!(
        "✨ *New {} created*\n\n*Name:* `{}`\n*Repository:* {}\n*By:* {}\n",
        escape_markdown_v2(&event.ref_type),
        escape_markdown_v2(&event.git_ref),
        repo_link(&event.repository),
        user_link(&event.sender),
    );
    Notification::new(text).with_link("View Repository", &event.repository.html_url)
}

fn format_delete(event: &RefEvent) -> Notification {
    let emoji = match event.ref_type.as_str() {
        "branch" => "🌿",
        "tag" => "🏷️",
        _ => "❌",
    };
    let text = format!(
        "{emoji} *Deleted {}:* `{}`\n\n*Repository:* {}\n*By:* {}",
        escape_markdown_v2(&event.ref_type),
        escape_markdown_v2(&event.git_ref),
        repo_link(&event.repository),
        user_link(&event.sender),
    );
    Notification::new(text).with_link("View Repository", &event.repository.html_url)
}

fn comment_emoji(action: &str) -> &'static str {
    match action {
        "created" => "💬",
        "edited" => "✏️",
        "deleted" => "🗑️",
        _ => "⚠️",
    }
}

fn repo_link(repository: &GithubRepository) -> String {
    let name = if repository.full_name.is_empty() {
        repository.name.as_str()
    } else {
        repository.full_name.as_str()
    };
    if repository.html_url.is_empty() {
        return format!("*{}*", escape_markdown_v2(name));
    }
    markdown_v2_link(name, &repository.html_url)
}

fn user_link(user: &GithubUser) -> String {
    if user.login.is_empty() {
        return escape_markdown_v2("someone");
    }
    let url = if user.html_url.is_empty() {
        format!("https://github.com/{}", user.login)
    } else {
        user.html_url.clone()
    };
    markdown_v2_link(&user.login, &url)
}

fn commit_url(repository: &GithubRepository, commit: &GithubCommit) -> String {
    if !commit.url.is_empty() {
        return commit.url.clone();
    }
    format!("{}/commit/{}", repository.html_url, commit.id)
}

fn title_case(action: &str) -> String {
    let spaced = action.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= BODY_EXCERPT_CHARS {
        return escape_markdown_v2(body);
    }
    let truncated: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
    format!("{}…", escape_markdown_v2(truncated.trim_end()))
}
