const MARKDOWN_V2_RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    '\\',
];

/// Escapes free text for Telegram MarkdownV2.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if MARKDOWN_V2_RESERVED.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Escapes the URL part of an inline link, where only `)` and `\` are special.
pub fn escape_markdown_v2_url(url: &str) -> String {
    let mut escaped = String::with_capacity(url.len());
    for ch in url.chars() {
        if ch == ')' || ch == '\\' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Inline link with both label and target escaped.
pub fn markdown_v2_link(label: &str, url: &str) -> String {
    format!(
        "[{}]({})",
        escape_markdown_v2(label),
        escape_markdown_v2_url(url)
    )
}
