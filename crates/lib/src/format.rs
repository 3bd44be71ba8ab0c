//! Telegram MarkdownV2 helpers and message splitting.

/// Telegram's maximum message length.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

/// Escape text for MarkdownV2 outside of entities.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape the URL part of an inline link, where only `)` and `\` are special.
pub fn escape_link_url(url: &str) -> String {
    url.replace('\\', "\\\\").replace(')', "\\)")
}

pub fn bold(text: &str) -> String {
    format!("*{}*", escape_markdown_v2(text))
}

pub fn italic(text: &str) -> String {
    format!("_{}_", escape_markdown_v2(text))
}

pub fn link(label: &str, url: &str) -> String {
    format!("[{}]({})", escape_markdown_v2(label), escape_link_url(url))
}

/// Wrap already-escaped MarkdownV2 in a spoiler.
pub fn spoiler(markdown: &str) -> String {
    format!("||{}||", markdown)
}

/// Split `text` into chunks of at most `max` chars on line boundaries.
/// A line longer than `max` becomes its own chunk and is cut at `max` chars.
pub fn split_by_lines(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for line in text.split_inclusive('\n') {
        let len = line.chars().count();
        if current_len + len <= max {
            current.push_str(line);
            current_len += len;
            continue;
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if len <= max {
            current.push_str(line);
            current_len = len;
        } else {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max) {
                chunks.push(piece.iter().collect());
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// At most `max` chars of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
