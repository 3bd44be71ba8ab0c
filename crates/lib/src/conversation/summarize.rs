//! `/summarize_to_memos`: summarize a web page or YouTube video into a memo.

use crate::channels::{EventKind, InboundEvent, OutboundMessage, Outbox};
use crate::context::BotContext;
use crate::conversation::{ConversationDefinition, Family, Next, SessionState};
use crate::error::BotError;
use crate::format::truncate_chars;
use crate::llm::{prompts, str_field};
use crate::services::youtube_video_id;

pub const DEFINITION: ConversationDefinition = ConversationDefinition {
    family: Family::Summarize,
    name: "summarize_to_memos",
    entry_commands: &["summarize_to_memos"],
    entry_buttons: &[],
    failure_prefix: "처리 중 오류가 발생했습니다",
};

pub const PROMPT: &str =
    "요약할 웹 페이지 또는 유튜브 URL을 입력해주세요.\n취소하려면 /cancel 을 입력하세요.";
pub const INVALID_URL: &str = "잘못된 형식입니다. http:// 또는 https:// 로 시작하는 주소를 입력해주세요.\n취소하려면 /cancel 을 입력하세요.";
const DONE: &str = "✅ 완료되었습니다.";
const FAILED: &str = "❌ 실패하였습니다.";
/// Longest source text sent to the model.
const MAX_SOURCE_CHARS: usize = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitUrl,
}

impl State {
    pub fn accepts(&self, kind: &EventKind) -> bool {
        matches!(kind, EventKind::FreeText(_))
    }
}

/// An absolute http(s) URL, or None.
pub fn parse_http_url(text: &str) -> Option<url::Url> {
    let url = url::Url::parse(text.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

/// Model output for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoSummary {
    pub title: String,
    pub summarization: String,
    pub translated: String,
    pub tags: Vec<String>,
}

impl MemoSummary {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, BotError> {
        let title = str_field(value, "title");
        let summarization = str_field(value, "summarization");
        if title.is_empty() && summarization.is_empty() {
            return Err(BotError::Unrecoverable(
                "요약 결과가 비어 있습니다.".to_string(),
            ));
        }
        let tags: Vec<String> = match value.get("tags") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|t| t.as_str())
                .map(str::to_string)
                .collect(),
            Some(serde_json::Value::String(s)) => s.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        };
        let tags = tags
            .into_iter()
            .map(|t| t.trim().trim_start_matches('#').replace(' ', "_"))
            .filter(|t| !t.is_empty())
            .collect();
        Ok(Self {
            title,
            summarization,
            translated: str_field(value, "translated_in_korean"),
            tags,
        })
    }

    /// Memo Markdown: heading with tags, summary, translation, source link.
    pub fn render(&self, source: &str) -> String {
        let mut heading = format!("### {}", self.title);
        for tag in &self.tags {
            heading.push_str(&format!(" #{}", tag));
        }
        let mut memo = format!("{}\n{}\n", heading, self.summarization);
        if !self.translated.is_empty() {
            memo.push_str(&format!("---\n{}\n", self.translated));
        }
        memo.push_str(&format!("\n[원본 링크]({})", source));
        memo
    }
}

/// Fetch the source, summarize it and build the memo text.
pub async fn summarize_source(ctx: &BotContext, url: &str) -> Result<String, BotError> {
    let content = &ctx.services.content;
    let text = match youtube_video_id(url) {
        Some(id) => {
            ctx.retry
                .run("youtube transcript", || content.transcript(&id))
                .await?
        }
        None => ctx.retry.run("page text", || content.page_text(url)).await?,
    };
    let prompt = prompts::summary_prompt(url, truncate_chars(&text, MAX_SOURCE_CHARS));
    let llm = &ctx.services.llm;
    let value = ctx
        .retry
        .run("summary", || {
            llm.complete_json(prompts::SUMMARY_SYSTEM, &prompt, 0.0)
        })
        .await?;
    Ok(MemoSummary::from_json(&value)?.render(url))
}

async fn run(
    ctx: &BotContext,
    event: &InboundEvent,
    url: &url::Url,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    out.push(OutboundMessage::plain(
        event.chat_id,
        format!(
            "요청을 처리 중입니다: {}\n(내용에 따라 시간이 걸릴 수 있습니다...)",
            url
        ),
    ))
    .await;
    let memo = summarize_source(ctx, url.as_str()).await?;
    let notes = &ctx.services.notes;
    let reply = match ctx.retry.run("post memo", || notes.post_note(&memo)).await {
        Ok(()) => DONE,
        Err(e) => {
            log::warn!("posting memo for {} failed: {}", url, e);
            FAILED
        }
    };
    out.push(OutboundMessage::plain(event.chat_id, reply)).await;
    Ok(Next::End)
}

async fn reprompt(event: &InboundEvent, out: &mut dyn Outbox) -> Result<Next, BotError> {
    out.push(OutboundMessage::plain(event.chat_id, INVALID_URL))
        .await;
    Ok(Next::Goto(SessionState::Summarize(State::AwaitUrl)))
}

pub async fn enter(
    ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    match event.kind.args().first() {
        Some(arg) => match parse_http_url(arg) {
            Some(url) => run(ctx, event, &url, out).await,
            None => reprompt(event, out).await,
        },
        None => {
            out.push(OutboundMessage::plain(event.chat_id, PROMPT)).await;
            Ok(Next::Goto(SessionState::Summarize(State::AwaitUrl)))
        }
    }
}

pub async fn resume(
    state: State,
    ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    match (state, &event.kind) {
        (State::AwaitUrl, EventKind::FreeText(text)) => match parse_http_url(text) {
            Some(url) => run(ctx, event, &url, out).await,
            None => reprompt(event, out).await,
        },
        (_, other) => Err(BotError::Unrecoverable(format!(
            "summarize conversation cannot handle {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_absolute_http_urls() {
        assert!(parse_http_url("https://example.com/a?b=1").is_some());
        assert!(parse_http_url(" http://example.com ").is_some());
        assert!(parse_http_url("example.com").is_none());
        assert!(parse_http_url("ftp://example.com/file").is_none());
        assert!(parse_http_url("hello there").is_none());
    }

    #[test]
    fn memo_layout() {
        let summary = MemoSummary::from_json(&serde_json::json!({
            "title": "Rust 2024",
            "summarization": "- edition notes",
            "translated_in_korean": "- 에디션 노트",
            "tags": ["rust", "#release", "open source"]
        }))
        .unwrap();
        assert_eq!(
            summary.render("https://blog.rust-lang.org/x"),
            "### Rust 2024 #rust #release #open_source\n- edition notes\n---\n- 에디션 노트\n\n[원본 링크](https://blog.rust-lang.org/x)"
        );
    }

    #[test]
    fn empty_summary_is_an_error() {
        assert!(MemoSummary::from_json(&serde_json::json!({"tags": []})).is_err());
    }
}
