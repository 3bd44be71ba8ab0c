//! News digest: Hacker News top stories and configured feeds, summarized in English and Korean.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::FeedConfig;
use crate::context::BotContext;
use crate::error::BotError;
use crate::format::{bold, escape_markdown_v2, link, split_by_lines, truncate_chars, MAX_MESSAGE_CHARS};
use crate::llm::{prompts, str_field};
use crate::services::{extract_readable_text, FeedItem};

/// Feeds with publish dates only keep items from this window.
const RECENT_WINDOW_HOURS: i64 = 24;
const MAX_BODY_CHARS: usize = 20_000;
/// Stories fetched and summarized at once; output keeps the ranking order.
const STORY_CONCURRENCY: usize = 4;
const NO_CONTENT: &str = "Cannot find its content...";
const NO_UPDATE: &str = "no update today";

/// Item ids seen on the previous run, per feed name.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SeenItems(BTreeMap<String, Vec<String>>);

impl SeenItems {
    /// Missing or unreadable file means nothing was seen.
    pub async fn load(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                log::warn!("ignoring unreadable dedup file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), BotError> {
        let s = serde_json::to_string_pretty(self)
            .map_err(|e| BotError::Unrecoverable(format!("serializing dedup set: {}", e)))?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                BotError::Unrecoverable(format!("creating {}: {}", dir.display(), e))
            })?;
        }
        tokio::fs::write(path, s)
            .await
            .map_err(|e| BotError::Unrecoverable(format!("writing {}: {}", path.display(), e)))
    }

    pub fn contains(&self, feed: &str, id: &str) -> bool {
        self.0
            .get(feed)
            .is_some_and(|ids| ids.iter().any(|i| i == id))
    }

    /// Replace the seen set of `feed` with the ids of this run.
    pub fn record(&mut self, feed: &str, ids: Vec<String>) {
        self.0.insert(feed.to_string(), ids);
    }
}

/// Items of one feed that should be digested now.
pub fn select_items(
    feed: &FeedConfig,
    items: &[FeedItem],
    seen: &SeenItems,
    now: DateTime<Utc>,
) -> Vec<FeedItem> {
    let cutoff = now - ChronoDuration::hours(RECENT_WINDOW_HOURS);
    items
        .iter()
        .filter(|item| match item.published {
            Some(at) => at >= cutoff,
            None => true,
        })
        .filter(|item| !(feed.dedup && seen.contains(&feed.name, &item.id)))
        .take(feed.limit)
        .cloned()
        .collect()
}

/// English and Korean summary lines.
async fn summarize(ctx: &BotContext, title: &str, body: &str) -> Result<(String, String), BotError> {
    let prompt = prompts::news_prompt(title, truncate_chars(body, MAX_BODY_CHARS));
    let llm = &ctx.services.llm;
    let v = ctx
        .retry
        .run("news summary", || {
            llm.complete_json(prompts::NEWS_SYSTEM, &prompt, 0.2)
        })
        .await?;
    Ok((str_field(&v, "english"), str_field(&v, "korean")))
}

fn item_line(title: &str, url: &str, lines: &[&str]) -> String {
    let mut out = format!("• {}\n", link(title, url));
    for l in lines.iter().filter(|l| !l.trim().is_empty()) {
        out.push_str(&escape_markdown_v2(l.trim()));
        out.push('\n');
    }
    out.push('\n');
    out
}

async fn page_body(ctx: &BotContext, url: &str) -> Option<String> {
    let content = &ctx.services.content;
    match ctx.retry.run("news page", || content.page_text(url)).await {
        Ok(text) => Some(text),
        Err(e) => {
            log::info!("no content for {}: {}", url, e);
            None
        }
    }
}

async fn hacker_news_section(ctx: &BotContext) -> String {
    let mut out = format!("{}\n\n", bold("Hacker News"));
    let feeds = &ctx.services.feeds;
    let limit = ctx.news.hacker_news_limit;
    let stories = match ctx.retry.run("top stories", || feeds.top_stories(limit)).await {
        Ok(s) => s,
        Err(e) => {
            log::warn!("hacker news: {}", e);
            out.push_str(&escape_markdown_v2(&format!("⚠️ {}\n\n", e)));
            return out;
        }
    };
    let lines: Vec<String> = stream::iter(stories)
        .map(|story| async move {
            let url = story
                .url
                .clone()
                .unwrap_or_else(|| format!("https://news.ycombinator.com/item?id={}", story.id));
            match page_body(ctx, &url).await {
                Some(body) => match summarize(ctx, &story.title, &body).await {
                    Ok((en, ko)) => item_line(&story.title, &url, &[en.as_str(), ko.as_str()]),
                    Err(e) => {
                        log::warn!("summarizing {}: {}", url, e);
                        item_line(&story.title, &url, &[NO_CONTENT])
                    }
                },
                None => item_line(&story.title, &url, &[NO_CONTENT]),
            }
        })
        .buffered(STORY_CONCURRENCY)
        .collect()
        .await;
    out.push_str(&lines.concat());
    out
}

async fn feed_section(
    ctx: &BotContext,
    feed: &FeedConfig,
    seen: &mut SeenItems,
    now: DateTime<Utc>,
) -> String {
    let mut out = format!("{}\n\n", bold(&format!("Recent updates on {}", feed.name)));
    let feeds = &ctx.services.feeds;
    let items = match ctx.retry.run("feed", || feeds.feed(&feed.url)).await {
        Ok(items) => items,
        Err(e) => {
            log::warn!("feed {}: {}", feed.name, e);
            out.push_str(&escape_markdown_v2(&format!("⚠️ {}\n\n", e)));
            return out;
        }
    };
    let selected = select_items(feed, &items, seen, now);
    if feed.dedup {
        seen.record(&feed.name, items.iter().map(|i| i.id.clone()).collect());
    }
    if selected.is_empty() {
        out.push_str(&format!("{}\n\n", escape_markdown_v2(NO_UPDATE)));
        return out;
    }
    for item in selected {
        let body = if feed.fetch_link {
            page_body(ctx, &item.link).await
        } else {
            item.summary
                .as_deref()
                .map(extract_readable_text)
                .filter(|s| !s.is_empty())
        };
        let line = match body {
            None => item_line(&item.title, &item.link, &[NO_CONTENT]),
            Some(body) if !feed.summarize => item_line(
                &item.title,
                &item.link,
                &[truncate_chars(&body, 300)],
            ),
            Some(body) => match summarize(ctx, &item.title, &body).await {
                Ok((en, ko)) => item_line(&item.title, &item.link, &[en.as_str(), ko.as_str()]),
                Err(e) => {
                    log::warn!("summarizing {}: {}", item.link, e);
                    item_line(&item.title, &item.link, &[NO_CONTENT])
                }
            },
        };
        out.push_str(&line);
    }
    out
}

/// A built digest. Its items count as seen only after [`Digest::mark_seen`].
#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    /// MarkdownV2 chunks that each fit one message.
    pub chunks: Vec<String>,
    /// Updated dedup set, when some feed dedups.
    seen: Option<SeenItems>,
}

impl Digest {
    /// Persist the dedup set; call once the chunks are delivered.
    pub async fn mark_seen(&self, ctx: &BotContext) -> Result<(), BotError> {
        match &self.seen {
            Some(seen) => seen.save(&ctx.dedup_path).await,
            None => Ok(()),
        }
    }
}

/// Build the digest without recording its items as seen.
pub async fn build_digest(ctx: &BotContext) -> Result<Digest, BotError> {
    let now = Utc::now();
    let mut seen = SeenItems::load(&ctx.dedup_path).await;
    let mut digest = String::new();
    if ctx.news.hacker_news_limit > 0 {
        digest.push_str(&hacker_news_section(ctx).await);
    }
    for feed in &ctx.news.feeds {
        digest.push_str(&feed_section(ctx, feed, &mut seen, now).await);
    }
    let seen = ctx.news.feeds.iter().any(|f| f.dedup).then_some(seen);
    let chunks = if digest.trim().is_empty() {
        Vec::new()
    } else {
        split_by_lines(&digest, MAX_MESSAGE_CHARS)
    };
    Ok(Digest { chunks, seen })
}
