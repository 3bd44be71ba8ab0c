//! RSS 2.0 / Atom feeds and Hacker News top stories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::services::{check_status, http_client, FeedSource, ServiceError, DEFAULT_REQUEST_TIMEOUT};

const HACKER_NEWS_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";

/// One entry of a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    /// guid/id, else the link.
    pub id: String,
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// A Hacker News story.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Story {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    /// Absent for Ask HN and similar text posts.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    guid: Option<TextNode>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(default)]
    summary: Option<TextNode>,
    #[serde(default)]
    content: Option<TextNode>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

/// Element whose attributes we ignore (`<title type="html">`, `<guid isPermaLink="false">`).
#[derive(Debug, Default, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl From<RssItem> for FeedItem {
    fn from(item: RssItem) -> Self {
        let link = item.link.trim().to_string();
        let id = non_empty(item.guid.map(|g| g.value)).unwrap_or_else(|| link.clone());
        FeedItem {
            id,
            title: item.title.trim().to_string(),
            link,
            summary: non_empty(item.description),
            published: item
                .pub_date
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
                .map(|d| d.with_timezone(&Utc)),
        }
    }
}

impl From<AtomEntry> for FeedItem {
    fn from(entry: AtomEntry) -> Self {
        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref().unwrap_or("alternate") == "alternate")
            .or_else(|| entry.links.first())
            .map(|l| l.href.trim().to_string())
            .unwrap_or_default();
        FeedItem {
            id: non_empty(entry.id).unwrap_or_else(|| link.clone()),
            title: entry.title.map(|t| t.value.trim().to_string()).unwrap_or_default(),
            link,
            summary: non_empty(entry.summary.map(|s| s.value))
                .or_else(|| non_empty(entry.content.map(|c| c.value))),
            published: entry
                .published
                .or(entry.updated)
                .and_then(|d| DateTime::parse_from_rfc3339(d.trim()).ok())
                .map(|d| d.with_timezone(&Utc)),
        }
    }
}

/// Parse an RSS 2.0 or Atom document.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, ServiceError> {
    let is_atom = xml.contains("<feed") && xml.contains("http://www.w3.org/2005/Atom");
    let items = if is_atom {
        let feed: AtomFeed = quick_xml::de::from_str(xml)
            .map_err(|e| ServiceError::Malformed(format!("atom feed: {}", e)))?;
        feed.entries.into_iter().map(FeedItem::from).collect()
    } else {
        let rss: Rss = quick_xml::de::from_str(xml)
            .map_err(|e| ServiceError::Malformed(format!("rss feed: {}", e)))?;
        rss.channel.items.into_iter().map(FeedItem::from).collect()
    };
    Ok(items)
}

#[derive(Clone)]
pub struct FeedClient {
    hacker_news_base: String,
    client: reqwest::Client,
}

impl Default for FeedClient {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FeedClient {
    pub fn new(hacker_news_base: Option<String>) -> Self {
        let hacker_news_base = hacker_news_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| HACKER_NEWS_BASE_URL.to_string());
        Self {
            hacker_news_base,
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Replace the whole-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    async fn story(&self, id: u64) -> Result<Story, ServiceError> {
        let url = format!("{}/item/{}.json", self.hacker_news_base, id);
        let res = self.client.get(&url).send().await?;
        let res = check_status("hacker news item", res).await?;
        Ok(res.json().await?)
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn feed(&self, url: &str) -> Result<Vec<FeedItem>, ServiceError> {
        let res = self.client.get(url).send().await?;
        let res = check_status("fetch feed", res).await?;
        let body = res.text().await?;
        parse_feed(&body)
    }

    async fn top_stories(&self, limit: usize) -> Result<Vec<Story>, ServiceError> {
        let url = format!("{}/topstories.json", self.hacker_news_base);
        let res = self.client.get(&url).send().await?;
        let res = check_status("hacker news top stories", res).await?;
        let ids: Vec<u64> = res.json().await?;
        let mut stories = Vec::with_capacity(limit);
        for id in ids.into_iter().take(limit) {
            match self.story(id).await {
                Ok(story) => stories.push(story),
                Err(e) => log::warn!("hacker news item {}: {}", id, e),
            }
        }
        Ok(stories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_items() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>GeekNews</title>
<item><title>First</title><link>https://news.hada.io/topic?id=1</link>
<guid isPermaLink="false">topic-1</guid><description><![CDATA[<p>Hello</p>]]></description>
<pubDate>Tue, 14 Oct 2025 06:00:00 +0900</pubDate></item>
<item><title>Second</title><link>https://news.hada.io/topic?id=2</link></item>
</channel></rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "topic-1");
        assert_eq!(items[0].summary.as_deref(), Some("<p>Hello</p>"));
        assert_eq!(
            items[0].published.unwrap().to_rfc3339(),
            "2025-10-13T21:00:00+00:00"
        );
        assert_eq!(items[1].id, "https://news.hada.io/topic?id=2");
        assert_eq!(items[1].published, None);
    }

    #[test]
    fn atom_entries() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>Blog</title>
<entry><id>tag:blog,2025:1</id><title type="html">Post &amp; more</title>
<link rel="alternate" href="https://blog.example/1"/><link rel="replies" href="https://blog.example/1#c"/>
<updated>2025-10-14T00:00:00Z</updated><summary>Short</summary></entry>
</feed>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Post & more");
        assert_eq!(items[0].link, "https://blog.example/1");
        assert_eq!(items[0].id, "tag:blog,2025:1");
        assert_eq!(items[0].summary.as_deref(), Some("Short"));
        assert!(items[0].published.is_some());
    }
}
