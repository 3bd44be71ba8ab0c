//! Web page text extraction and YouTube transcripts.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

use crate::services::{check_status, ContentFetcher, ServiceError};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const YOUTUBE_WATCH_URL: &str = "https://www.youtube.com/watch";
/// Transcript languages in order of preference.
const TRANSCRIPT_LANGUAGES: [&str; 2] = ["ko", "en"];
/// Shorter extracted text means the page needs a script to render.
const MIN_PAGE_TEXT: usize = 50;

fn video_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:v=|/)([0-9A-Za-z_-]{11})").expect("valid video id regex"))
}

/// The 11-character video id of a YouTube URL, if `url` points at YouTube.
pub fn youtube_video_id(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    if host != "youtube.com" && host != "youtu.be" && host != "music.youtube.com" {
        return None;
    }
    video_id_re()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Strip markup from an HTML document, keeping one line per block element.
pub fn extract_readable_text(html: &str) -> String {
    static INVISIBLE: OnceLock<Regex> = OnceLock::new();
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    let invisible = INVISIBLE.get_or_init(|| {
        Regex::new(
            r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<svg\b.*?</svg\s*>|<head\b.*?</head\s*>|<nav\b.*?</nav\s*>|<footer\b.*?</footer\s*>",
        )
        .expect("valid invisible regex")
    });
    let block = BLOCK.get_or_init(|| {
        Regex::new(r"(?i)</?(p|div|br|li|ul|ol|h[1-6]|tr|table|article|section|blockquote|pre)\b[^>]*>")
            .expect("valid block regex")
    });
    let tag = TAG.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

    let text = invisible.replace_all(html, " ");
    let text = block.replace_all(&text, "\n");
    let text = tag.replace_all(&text, "");
    let text = decode_entities(&text);
    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode the HTML entities that survive in page text and transcripts.
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Find the JSON array that follows `key` in `source`, matching brackets outside strings.
fn json_array_after<'a>(source: &'a str, key: &str) -> Option<&'a str> {
    let start = source.find(key)? + key.len();
    let open = start + source[start..].find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in source.as_bytes()[open..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&source[open..=open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language: String,
    /// "asr" for generated captions.
    #[serde(default)]
    kind: Option<String>,
}

impl CaptionTrack {
    fn generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

/// Manual tracks before generated ones, each in language preference order.
fn pick_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    [false, true].into_iter().find_map(|generated| {
        TRANSCRIPT_LANGUAGES.iter().find_map(|lang| {
            tracks.iter().find(|t| {
                t.generated() == generated
                    && (t.language == *lang || t.language.starts_with(&format!("{}-", lang)))
            })
        })
    })
}

#[derive(Debug, Deserialize)]
struct TimedText {
    #[serde(rename = "text", default)]
    lines: Vec<TimedTextLine>,
}

#[derive(Debug, Deserialize)]
struct TimedTextLine {
    #[serde(rename = "$text", default)]
    text: String,
}

fn parse_timed_text(xml: &str) -> Result<String, ServiceError> {
    let data: TimedText = quick_xml::de::from_str(xml)
        .map_err(|e| ServiceError::Malformed(format!("transcript xml: {}", e)))?;
    let text = data
        .lines
        .iter()
        .map(|l| decode_entities(l.text.trim()))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return Err(ServiceError::NotFound);
    }
    Ok(text)
}

#[derive(Clone)]
pub struct WebContentClient {
    client: reqwest::Client,
    youtube_watch_url: String,
}

impl Default for WebContentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WebContentClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("content client builder failed, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            youtube_watch_url: YOUTUBE_WATCH_URL.to_string(),
        }
    }

    /// Point transcript lookups at another host (tests).
    pub fn with_youtube_watch_url(mut self, url: impl Into<String>) -> Self {
        self.youtube_watch_url = url.into();
        self
    }

    async fn get_text(&self, what: &str, url: &str) -> Result<String, ServiceError> {
        let res = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "ko,en;q=0.8")
            .send()
            .await?;
        let res = check_status(what, res).await?;
        Ok(res.text().await?)
    }
}

#[async_trait]
impl ContentFetcher for WebContentClient {
    async fn page_text(&self, url: &str) -> Result<String, ServiceError> {
        let html = self.get_text("fetch page", url).await?;
        let text = extract_readable_text(&html);
        if text.chars().count() < MIN_PAGE_TEXT {
            return Err(ServiceError::Malformed(format!(
                "page has no readable text ({} chars)",
                text.chars().count()
            )));
        }
        Ok(text)
    }

    async fn transcript(&self, video_id: &str) -> Result<String, ServiceError> {
        let watch = format!("{}?v={}", self.youtube_watch_url, video_id);
        let page = self.get_text("youtube watch page", &watch).await?;
        let tracks_json =
            json_array_after(&page, "\"captionTracks\":").ok_or(ServiceError::NotFound)?;
        let tracks: Vec<CaptionTrack> = serde_json::from_str(tracks_json)
            .map_err(|e| ServiceError::Malformed(format!("caption tracks: {}", e)))?;
        let track = pick_track(&tracks).ok_or(ServiceError::NotFound)?;
        log::debug!(
            "transcript {}: {} track ({})",
            video_id,
            track.language,
            if track.generated() { "generated" } else { "manual" }
        );
        let xml = self.get_text("timedtext", &track.base_url).await?;
        parse_timed_text(&xml)
    }
}
