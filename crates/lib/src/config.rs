//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.lifebot/config.json`). Secrets can be
//! supplied through the environment instead; env always wins over the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Health/webhook HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// API keys and endpoints of the external data services.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Named places used by the fixed weather commands.
    #[serde(default)]
    pub locations: LocationsConfig,

    /// Wall-clock jobs.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Rate-limit retry policy for outbound service calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// News digest sources.
    #[serde(default)]
    pub news: NewsConfig,
}

/// Bind and port for the health + Telegram webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// Chat that receives scheduled messages. Overridden by LIFEBOT_CHAT_ID env.
    pub chat_id: Option<i64>,
    /// Chat that receives scheduled-job failure reports (default: chat_id).
    pub admin_chat_id: Option<i64>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
}

/// External service keys and base URLs. Base URLs exist mainly so tests can point at a mock server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesConfig {
    pub seoul_subway_api_key: Option<String>,
    pub seoul_subway_base_url: Option<String>,
    pub open_weather_map_api_key: Option<String>,
    pub open_weather_map_base_url: Option<String>,
    pub nominatim_base_url: Option<String>,
    pub nominatim_user_agent: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: Option<String>,
    /// Model id for generateContent (default "gemini-2.5-flash").
    pub gemini_model: Option<String>,
    /// Memos server root, e.g. "http://192.168.0.42:5230".
    pub memos_base_url: Option<String>,
    pub memos_token: Option<String>,
}

/// A latitude/longitude pair as `[lat, lon]`.
pub type Coordinates = [f64; 2];

/// Named locations for `/weather_home`, `/weather_office`, `/weather_parent_home`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationsConfig {
    pub home: Option<Coordinates>,
    pub office: Option<Coordinates>,
    pub parent_home: Option<Coordinates>,
}

/// Timezone and per-job schedule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    /// IANA timezone name for every job (default "Asia/Seoul").
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_morning_weather")]
    pub morning_weather: JobSchedule,

    #[serde(default = "default_guri_check")]
    pub guri_check: JobSchedule,

    #[serde(default = "default_news_digest")]
    pub news_digest: JobSchedule,
}

/// One job's time of day ("HH:MM" or "HH:MM:SS") and weekdays ("mon".."sun"; empty = every day).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSchedule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub time: String,
    #[serde(default)]
    pub days: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "Asia/Seoul".to_string()
}

fn default_morning_weather() -> JobSchedule {
    JobSchedule {
        enabled: true,
        time: "05:30".to_string(),
        days: Vec::new(),
    }
}

fn default_guri_check() -> JobSchedule {
    JobSchedule {
        enabled: true,
        time: "08:00".to_string(),
        days: ["mon", "tue", "wed", "thu", "fri"]
            .iter()
            .map(|d| d.to_string())
            .collect(),
    }
}

fn default_news_digest() -> JobSchedule {
    JobSchedule {
        enabled: false,
        time: "07:00".to_string(),
        days: Vec::new(),
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            morning_weather: default_morning_weather(),
            guri_check: default_guri_check(),
            news_digest: default_news_digest(),
        }
    }
}

/// Fixed-delay retry on rate limiting, and the timeout of each service request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Retries after the first attempt (default 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds between attempts (default 60).
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
    /// Whole-request timeout in seconds for every service client (default 60).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_delay_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_secs: default_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// News digest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsConfig {
    /// Number of Hacker News top stories (0 disables Hacker News).
    #[serde(default = "default_hacker_news_limit")]
    pub hacker_news_limit: usize,
    /// RSS/Atom feeds to digest.
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    /// Where the cross-run dedup set is stored (default: `news_seen.json` next to the config file).
    pub dedup_path: Option<PathBuf>,
}

fn default_hacker_news_limit() -> usize {
    10
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            hacker_news_limit: default_hacker_news_limit(),
            feeds: Vec::new(),
            dedup_path: None,
        }
    }
}

/// One feed of the digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    /// Summarize each item with the LLM (off for feeds already in Korean).
    #[serde(default = "default_true")]
    pub summarize: bool,
    /// Fetch the linked page instead of using the feed's description.
    #[serde(default)]
    pub fetch_link: bool,
    /// Skip item ids seen on the previous run (for feeds without publish dates).
    #[serde(default)]
    pub dedup: bool,
    /// Maximum items taken from this feed.
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
}

fn default_feed_limit() -> usize {
    3
}

/// Read an env var, treating empty/whitespace values as absent.
fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve a secret: env `key` overrides the config value.
pub fn resolve_secret(key: &str, configured: Option<&String>) -> Option<String> {
    env_non_empty(key).or_else(|| {
        configured
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    resolve_secret(
        "TELEGRAM_BOT_TOKEN",
        config.channels.telegram.bot_token.as_ref(),
    )
}

/// Resolve the chat that receives scheduled messages: env LIFEBOT_CHAT_ID overrides config.
pub fn resolve_chat_id(config: &Config) -> Option<i64> {
    env_non_empty("LIFEBOT_CHAT_ID")
        .and_then(|s| s.parse().ok())
        .or(config.channels.telegram.chat_id)
}

/// Admin chat for job failure reports; falls back to the main chat.
pub fn resolve_admin_chat_id(config: &Config) -> Option<i64> {
    config
        .channels
        .telegram
        .admin_chat_id
        .or_else(|| resolve_chat_id(config))
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("LIFEBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".lifebot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Resolve the news dedup file: configured path, else `news_seen.json` beside the config file.
pub fn resolve_dedup_path(config: &Config, config_path: &std::path::Path) -> PathBuf {
    match &config.news.dedup_path {
        Some(p) if !p.as_os_str().is_empty() => p.clone(),
        _ => config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."))
            .join("news_seen.json"),
    }
}

/// Load config from the given path or the default (LIFEBOT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
