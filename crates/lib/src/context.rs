//! Everything a handler needs: service handles and settings. Built once at startup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, Config, LocationsConfig, NewsConfig};
use crate::llm::{GeminiClient, LlmBackend};
use crate::services::{
    ContentFetcher, FeedClient, FeedSource, Geocoder, MemosClient, NominatimClient, NoteSink,
    OpenWeatherMapClient, RetryPolicy, SeoulSubwayClient, TransitService, WeatherProvider,
    WebContentClient,
};

#[derive(Clone)]
pub struct Services {
    pub transit: Arc<dyn TransitService>,
    pub weather: Arc<dyn WeatherProvider>,
    pub geocoder: Arc<dyn Geocoder>,
    pub llm: Arc<dyn LlmBackend>,
    pub content: Arc<dyn ContentFetcher>,
    pub notes: Arc<dyn NoteSink>,
    pub feeds: Arc<dyn FeedSource>,
}

impl Services {
    /// HTTP clients for every service, keys resolved env first.
    pub fn from_config(config: &Config) -> Self {
        let s = &config.services;
        let timeout = Duration::from_secs(config.retry.request_timeout_secs);
        let transit = SeoulSubwayClient::new(
            config::resolve_secret("SEOUL_SUBWAY_API_KEY", s.seoul_subway_api_key.as_ref()),
            s.seoul_subway_base_url.clone(),
        );
        let weather = OpenWeatherMapClient::new(
            config::resolve_secret("OPENWEATHERMAP_API_KEY", s.open_weather_map_api_key.as_ref()),
            s.open_weather_map_base_url.clone(),
        );
        let geocoder =
            NominatimClient::new(s.nominatim_base_url.clone(), s.nominatim_user_agent.clone());
        let llm = GeminiClient::new(
            config::resolve_secret("GEMINI_API_KEY", s.gemini_api_key.as_ref()),
            s.gemini_base_url.clone(),
            s.gemini_model.clone(),
        );
        let notes = MemosClient::new(
            s.memos_base_url.clone(),
            config::resolve_secret("MEMOS_TOKEN", s.memos_token.as_ref()),
        );
        Self {
            transit: Arc::new(transit.with_timeout(timeout)),
            weather: Arc::new(weather.with_timeout(timeout)),
            geocoder: Arc::new(geocoder.with_timeout(timeout)),
            llm: Arc::new(llm.with_timeout(timeout)),
            content: Arc::new(WebContentClient::new()),
            notes: Arc::new(notes.with_timeout(timeout)),
            feeds: Arc::new(FeedClient::default().with_timeout(timeout)),
        }
    }
}

/// Shared by all handlers; no handler reaches for globals.
#[derive(Clone)]
pub struct BotContext {
    pub services: Services,
    pub retry: RetryPolicy,
    pub locations: LocationsConfig,
    /// Chat receiving scheduled messages.
    pub chat_id: Option<i64>,
    /// Chat receiving job failure reports.
    pub admin_chat_id: Option<i64>,
    pub news: NewsConfig,
    pub dedup_path: PathBuf,
}

impl BotContext {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            retry: RetryPolicy::default(),
            locations: LocationsConfig::default(),
            chat_id: None,
            admin_chat_id: None,
            news: NewsConfig::default(),
            dedup_path: PathBuf::from("news_seen.json"),
        }
    }

    pub fn from_config(config: &Config, config_path: &std::path::Path) -> Self {
        Self {
            services: Services::from_config(config),
            retry: RetryPolicy::from_config(&config.retry),
            locations: config.locations.clone(),
            chat_id: config::resolve_chat_id(config),
            admin_chat_id: config::resolve_admin_chat_id(config),
            news: config.news.clone(),
            dedup_path: config::resolve_dedup_path(config, config_path),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_locations(mut self, locations: LocationsConfig) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_chats(mut self, chat_id: Option<i64>, admin_chat_id: Option<i64>) -> Self {
        self.chat_id = chat_id;
        self.admin_chat_id = admin_chat_id;
        self
    }

    pub fn with_news(mut self, news: NewsConfig, dedup_path: PathBuf) -> Self {
        self.news = news;
        self.dedup_path = dedup_path;
        self
    }
}
