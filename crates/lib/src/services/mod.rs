//! External data services: transit, weather, geocoding, page content, notes, feeds.
//!
//! Every provider sits behind a trait so the dispatcher can be driven with fixtures.
//! HTTP implementations live in the submodules; all of them map failures into [`ServiceError`].

mod content;
mod feeds;
mod geocode;
mod memos;
mod retry;
mod subway;
mod weather;

use async_trait::async_trait;
use std::time::Duration;

pub use content::{extract_readable_text, youtube_video_id, WebContentClient};
pub use feeds::{parse_feed, FeedClient, FeedItem, Story};
pub use geocode::NominatimClient;
pub use memos::MemosClient;
pub use retry::RetryPolicy;
pub use subway::{Arrival, SeoulSubwayClient};
pub use weather::{
    AirComponents, AirIndex, AirPollution, AirSample, Condition, CurrentWeather, DailyForecast,
    FeelsLike, OneCall, OpenWeatherMapClient, Temperature, WeatherAlert,
};

/// Failure of an external call. Only `RateLimited` is retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("no matching data")]
    NotFound,
    #[error("upstream returned status {0}")]
    Upstream(u16),
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Malformed(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl ServiceError {
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            429 => ServiceError::RateLimited,
            404 => ServiceError::NotFound,
            code => ServiceError::Upstream(code),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout
        } else if let Some(status) = e.status() {
            ServiceError::from_status(status)
        } else if e.is_decode() {
            ServiceError::Malformed(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

/// Whole-request timeout of service clients unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// reqwest client whose requests fail with [`ServiceError::Timeout`] after `timeout`.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("http client builder failed, using defaults: {}", e);
            reqwest::Client::new()
        })
}

/// Pass successful responses through; turn anything else into a [`ServiceError`].
pub(crate) async fn check_status(
    what: &str,
    res: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    log::debug!("{} failed: {} {}", what, status, body);
    Err(ServiceError::from_status(status))
}

/// Real-time subway arrivals for one station.
#[async_trait]
pub trait TransitService: Send + Sync {
    async fn arrivals(&self, station: &str) -> Result<Vec<Arrival>, ServiceError>;
}

/// Weather forecast, air quality and place names by coordinates.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn forecast(&self, latitude: f64, longitude: f64) -> Result<OneCall, ServiceError>;
    async fn air_quality(&self, latitude: f64, longitude: f64)
        -> Result<AirPollution, ServiceError>;
    async fn place_name(&self, latitude: f64, longitude: f64) -> Result<String, ServiceError>;
}

/// Free-text place name to `(latitude, longitude)`.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn locate(&self, query: &str) -> Result<(f64, f64), ServiceError>;
}

/// Readable text of a web page or a YouTube transcript.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn page_text(&self, url: &str) -> Result<String, ServiceError>;
    async fn transcript(&self, video_id: &str) -> Result<String, ServiceError>;
}

/// Notes server that stores a Markdown memo.
#[async_trait]
pub trait NoteSink: Send + Sync {
    async fn post_note(&self, content: &str) -> Result<(), ServiceError>;
}

/// RSS/Atom feeds and Hacker News top stories.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn feed(&self, url: &str) -> Result<Vec<FeedItem>, ServiceError>;
    async fn top_stories(&self, limit: usize) -> Result<Vec<Story>, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ServiceError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            ServiceError::RateLimited
        );
        assert_eq!(
            ServiceError::from_status(reqwest::StatusCode::NOT_FOUND),
            ServiceError::NotFound
        );
        assert_eq!(
            ServiceError::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            ServiceError::Upstream(500)
        );
    }
}
