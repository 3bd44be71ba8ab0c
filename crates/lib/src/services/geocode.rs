//! Nominatim forward geocoding.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::services::{check_status, http_client, Geocoder, ServiceError, DEFAULT_REQUEST_TIMEOUT};

const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_USER_AGENT: &str = "lifebot";

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

#[derive(Clone)]
pub struct NominatimClient {
    base_url: String,
    user_agent: String,
    client: reqwest::Client,
}

impl NominatimClient {
    pub fn new(base_url: Option<String>, user_agent: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            user_agent: user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Replace the whole-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn locate(&self, query: &str) -> Result<(f64, f64), ServiceError> {
        let url = format!("{}/search", self.base_url);
        let res = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await?;
        let res = check_status("nominatim search", res).await?;
        let places: Vec<Place> = res.json().await?;
        let place = places.into_iter().next().ok_or(ServiceError::NotFound)?;
        let lat = place
            .lat
            .parse()
            .map_err(|_| ServiceError::Malformed(format!("latitude {:?}", place.lat)))?;
        let lon = place
            .lon
            .parse()
            .map_err(|_| ServiceError::Malformed(format!("longitude {:?}", place.lon)))?;
        Ok((lat, lon))
    }
}
