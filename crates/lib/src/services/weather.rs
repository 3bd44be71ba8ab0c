//! OpenWeatherMap: one-call forecast, air pollution and reverse geocoding.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::services::{
    check_status, http_client, ServiceError, WeatherProvider, DEFAULT_REQUEST_TIMEOUT,
};

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Clone, Deserialize)]
pub struct OneCall {
    pub current: CurrentWeather,
    #[serde(default)]
    pub daily: Vec<DailyForecast>,
    #[serde(default)]
    pub alerts: Vec<WeatherAlert>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeather {
    pub feels_like: f64,
    /// Metres.
    #[serde(default)]
    pub visibility: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Temperature {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeelsLike {
    pub day: f64,
    pub eve: f64,
    pub night: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyForecast {
    #[serde(default)]
    pub summary: Option<String>,
    pub temp: Temperature,
    pub feels_like: FeelsLike,
    pub humidity: f64,
    pub wind_speed: f64,
    #[serde(default)]
    pub wind_gust: Option<f64>,
    /// Millimetres; absent when there is none.
    #[serde(default)]
    pub rain: f64,
    #[serde(default)]
    pub snow: f64,
    /// Probability of precipitation, 0..1.
    #[serde(default)]
    pub pop: f64,
    #[serde(default)]
    pub uvi: f64,
    #[serde(default)]
    pub weather: Vec<Condition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherAlert {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AirPollution {
    #[serde(default)]
    pub list: Vec<AirSample>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AirIndex {
    /// 1 (good) ..= 5 (very poor).
    pub aqi: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AirSample {
    pub main: AirIndex,
    pub components: AirComponents,
}

/// Concentrations in μg/m³.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AirComponents {
    #[serde(default)]
    pub co: f64,
    #[serde(default)]
    pub no: f64,
    #[serde(default)]
    pub no2: f64,
    #[serde(default)]
    pub o3: f64,
    #[serde(default)]
    pub so2: f64,
    #[serde(default)]
    pub pm2_5: f64,
    #[serde(default)]
    pub pm10: f64,
    #[serde(default)]
    pub nh3: f64,
}

#[derive(Debug, Deserialize)]
struct ReversePlace {
    name: String,
    #[serde(default)]
    local_names: HashMap<String, String>,
}

#[derive(Clone)]
pub struct OpenWeatherMapClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenWeatherMapClient {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key,
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Replace the whole-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    fn key(&self) -> Result<&str, ServiceError> {
        self.api_key
            .as_deref()
            .ok_or(ServiceError::NotConfigured("openweathermap api key"))
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        what: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .get(&url)
            .query(query)
            .query(&[("appid", self.key()?)])
            .send()
            .await?;
        let res = check_status(what, res).await?;
        Ok(res.json().await?)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMapClient {
    async fn forecast(&self, latitude: f64, longitude: f64) -> Result<OneCall, ServiceError> {
        self.get(
            "onecall",
            "/data/3.0/onecall",
            &[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("units", "metric".to_string()),
                ("lang", "kr".to_string()),
                ("exclude", "minutely,hourly".to_string()),
            ],
        )
        .await
    }

    async fn air_quality(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<AirPollution, ServiceError> {
        let data: AirPollution = self
            .get(
                "air_pollution",
                "/data/2.5/air_pollution",
                &[("lat", latitude.to_string()), ("lon", longitude.to_string())],
            )
            .await?;
        if data.list.is_empty() {
            return Err(ServiceError::Malformed(
                "air pollution response without samples".to_string(),
            ));
        }
        Ok(data)
    }

    async fn place_name(&self, latitude: f64, longitude: f64) -> Result<String, ServiceError> {
        let places: Vec<ReversePlace> = self
            .get(
                "reverse geocoding",
                "/geo/1.0/reverse",
                &[
                    ("lat", latitude.to_string()),
                    ("lon", longitude.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        let place = places.into_iter().next().ok_or(ServiceError::NotFound)?;
        Ok(place
            .local_names
            .get("ko")
            .cloned()
            .unwrap_or(place.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_forecast_defaults_missing_precipitation() {
        let day: DailyForecast = serde_json::from_str(
            r#"{
                "temp": {"min": 3.1, "max": 12.4},
                "feels_like": {"day": 10.0, "eve": 8.0, "night": 2.5},
                "humidity": 40, "wind_speed": 3.2, "pop": 0.1, "uvi": 4.5,
                "weather": [{"description": "맑음"}]
            }"#,
        )
        .unwrap();
        assert_eq!(day.rain, 0.0);
        assert_eq!(day.snow, 0.0);
        assert_eq!(day.wind_gust, None);
        assert_eq!(day.weather[0].description, "맑음");
    }
}
