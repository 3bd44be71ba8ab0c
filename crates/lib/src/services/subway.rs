//! Seoul real-time subway arrival API (swopenAPI.seoul.go.kr).

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::services::{
    check_status, http_client, ServiceError, TransitService, DEFAULT_REQUEST_TIMEOUT,
};

const DEFAULT_BASE_URL: &str = "http://swopenAPI.seoul.go.kr";
/// API code for "no data for this station".
const NO_DATA_CODE: &str = "INFO-200";

/// One train approaching a station.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Arrival {
    /// Line id, e.g. "1002" for line 2.
    #[serde(rename = "subwayId")]
    pub subway_id: String,
    /// "상행"/"하행" or "내선"/"외선".
    #[serde(rename = "updnLine", default)]
    pub direction: String,
    /// e.g. "성수행 - 잠실방면".
    #[serde(rename = "trainLineNm", default)]
    pub train_line: String,
    /// Train type: "급행", "ITX", "일반", "특급".
    #[serde(rename = "btrainSttus", default)]
    pub train_kind: Option<String>,
    /// First arrival message, e.g. "전역 도착".
    #[serde(rename = "arvlMsg2", default)]
    pub message: String,
    /// Current station of the train.
    #[serde(rename = "arvlMsg3", default)]
    pub position: String,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArrivalResponse {
    #[serde(rename = "errorMessage", default)]
    error_message: Option<ApiStatus>,
    #[serde(rename = "realtimeArrivalList", default)]
    arrivals: Vec<Arrival>,
    /// When there is no data the status fields come at the top level.
    #[serde(flatten)]
    top_level: ApiStatus,
}

impl ArrivalResponse {
    fn into_arrivals(self) -> Result<Vec<Arrival>, ServiceError> {
        let status = self.error_message.unwrap_or(self.top_level);
        if status.code.as_deref() == Some(NO_DATA_CODE) {
            return Err(ServiceError::NotFound);
        }
        match status.status {
            Some(200) => Ok(self.arrivals),
            Some(code) => {
                log::debug!(
                    "subway api error {}: {}",
                    code,
                    status.message.unwrap_or_default()
                );
                Err(ServiceError::Upstream(code))
            }
            None => Err(ServiceError::Malformed(
                "subway response without status".to_string(),
            )),
        }
    }
}

#[derive(Clone)]
pub struct SeoulSubwayClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl SeoulSubwayClient {
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

    fn arrivals_url(&self, key: &str, station: &str) -> Result<url::Url, ServiceError> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| ServiceError::Transport(format!("invalid subway base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Transport("subway base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend([
                "api",
                "subway",
                key,
                "json",
                "realtimeStationArrival",
                "0",
                "99",
                station,
            ]);
        Ok(url)
    }
}

#[async_trait]
impl TransitService for SeoulSubwayClient {
    async fn arrivals(&self, station: &str) -> Result<Vec<Arrival>, ServiceError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(ServiceError::NotConfigured("seoul subway api key"))?;
        let url = self.arrivals_url(key, station)?;
        let res = self.client.get(url).send().await?;
        let res = check_status("realtimeStationArrival", res).await?;
        let data: ArrivalResponse = res.json().await?;
        data.into_arrivals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_code_is_not_found() {
        let data: ArrivalResponse = serde_json::from_str(
            r#"{"status":500,"code":"INFO-200","message":"해당하는 데이터가 없습니다.","total":0}"#,
        )
        .unwrap();
        assert_eq!(data.into_arrivals(), Err(ServiceError::NotFound));
    }

    #[test]
    fn arrivals_parse() {
        let data: ArrivalResponse = serde_json::from_str(
            r#"{
                "errorMessage": {"status":200,"code":"INFO-000","message":"정상 처리되었습니다."},
                "realtimeArrivalList": [
                    {"subwayId":"1002","updnLine":"내선","trainLineNm":"성수행 - 역삼방면",
                     "btrainSttus":null,"arvlMsg2":"전역 도착","arvlMsg3":"교대"}
                ]
            }"#,
        )
        .unwrap();
        let arrivals = data.into_arrivals().unwrap();
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].subway_id, "1002");
        assert_eq!(arrivals[0].train_kind, None);
        assert_eq!(arrivals[0].position, "교대");
    }

    #[test]
    fn station_is_percent_encoded_in_path() {
        let client = SeoulSubwayClient::new(Some("KEY".to_string()), Some("http://x/".to_string()));
        let url = client.arrivals_url("KEY", "강남").unwrap();
        assert!(url
            .as_str()
            .starts_with("http://x/api/subway/KEY/json/realtimeStationArrival/0/99/%EA%B0%95"));
    }
}
