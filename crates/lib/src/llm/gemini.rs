//! Gemini generateContent client (https://generativelanguage.googleapis.com by default).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::llm::{parse_json_lenient, LlmBackend};
use crate::services::{check_status, http_client, ServiceError, DEFAULT_REQUEST_TIMEOUT};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Client for the Gemini HTTP API.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, base_url: Option<String>, model: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Replace the whole-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// POST /v1beta/models/{model}:generateContent and return the text of the first candidate.
    pub async fn generate(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, ServiceError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(ServiceError::NotConfigured("gemini api key"))?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: system }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature,
                response_mime_type: "application/json",
            },
        };
        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;
        let res = check_status("gemini generateContent", res).await?;
        let data: GenerateResponse = res.json().await?;
        data.text()
            .ok_or_else(|| ServiceError::Malformed("gemini returned no candidates".to_string()))
    }
}

#[async_trait]
impl LlmBackend for GeminiClient {
    async fn complete_json(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<serde_json::Value, ServiceError> {
        let text = self.generate(system, prompt, temperature).await?;
        parse_json_lenient(&text)
    }
}
