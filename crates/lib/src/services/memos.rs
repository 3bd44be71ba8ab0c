//! Memos notes server: create a memo from Markdown.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::services::{check_status, http_client, NoteSink, ServiceError, DEFAULT_REQUEST_TIMEOUT};

#[derive(Debug, Serialize)]
struct CreateMemo<'a> {
    name: &'a str,
    state: &'a str,
    content: &'a str,
    visibility: &'a str,
    pinned: bool,
}

/// Memos answers some failures with 200 and a `code` field.
#[derive(Debug, Deserialize)]
struct CreateMemoResponse {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Clone)]
pub struct MemosClient {
    base_url: Option<String>,
    token: Option<String>,
    client: reqwest::Client,
}

impl MemosClient {
    pub fn new(base_url: Option<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            token,
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
impl NoteSink for MemosClient {
    async fn post_note(&self, content: &str) -> Result<(), ServiceError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(ServiceError::NotConfigured("memos base url"))?;
        let token = self
            .token
            .as_deref()
            .ok_or(ServiceError::NotConfigured("memos token"))?;
        let url = format!("{}/api/v1/memos", base);
        let body = CreateMemo {
            name: "",
            state: "NORMAL",
            content,
            visibility: "PROTECTED",
            pinned: false,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let res = check_status("create memo", res).await?;
        let data: CreateMemoResponse = res.json().await?;
        if let Some(code) = data.code {
            return Err(ServiceError::Malformed(format!(
                "memos error {}: {}",
                code,
                data.message.unwrap_or_default()
            )));
        }
        Ok(())
    }
}
