//! Telegram channel: long-poll getUpdates (or webhook updates), sendMessage / editMessageText
//! via the Bot API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channels::inbound::{CallbackTag, EventKind, InboundEvent};
use crate::channels::outbound::{OutboundMessage, ReplyMarkup, TextFormat};
use crate::channels::registry::ChannelHandle;
use crate::format::{split_by_lines, MAX_MESSAGE_CHARS};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
pub const TELEGRAM_CHANNEL_ID: &str = "telegram";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub location: Option<TelegramLocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramCallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

impl TelegramUpdate {
    /// The dispatcher event for this update. None for updates the bot does not handle
    /// (stickers, unknown button payloads, ...).
    pub fn to_event(&self, channel_id: &str) -> Option<InboundEvent> {
        if let Some(q) = &self.callback_query {
            let tag = CallbackTag::parse(q.data.as_deref()?)?;
            let msg = q.message.as_ref()?;
            return Some(InboundEvent::new(
                channel_id,
                msg.chat.id,
                q.from.id,
                EventKind::ButtonClick {
                    tag,
                    message_id: Some(msg.message_id),
                },
            ));
        }
        let msg = self.message.as_ref()?;
        let user_id = msg.from.as_ref().map(|u| u.id).unwrap_or(msg.chat.id);
        let kind = if let Some(loc) = &msg.location {
            EventKind::LocationShare {
                latitude: loc.latitude,
                longitude: loc.longitude,
            }
        } else {
            EventKind::from_text(msg.text.as_deref()?)
        };
        Some(InboundEvent::new(channel_id, msg.chat.id, user_id, kind))
    }
}

/// Bot API `reply_markup` object.
pub fn reply_markup_json(markup: &ReplyMarkup) -> Value {
    match markup {
        ReplyMarkup::Inline(rows) => json!({
            "inline_keyboard": rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| json!({ "text": b.label, "callback_data": b.tag.as_str() }))
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        }),
        ReplyMarkup::RequestLocation { label, placeholder } => {
            let mut v = json!({
                "keyboard": [[{ "text": label, "request_location": true }]],
                "one_time_keyboard": true,
                "resize_keyboard": true,
            });
            if let Some(p) = placeholder {
                v["input_field_placeholder"] = Value::String(p.clone());
            }
            v
        }
        ReplyMarkup::Remove => json!({ "remove_keyboard": true }),
    }
}

/// Telegram channel connector: receives updates and delivers outbound messages.
pub struct TelegramChannel {
    id: String,
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self {
            id: TELEGRAM_CHANNEL_ID.to_string(),
            token,
            api_base: TELEGRAM_API_BASE.to_string(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    /// Point the connector at another Bot API server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn method_url(&self, method: &str) -> Result<String, String> {
        let token = self
            .token
            .as_ref()
            .ok_or("telegram bot token not configured")?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// POST one Bot API method and return its `result`.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, String> {
        let url = self.method_url(method)?;
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("{} failed: {} {}", method, status, body));
        }
        let data: ApiResponse = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Err(format!(
                "{} returned ok: false ({})",
                method,
                data.description.unwrap_or_default()
            ));
        }
        Ok(data.result)
    }

    /// Start the getUpdates long-poll loop, forwarding events to the dispatcher.
    pub fn start_inbound(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundEvent>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Long poll. Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), String> {
        let mut body = json!({
            "timeout": LONG_POLL_TIMEOUT,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(off) = offset {
            body["offset"] = json!(off);
        }
        let result = self.call("getUpdates", &body).await?;
        let updates: Vec<TelegramUpdate> =
            serde_json::from_value(result).map_err(|e| e.to_string())?;
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Answer a callback query right away and turn the update into an event.
    pub async fn accept_update(&self, update: &TelegramUpdate) -> Option<InboundEvent> {
        if let Some(q) = &update.callback_query {
            if let Err(e) = self.answer_callback_query(&q.id).await {
                log::warn!("telegram: answerCallbackQuery: {}", e);
            }
        }
        let event = update.to_event(&self.id);
        if event.is_none() {
            log::debug!("telegram: ignoring update {}", update.update_id);
        }
        event
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), String> {
        self.call(
            "answerCallbackQuery",
            &json!({ "callback_query_id": callback_query_id }),
        )
        .await
        .map(|_| ())
    }

    /// Publish the command menu shown by Telegram clients.
    pub async fn set_my_commands(&self, commands: &[(String, String)]) -> Result<(), String> {
        let commands: Vec<Value> = commands
            .iter()
            .map(|(c, d)| json!({ "command": c, "description": d }))
            .collect();
        self.call("setMyCommands", &json!({ "commands": commands }))
            .await
            .map(|_| ())
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead
    /// of answering getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), String> {
        let mut body = json!({ "url": url });
        if let Some(s) = secret {
            body["secret_token"] = Value::String(s.to_string());
        }
        self.call("setWebhook", &body).await.map(|_| ())
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), String> {
        self.call("deleteWebhook", &json!({})).await.map(|_| ())
    }

    fn text_body(chat_id: i64, text: &str, format: TextFormat) -> Value {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if format == TextFormat::MarkdownV2 {
            body["parse_mode"] = Value::String("MarkdownV2".to_string());
        }
        body
    }

    /// Send or edit `msg`. Long texts go out as several messages; the markup rides on the last.
    pub async fn send(&self, msg: &OutboundMessage) -> Result<(), String> {
        let chunks = split_by_lines(&msg.text, MAX_MESSAGE_CHARS);
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = Self::text_body(msg.chat_id, chunk, msg.format);
            let markup = msg.markup.as_ref().filter(|_| i == last);
            match msg.edit_message_id.filter(|_| i == 0) {
                Some(message_id) => {
                    body["message_id"] = json!(message_id);
                    // edits only carry inline keyboards
                    if let Some(m @ ReplyMarkup::Inline(_)) = markup {
                        body["reply_markup"] = reply_markup_json(m);
                    }
                    self.call("editMessageText", &body).await?;
                }
                None => {
                    if let Some(m) = markup {
                        body["reply_markup"] = reply_markup_json(m);
                    }
                    self.call("sendMessage", &body).await?;
                }
            }
        }
        Ok(())
    }
}

async fn run_get_updates_loop(channel: Arc<TelegramChannel>, inbound_tx: mpsc::Sender<InboundEvent>) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                if next.is_some() {
                    offset = next;
                }
                for u in updates {
                    let Some(event) = channel.accept_update(&u).await else {
                        continue;
                    };
                    if inbound_tx.send(event).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::debug!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn deliver(&self, msg: &OutboundMessage) -> Result<(), String> {
        self.send(msg).await
    }
}
