//! Bot runtime: intake loop, Telegram connector, scheduler, and the HTTP server for health and
//! the Telegram webhook (single port).

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channels::{ChannelRegistry, InboundEvent, TelegramChannel, TelegramUpdate};
use crate::commands::CommandRegistry;
use crate::config::{self, Config};
use crate::context::BotContext;
use crate::init;
use crate::routing::Dispatcher;
use crate::scheduler::Scheduler;
use crate::session::SessionStore;

const WEBHOOK_SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub channel_registry: Arc<ChannelRegistry>,
    /// Set when a Telegram token is configured.
    pub telegram: Option<Arc<TelegramChannel>>,
    /// Intake queue; webhook updates are pushed here.
    pub inbound_tx: mpsc::Sender<InboundEvent>,
}

/// Run the bot with HTTP clients built from `config` until SIGINT/SIGTERM.
pub async fn run_bot(config: Config, config_path: PathBuf) -> Result<()> {
    init::require_initialized(&config_path)?;
    let ctx = Arc::new(BotContext::from_config(&config, &config_path));
    run_with_context(config, ctx).await
}

/// Run the bot with a prepared context (services may be fakes).
pub async fn run_with_context(config: Config, ctx: Arc<BotContext>) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) && config.channels.telegram.webhook_secret.is_none() {
        anyhow::bail!(
            "refusing to bind to {} without a webhook secret (set channels.telegram.webhookSecret)",
            bind
        );
    }

    let registry = Arc::new(CommandRegistry::standard());
    let channel_registry = Arc::new(ChannelRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(
        ctx.clone(),
        SessionStore::new(),
        registry.clone(),
        channel_registry.clone(),
    ));

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundEvent>(64);
    {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            while let Some(event) = inbound_rx.recv().await {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.dispatch(event).await;
                });
            }
        });
    }

    let mut channel_tasks: Vec<JoinHandle<()>> = Vec::new();
    let webhook_url = config.channels.telegram.webhook_url.clone();
    let telegram = match config::resolve_telegram_token(&config) {
        Some(token) => {
            let telegram = Arc::new(TelegramChannel::new(Some(token)));
            if let Err(e) = telegram.set_my_commands(&registry.menu()).await {
                log::warn!("telegram setMyCommands failed: {}", e);
            }
            if let Some(ref url) = webhook_url {
                let secret = config.channels.telegram.webhook_secret.as_deref();
                if let Err(e) = telegram.set_webhook(url, secret).await {
                    log::warn!("telegram set_webhook failed: {}", e);
                } else {
                    log::info!("telegram channel registered (webhook mode): {}", url);
                }
            } else {
                if let Err(e) = telegram.delete_webhook().await {
                    log::debug!("telegram delete_webhook before polling: {}", e);
                }
                channel_tasks.push(telegram.clone().start_inbound(inbound_tx.clone()));
                log::info!("telegram channel registered and getUpdates loop started");
            }
            channel_registry.register(telegram.clone()).await;
            Some(telegram)
        }
        None => {
            log::warn!("no telegram bot token (TELEGRAM_BOT_TOKEN); running without a channel");
            None
        }
    };

    let scheduler_tasks = match ctx.chat_id {
        Some(chat_id) => {
            let scheduler = Scheduler::from_config(&config.schedule, chat_id)
                .context("building schedule")?;
            log::info!("scheduler: {} trigger(s)", scheduler.triggers().len());
            scheduler.start(dispatcher.clone())
        }
        None => {
            log::warn!("no chat id (LIFEBOT_CHAT_ID); scheduled jobs disabled");
            Vec::new()
        }
    };

    let state = GatewayState {
        config: Arc::new(config.clone()),
        dispatcher,
        channel_registry: channel_registry.clone(),
        telegram: telegram.clone(),
        inbound_tx,
    };
    let app = Router::new()
        .route("/", get(health_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("lifebot listening on {}", bind_addr);

    let webhook_channel = telegram.filter(|_| webhook_url.is_some());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            channel_registry,
            channel_tasks,
            scheduler_tasks,
            webhook_channel,
        ))
        .await
        .context("server exited")?;
    log::info!("lifebot stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM, after stopping the scheduler and channel connectors and
/// removing the Telegram webhook if one was set.
async fn shutdown_signal(
    channel_registry: Arc<ChannelRegistry>,
    channel_tasks: Vec<JoinHandle<()>>,
    scheduler_tasks: Vec<JoinHandle<()>>,
    telegram_webhook: Option<Arc<TelegramChannel>>,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("installing Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("installing SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping scheduler and channels");

    for h in &scheduler_tasks {
        h.abort();
    }
    channel_registry.stop_all().await;

    if let Some(t) = telegram_webhook {
        if let Err(e) = t.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }

    for h in channel_tasks {
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// POST /telegram/webhook: verifies the optional secret and queues the update.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let Some(telegram) = state.telegram.as_ref() else {
        return StatusCode::SERVICE_UNAVAILABLE;
    };
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let Some(event) = telegram.accept_update(&update).await else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(event).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "sessions": state.dispatcher.sessions().len().await,
        "channels": state.channel_registry.ids().await,
    }))
}
