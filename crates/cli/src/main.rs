use anyhow::Context;
use clap::{Parser, Subcommand};
use lifebot::channels::{OutboundMessage, TelegramChannel};
use lifebot::context::BotContext;
use lifebot::conversation::subway::{self, SubwayQuery};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lifebot")]
#[command(about = "Personal assistant Telegram bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: LIFEBOT_CONFIG_PATH or ~/.lifebot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the bot: Telegram connector, scheduler, health/webhook server.
    Run {
        /// Config file path (default: LIFEBOT_CONFIG_PATH or ~/.lifebot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Build the news digest once and send it to the configured chat.
    News {
        /// Config file path (default: LIFEBOT_CONFIG_PATH or ~/.lifebot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Print the digest instead of sending it; its items are not marked seen.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print real-time arrivals for a station.
    Subway {
        /// Station name (e.g. 강남)
        station: String,

        /// Line (e.g. 2 or 경의중앙선)
        line: Option<String>,

        /// Direction (e.g. 상행, 하행, 내선, 외선)
        direction: Option<String>,

        /// Config file path (default: LIFEBOT_CONFIG_PATH or ~/.lifebot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("lifebot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, port }) => {
            if let Err(e) = run_bot(config, port).await {
                log::error!("lifebot failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::News { config, dry_run }) => {
            if let Err(e) = run_news(config, dry_run).await {
                log::error!("news digest failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Subway {
            station,
            line,
            direction,
            config,
        }) => {
            if let Err(e) = run_subway(config, station, line, direction).await {
                eprintln!("{:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lifebot::config::default_config_path);
    let dir = lifebot::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_bot(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = lifebot::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting lifebot on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    lifebot::gateway::run_bot(config, path).await
}

async fn run_news(config_path: Option<PathBuf>, dry_run: bool) -> anyhow::Result<()> {
    let (config, path) = lifebot::config::load_config(config_path)?;
    let ctx = BotContext::from_config(&config, &path);
    let digest = lifebot::news::build_digest(&ctx).await?;
    if dry_run {
        for chunk in &digest.chunks {
            println!("{}", chunk);
        }
        return Ok(());
    }
    let chat_id = ctx
        .chat_id
        .context("no chat to send to (set LIFEBOT_CHAT_ID or channels.telegram.chatId)")?;
    let token = lifebot::config::resolve_telegram_token(&config)
        .context("no telegram bot token (set TELEGRAM_BOT_TOKEN)")?;
    let telegram = TelegramChannel::new(Some(token));
    for chunk in &digest.chunks {
        telegram
            .send(&OutboundMessage::markdown(chat_id, chunk.clone()))
            .await
            .map_err(anyhow::Error::msg)
            .context("sending digest")?;
    }
    digest.mark_seen(&ctx).await?;
    Ok(())
}

async fn run_subway(
    config_path: Option<PathBuf>,
    station: String,
    line: Option<String>,
    direction: Option<String>,
) -> anyhow::Result<()> {
    let (config, path) = lifebot::config::load_config(config_path)?;
    let ctx = BotContext::from_config(&config, &path);
    let query = SubwayQuery::new(&station, line.as_deref(), direction.as_deref());
    let board = subway::station_board(&ctx, &query).await?;
    println!("{}", board);
    Ok(())
}
