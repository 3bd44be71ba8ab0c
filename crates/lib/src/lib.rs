//! lifebot core library: conversations, dispatcher, scheduler, external services and the
//! Telegram runtime used by the CLI.

pub mod briefing;
pub mod channels;
pub mod commands;
pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod format;
pub mod gateway;
pub mod handlers;
pub mod init;
pub mod llm;
pub mod news;
pub mod routing;
pub mod scheduler;
pub mod services;
pub mod session;
