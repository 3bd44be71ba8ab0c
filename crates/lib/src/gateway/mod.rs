//! Runtime wiring: one port serves the health probe and the Telegram webhook.

mod server;

pub use server::{run_bot, run_with_context, GatewayState};
