//! Communication channels (Telegram).
//!
//! Inbound updates become [`InboundEvent`]s for the dispatcher; handlers produce
//! [`OutboundMessage`]s that a registered [`ChannelHandle`] delivers.

mod inbound;
mod outbound;
mod registry;
mod telegram;

pub use inbound::{CallbackTag, EventKind, InboundEvent, TriggerTarget};
pub use outbound::{InlineButton, OutboundMessage, Outbox, ReplyMarkup, TextFormat};
pub use registry::{ChannelHandle, ChannelRegistry};
pub use telegram::{reply_markup_json, TelegramChannel, TelegramUpdate, TELEGRAM_CHANNEL_ID};
