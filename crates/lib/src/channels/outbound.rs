//! Outbound message produced by handlers and delivered by a channel.

use async_trait::async_trait;

use crate::channels::inbound::CallbackTag;

/// How the text should be parsed by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    /// Telegram MarkdownV2; the text must already be escaped.
    MarkdownV2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub tag: CallbackTag,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, tag: CallbackTag) -> Self {
        Self {
            label: label.into(),
            tag,
        }
    }
}

/// Keyboard attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyMarkup {
    /// Rows of inline buttons.
    Inline(Vec<Vec<InlineButton>>),
    /// One-shot reply keyboard with a single "share location" button.
    RequestLocation {
        label: String,
        placeholder: Option<String>,
    },
    /// Remove a previously shown reply keyboard.
    Remove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    pub format: TextFormat,
    pub markup: Option<ReplyMarkup>,
    /// When set, edit this message in place instead of sending a new one.
    pub edit_message_id: Option<i64>,
}

impl OutboundMessage {
    pub fn plain(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            format: TextFormat::Plain,
            markup: None,
            edit_message_id: None,
        }
    }

    pub fn markdown(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            format: TextFormat::MarkdownV2,
            ..Self::plain(chat_id, text)
        }
    }

    pub fn with_markup(mut self, markup: ReplyMarkup) -> Self {
        self.markup = Some(markup);
        self
    }

    pub fn remove_keyboard(self) -> Self {
        self.with_markup(ReplyMarkup::Remove)
    }

    pub fn editing(mut self, message_id: i64) -> Self {
        self.edit_message_id = Some(message_id);
        self
    }
}

/// Sink for the messages a handler produces, in order.
#[async_trait]
pub trait Outbox: Send {
    async fn push(&mut self, msg: OutboundMessage);

    /// Messages pushed so far that could not be delivered.
    fn failed_deliveries(&self) -> usize {
        0
    }
}

/// Collects messages instead of delivering them.
#[async_trait]
impl Outbox for Vec<OutboundMessage> {
    async fn push(&mut self, msg: OutboundMessage) {
        Vec::push(self, msg);
    }
}
