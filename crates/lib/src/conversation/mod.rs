//! Multi-turn conversations.
//!
//! Each family is a small state machine: an entry handler runs on the entry trigger and either
//! finishes or moves to a waiting state; `resume` handles the next accepted event in that state.
//! Scratch data lives inside the state variants. `/cancel` is handled by the dispatcher for every
//! family and state.

pub mod morning;
pub mod subway;
pub mod summarize;
pub mod weather;

use std::time::Duration;

use crate::channels::{CallbackTag, EventKind, InboundEvent, Outbox};
use crate::context::BotContext;
use crate::error::BotError;

/// Conversation families, in registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Subway,
    WeatherLocation,
    MorningWeather,
    Summarize,
}

impl Family {
    pub const ALL: [Family; 4] = [
        Family::Subway,
        Family::WeatherLocation,
        Family::MorningWeather,
        Family::Summarize,
    ];

    pub fn name(self) -> &'static str {
        self.definition().name
    }

    pub fn definition(self) -> &'static ConversationDefinition {
        match self {
            Family::Subway => &subway::DEFINITION,
            Family::WeatherLocation => &weather::DEFINITION,
            Family::MorningWeather => &morning::DEFINITION,
            Family::Summarize => &summarize::DEFINITION,
        }
    }
}

/// Static description of a family: what starts it and how failures are worded.
#[derive(Debug)]
pub struct ConversationDefinition {
    pub family: Family,
    pub name: &'static str,
    /// Commands that start the conversation.
    pub entry_commands: &'static [&'static str],
    /// Buttons that start the conversation.
    pub entry_buttons: &'static [CallbackTag],
    /// Prefix of the message sent when a handler fails.
    pub failure_prefix: &'static str,
}

/// Current state of a live session. Terminal is not a state: finished sessions are removed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Subway(subway::State),
    WeatherLocation(weather::State),
    Morning(morning::State),
    Summarize(summarize::State),
}

impl SessionState {
    pub fn family(&self) -> Family {
        match self {
            SessionState::Subway(_) => Family::Subway,
            SessionState::WeatherLocation(_) => Family::WeatherLocation,
            SessionState::Morning(_) => Family::MorningWeather,
            SessionState::Summarize(_) => Family::Summarize,
        }
    }

    /// How long the session may wait in this state before it is discarded.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            SessionState::Morning(s) => s.timeout(),
            _ => None,
        }
    }

    /// Whether this state has a transition for `kind`.
    pub fn accepts(&self, kind: &EventKind) -> bool {
        match self {
            SessionState::Subway(s) => s.accepts(kind),
            SessionState::WeatherLocation(s) => s.accepts(kind),
            SessionState::Morning(s) => s.accepts(kind),
            SessionState::Summarize(s) => s.accepts(kind),
        }
    }
}

/// Result of a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    /// Conversation finished; the session is removed.
    End,
    /// Wait in this state.
    Goto(SessionState),
}

/// Run the entry handler of `family`.
pub async fn enter(
    family: Family,
    ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    match family {
        Family::Subway => subway::enter(ctx, event, out).await,
        Family::WeatherLocation => weather::enter(ctx, event, out).await,
        Family::MorningWeather => morning::enter(ctx, event, out).await,
        Family::Summarize => summarize::enter(ctx, event, out).await,
    }
}

/// Feed an accepted event to a live session.
pub async fn resume(
    state: SessionState,
    ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    match state {
        SessionState::Subway(s) => subway::resume(s, ctx, event, out).await,
        SessionState::WeatherLocation(s) => weather::resume(s, ctx, event, out).await,
        SessionState::Morning(s) => morning::resume(s, ctx, event, out).await,
        SessionState::Summarize(s) => summarize::resume(s, ctx, event, out).await,
    }
}

/// Command arguments joined with spaces, or None when there are none.
pub(crate) fn joined_args(event: &InboundEvent) -> Option<String> {
    let joined = event.kind.args().join(" ");
    let joined = joined.trim();
    if joined.is_empty() {
        None
    } else {
        Some(joined.to_string())
    }
}
