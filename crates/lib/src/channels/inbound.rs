//! Inbound event from a channel or the scheduler: delivered to the dispatcher.

use crate::conversation::Family;
use crate::scheduler::ScheduledJob;

/// Payload of an inline button. Parsed once at the channel boundary; unknown payloads never reach the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackTag {
    /// Morning prompt: weather for the current location only.
    MorningCurrent,
    /// Morning prompt: current location and the office.
    MorningCurrentAndOffice,
    /// Guri departure check: send the arrival board.
    GuriInfoYes,
    /// Guri departure check: decline.
    GuriInfoNo,
}

impl CallbackTag {
    /// Wire value sent as Telegram `callback_data`.
    pub fn as_str(self) -> &'static str {
        match self {
            CallbackTag::MorningCurrent => "morning_dynamic_current",
            CallbackTag::MorningCurrentAndOffice => "morning_dynamic_all",
            CallbackTag::GuriInfoYes => "guri_info_yes",
            CallbackTag::GuriInfoNo => "guri_info_no",
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        match data.trim() {
            "morning_dynamic_current" => Some(CallbackTag::MorningCurrent),
            "morning_dynamic_all" => Some(CallbackTag::MorningCurrentAndOffice),
            "guri_info_yes" => Some(CallbackTag::GuriInfoYes),
            "guri_info_no" => Some(CallbackTag::GuriInfoNo),
            _ => None,
        }
    }
}

/// What a scheduled trigger starts when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTarget {
    /// A stateless job (e.g. send the morning prompt).
    Job(ScheduledJob),
    /// A conversation entry, same as a user-initiated one.
    Conversation(Family),
}

/// Kind of inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// `/name arg1 arg2` (name lowercased, `@botname` suffix removed).
    Command { name: String, args: Vec<String> },
    FreeText(String),
    /// Inline button click; `message_id` is the message carrying the button.
    ButtonClick {
        tag: CallbackTag,
        message_id: Option<i64>,
    },
    LocationShare { latitude: f64, longitude: f64 },
    TimerFired(TriggerTarget),
}

impl EventKind {
    /// Parse a chat text into a command or free text.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if let Some(rest) = trimmed.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            let head = parts.next().unwrap_or("");
            let name = head.split('@').next().unwrap_or("").to_lowercase();
            if !name.is_empty() {
                return EventKind::Command {
                    name,
                    args: parts.map(str::to_string).collect(),
                };
            }
        }
        EventKind::FreeText(trimmed.to_string())
    }

    /// Command arguments; empty for every other kind.
    pub fn args(&self) -> &[String] {
        match self {
            EventKind::Command { args, .. } => args,
            _ => &[],
        }
    }
}

/// One inbound event: which chat/user it belongs to and what happened.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub channel_id: String,
    pub chat_id: i64,
    pub user_id: i64,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn new(channel_id: impl Into<String>, chat_id: i64, user_id: i64, kind: EventKind) -> Self {
        Self {
            channel_id: channel_id.into(),
            chat_id,
            user_id,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_with_bot_suffix_and_args() {
        assert_eq!(
            EventKind::from_text("/Subway@life_bot 강남 2"),
            EventKind::Command {
                name: "subway".to_string(),
                args: vec!["강남".to_string(), "2".to_string()],
            }
        );
    }

    #[test]
    fn bare_slash_is_free_text() {
        assert_eq!(EventKind::from_text(" / "), EventKind::FreeText("/".to_string()));
        assert_eq!(
            EventKind::from_text("잠실 2"),
            EventKind::FreeText("잠실 2".to_string())
        );
    }

    #[test]
    fn callback_tags_round_trip_wire_values() {
        for tag in [
            CallbackTag::MorningCurrent,
            CallbackTag::MorningCurrentAndOffice,
            CallbackTag::GuriInfoYes,
            CallbackTag::GuriInfoNo,
        ] {
            assert_eq!(CallbackTag::parse(tag.as_str()), Some(tag));
        }
        assert_eq!(CallbackTag::parse("guri_info_maybe"), None);
    }
}
