//! Morning weather: the scheduled prompt offers two buttons; a click starts a session that waits
//! for the user's location.

use std::time::Duration;

use crate::briefing;
use crate::channels::{
    CallbackTag, EventKind, InboundEvent, InlineButton, OutboundMessage, Outbox, ReplyMarkup,
};
use crate::context::BotContext;
use crate::conversation::{ConversationDefinition, Family, Next, SessionState};
use crate::error::BotError;

pub const DEFINITION: ConversationDefinition = ConversationDefinition {
    family: Family::MorningWeather,
    name: "morning_weather",
    entry_commands: &[],
    entry_buttons: &[CallbackTag::MorningCurrent, CallbackTag::MorningCurrentAndOffice],
    failure_prefix: "날씨 조회 중 오류가 발생했습니다",
};

/// How long a morning session waits for the location.
pub const LOCATION_TIMEOUT: Duration = Duration::from_secs(600);

const OPTIONS_TEXT: &str = "좋은 아침입니다! ☀️\n조회할 날씨 종류를 선택하세요:";
const ACK_TEXT: &str =
    "✅ 선택을 확인했습니다.\n이제 '현재 위치 전송하기' 버튼을 눌러 위치를 보내주세요.";
const LOCATION_PROMPT: &str = "아래 버튼을 눌러주세요 ⬇️";
const LOCATION_BUTTON: &str = "📍 현재 위치 전송하기";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorningChoice {
    Current,
    CurrentAndOffice,
}

impl MorningChoice {
    fn from_event(kind: &EventKind) -> Self {
        match kind {
            EventKind::ButtonClick {
                tag: CallbackTag::MorningCurrentAndOffice,
                ..
            } => MorningChoice::CurrentAndOffice,
            _ => MorningChoice::Current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitLocationShare { choice: MorningChoice },
}

impl State {
    pub fn accepts(&self, kind: &EventKind) -> bool {
        matches!(kind, EventKind::LocationShare { .. })
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self {
            State::AwaitLocationShare { .. } => Some(LOCATION_TIMEOUT),
        }
    }
}

/// The scheduled question with the two morning buttons.
pub fn options_message(chat_id: i64) -> OutboundMessage {
    OutboundMessage::plain(chat_id, OPTIONS_TEXT).with_markup(ReplyMarkup::Inline(vec![
        vec![InlineButton::new(
            "📍 현재 위치 날씨 받기",
            CallbackTag::MorningCurrent,
        )],
        vec![InlineButton::new(
            "📍 현재 위치 + 🏢 회사 날씨 받기",
            CallbackTag::MorningCurrentAndOffice,
        )],
    ]))
}

pub async fn enter(
    _ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    let choice = MorningChoice::from_event(&event.kind);
    if let EventKind::ButtonClick {
        message_id: Some(id),
        ..
    } = event.kind
    {
        out.push(OutboundMessage::plain(event.chat_id, ACK_TEXT).editing(id))
            .await;
    }
    out.push(
        OutboundMessage::plain(event.chat_id, LOCATION_PROMPT).with_markup(
            ReplyMarkup::RequestLocation {
                label: LOCATION_BUTTON.to_string(),
                placeholder: None,
            },
        ),
    )
    .await;
    Ok(Next::Goto(SessionState::Morning(State::AwaitLocationShare {
        choice,
    })))
}

pub async fn resume(
    state: State,
    ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    let (State::AwaitLocationShare { choice }, EventKind::LocationShare { latitude, longitude }) =
        (state, &event.kind)
    else {
        return Err(BotError::Unrecoverable(format!(
            "morning conversation cannot handle {:?}",
            event.kind
        )));
    };
    let here = briefing::briefing_at(ctx, *latitude, *longitude).await?;
    out.push(OutboundMessage::markdown(event.chat_id, here).remove_keyboard())
        .await;
    if choice == MorningChoice::CurrentAndOffice {
        let [lat, lon] = ctx
            .locations
            .office
            .ok_or_else(|| BotError::Unrecoverable("회사 위치가 설정되지 않았습니다.".to_string()))?;
        let office = briefing::briefing_at(ctx, lat, lon).await?;
        out.push(OutboundMessage::markdown(event.chat_id, office)).await;
    }
    Ok(Next::End)
}
