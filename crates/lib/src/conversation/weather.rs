//! `/weather_location`: weather for a typed place name or a shared location.

use crate::briefing;
use crate::channels::{EventKind, InboundEvent, OutboundMessage, Outbox, ReplyMarkup};
use crate::context::BotContext;
use crate::conversation::{joined_args, ConversationDefinition, Family, Next, SessionState};
use crate::error::BotError;

pub const DEFINITION: ConversationDefinition = ConversationDefinition {
    family: Family::WeatherLocation,
    name: "weather_location",
    entry_commands: &["weather_location"],
    entry_buttons: &[],
    failure_prefix: "날씨 조회 중 오류가 발생했습니다",
};

pub const PROMPT: &str = "날씨를 조회할 지역 이름을 입력하시거나, '현재 위치로 날씨 보기' 버튼을 눌러주세요.\n취소하려면 /cancel 을 입력하세요.";
const LOCATION_BUTTON: &str = "📍 현재 위치로 날씨 보기";
const PLACEHOLDER: &str = "원하는 지역 이름을 입력하세요...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitLocation,
}

impl State {
    pub fn accepts(&self, kind: &EventKind) -> bool {
        matches!(
            kind,
            EventKind::FreeText(_) | EventKind::LocationShare { .. }
        )
    }
}

pub async fn enter(
    ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    if let Some(place) = joined_args(event) {
        let report = briefing::briefing_for_place(ctx, &place).await?;
        out.push(OutboundMessage::markdown(event.chat_id, report)).await;
        return Ok(Next::End);
    }
    out.push(
        OutboundMessage::plain(event.chat_id, PROMPT).with_markup(ReplyMarkup::RequestLocation {
            label: LOCATION_BUTTON.to_string(),
            placeholder: Some(PLACEHOLDER.to_string()),
        }),
    )
    .await;
    Ok(Next::Goto(SessionState::WeatherLocation(State::AwaitLocation)))
}

pub async fn resume(
    state: State,
    ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    let report = match (state, &event.kind) {
        (State::AwaitLocation, EventKind::FreeText(place)) => {
            briefing::briefing_for_place(ctx, place).await?
        }
        (
            State::AwaitLocation,
            EventKind::LocationShare {
                latitude,
                longitude,
            },
        ) => briefing::briefing_at(ctx, *latitude, *longitude).await?,
        (_, other) => {
            return Err(BotError::Unrecoverable(format!(
                "weather conversation cannot handle {:?}",
                other
            )))
        }
    };
    out.push(OutboundMessage::markdown(event.chat_id, report).remove_keyboard())
        .await;
    Ok(Next::End)
}
