//! Stateless commands, buttons and scheduled jobs.

use crate::briefing;
use crate::channels::{
    CallbackTag, EventKind, InboundEvent, InlineButton, OutboundMessage, Outbox, ReplyMarkup,
};
use crate::commands::{CommandRegistry, StatelessAction, StatelessCommand};
use crate::config::Coordinates;
use crate::context::BotContext;
use crate::conversation::{morning, subway};
use crate::error::BotError;
use crate::format::{bold, escape_markdown_v2};
use crate::news;
use crate::scheduler::ScheduledJob;

pub const CANCELLED: &str = "조회를 취소했습니다.";
pub const NOT_UNDERSTOOD: &str =
    "입력을 이해하지 못했습니다. 다시 입력하시거나 /cancel 로 취소하세요.";
const WELCOME: &str = "안녕하세요! 날씨, 지하철, 뉴스 정보를 알려드리는 비서 봇입니다.\n/help 로 명령어 목록을 확인하세요.";
const GURI_QUESTION: &str = "*\\[자동\\]* 구리역 서울행 실시간 도착 정보를 받으시겠습니까?";
const GURI_DECLINED: &str = "*구리역 정보* 요청을 취소했습니다\\.";

/// Prefix of the message sent when `action` fails.
pub fn failure_prefix(action: StatelessAction) -> &'static str {
    match action {
        StatelessAction::Command(
            StatelessCommand::WeatherHome
            | StatelessCommand::WeatherOffice
            | StatelessCommand::WeatherParentHome,
        ) => "날씨 조회 중 오류가 발생했습니다",
        StatelessAction::Command(
            StatelessCommand::GuriToSeoul | StatelessCommand::ExpressToGuri,
        )
        | StatelessAction::Button(_) => "지하철 정보 조회 중 오류가 발생했습니다",
        StatelessAction::Job(job) => job.failure_prefix(),
        StatelessAction::Command(_) => "처리 중 오류가 발생했습니다",
    }
}

pub fn guri_question(chat_id: i64) -> OutboundMessage {
    OutboundMessage::markdown(chat_id, GURI_QUESTION).with_markup(ReplyMarkup::Inline(vec![vec![
        InlineButton::new("✅ 네, 주세요", CallbackTag::GuriInfoYes),
        InlineButton::new("❌ 아니요", CallbackTag::GuriInfoNo),
    ]]))
}

/// Reply in place of the clicked message when there is one.
pub(crate) fn reply_to_click(event: &InboundEvent, msg: OutboundMessage) -> OutboundMessage {
    match event.kind {
        EventKind::ButtonClick {
            message_id: Some(id),
            ..
        } => msg.editing(id),
        _ => msg,
    }
}

async fn fixed_location_weather(
    ctx: &BotContext,
    event: &InboundEvent,
    name: &str,
    location: Option<Coordinates>,
    out: &mut dyn Outbox,
) -> Result<(), BotError> {
    let [lat, lon] = location
        .ok_or_else(|| BotError::Unrecoverable(format!("{} 위치가 설정되지 않았습니다.", name)))?;
    let report = briefing::briefing_at(ctx, lat, lon).await?;
    out.push(OutboundMessage::markdown(event.chat_id, report)).await;
    Ok(())
}

async fn run_command(
    command: StatelessCommand,
    ctx: &BotContext,
    registry: &CommandRegistry,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<(), BotError> {
    let chat = event.chat_id;
    match command {
        StatelessCommand::Start => out.push(OutboundMessage::plain(chat, WELCOME)).await,
        StatelessCommand::Help => {
            out.push(OutboundMessage::plain(chat, registry.help_text()))
                .await
        }
        StatelessCommand::Cancel => {
            out.push(OutboundMessage::plain(chat, CANCELLED).remove_keyboard())
                .await
        }
        StatelessCommand::WeatherHome => {
            fixed_location_weather(ctx, event, "집", ctx.locations.home, out).await?
        }
        StatelessCommand::WeatherOffice => {
            fixed_location_weather(ctx, event, "회사", ctx.locations.office, out).await?
        }
        StatelessCommand::WeatherParentHome => {
            fixed_location_weather(ctx, event, "본가", ctx.locations.parent_home, out).await?
        }
        StatelessCommand::GuriToSeoul => {
            let board =
                subway::route_board(ctx, subway::GURI_TO_SEOUL_TITLE, &subway::guri_to_seoul())
                    .await?;
            out.push(OutboundMessage::markdown(chat, board)).await
        }
        StatelessCommand::ExpressToGuri => {
            let board = subway::route_board(
                ctx,
                subway::EXPRESS_TO_GURI_TITLE,
                &subway::express_to_guri(),
            )
            .await?;
            out.push(OutboundMessage::markdown(chat, board)).await
        }
    }
    Ok(())
}

async fn run_button(
    tag: CallbackTag,
    ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<(), BotError> {
    match tag {
        CallbackTag::GuriInfoYes => {
            let board =
                subway::route_board(ctx, subway::GURI_TO_SEOUL_TITLE, &subway::guri_to_seoul())
                    .await?;
            out.push(reply_to_click(
                event,
                OutboundMessage::markdown(event.chat_id, board),
            ))
            .await;
        }
        CallbackTag::GuriInfoNo => {
            out.push(reply_to_click(
                event,
                OutboundMessage::markdown(event.chat_id, GURI_DECLINED),
            ))
            .await;
        }
        CallbackTag::MorningCurrent | CallbackTag::MorningCurrentAndOffice => {
            return Err(BotError::Unrecoverable(format!(
                "{} starts a conversation",
                tag.as_str()
            )));
        }
    }
    Ok(())
}

async fn run_job(
    job: ScheduledJob,
    ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<(), BotError> {
    match job {
        ScheduledJob::MorningWeatherOptions => {
            out.push(morning::options_message(event.chat_id)).await
        }
        ScheduledJob::GuriDepartureCheck => out.push(guri_question(event.chat_id)).await,
        ScheduledJob::NewsDigest => {
            let digest = news::build_digest(ctx).await?;
            let failed_before = out.failed_deliveries();
            for chunk in &digest.chunks {
                out.push(OutboundMessage::markdown(event.chat_id, chunk.clone()))
                    .await;
            }
            if out.failed_deliveries() == failed_before {
                digest.mark_seen(ctx).await?;
            } else {
                log::warn!("news digest not fully delivered; its items stay unseen");
            }
        }
    }
    Ok(())
}

/// Run one stateless action.
pub async fn run(
    action: StatelessAction,
    ctx: &BotContext,
    registry: &CommandRegistry,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<(), BotError> {
    match action {
        StatelessAction::Command(c) => run_command(c, ctx, registry, event, out).await,
        StatelessAction::Button(tag) => run_button(tag, ctx, event, out).await,
        StatelessAction::Job(job) => run_job(job, ctx, event, out).await,
    }
}

/// User-visible text for a failed handler.
pub fn failure_message(prefix: &str, err: &BotError) -> String {
    match err {
        BotError::UserInputInvalid(msg) => msg.clone(),
        other => format!("{}: {}", prefix, other),
    }
}

/// Admin report for a failed scheduled job, MarkdownV2.
pub fn job_failure_report(job: ScheduledJob, detail: &str) -> String {
    format!(
        "{} {}",
        bold("[스케줄 오류]"),
        escape_markdown_v2(&format!("{}: {}", job.failure_prefix(), detail))
    )
}
