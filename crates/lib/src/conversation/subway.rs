//! Subway arrival lookup (`/subway 강남 2 상행`) and the fixed route boards.

use crate::channels::{EventKind, InboundEvent, OutboundMessage, Outbox};
use crate::context::BotContext;
use crate::conversation::{joined_args, ConversationDefinition, Family, Next, SessionState};
use crate::error::BotError;
use crate::format::{bold, escape_markdown_v2};
use crate::services::{Arrival, ServiceError};

pub const DEFINITION: ConversationDefinition = ConversationDefinition {
    family: Family::Subway,
    name: "subway",
    entry_commands: &["subway"],
    entry_buttons: &[],
    failure_prefix: "지하철 정보 조회 중 오류가 발생했습니다",
};

pub const PROMPT: &str = "조회할 역 이름을 입력해 주세요. (예: 강남 2 상행)\n취소하려면 /cancel 을 입력하세요.";

/// Line id of the realtime API to display name.
pub const SUBWAY_LINES: &[(&str, &str)] = &[
    ("1001", "1호선"),
    ("1002", "2호선"),
    ("1003", "3호선"),
    ("1004", "4호선"),
    ("1005", "5호선"),
    ("1006", "6호선"),
    ("1007", "7호선"),
    ("1008", "8호선"),
    ("1009", "9호선"),
    ("1061", "중앙선"),
    ("1063", "경의중앙선"),
    ("1065", "공항철도"),
    ("1067", "경춘선"),
    ("1075", "수인분당선"),
    ("1077", "신분당선"),
    ("1092", "우이신설선"),
    ("1093", "서해선"),
    ("1081", "경강선"),
    ("1032", "GTX-A"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitStationName,
}

impl State {
    pub fn accepts(&self, kind: &EventKind) -> bool {
        matches!(kind, EventKind::FreeText(_))
    }
}

/// `(station, line?, direction?)` as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubwayQuery {
    pub station: String,
    pub line: Option<String>,
    pub direction: Option<String>,
}

impl SubwayQuery {
    pub fn new(station: &str, line: Option<&str>, direction: Option<&str>) -> Self {
        Self {
            station: station.to_string(),
            line: line.map(str::to_string),
            direction: direction.map(str::to_string),
        }
    }

    /// Split on whitespace: station, then optional line, then optional direction.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let station = parts.next()?;
        let line = parts.next();
        let direction = parts.next();
        let extra: Vec<&str> = parts.collect();
        if !extra.is_empty() {
            log::debug!("subway query: ignoring extra words {:?}", extra);
        }
        Some(Self::new(station, line, direction))
    }

    /// Station name as the API expects it ("강남역" → "강남").
    fn api_station(&self) -> &str {
        match self.station.strip_suffix('역') {
            Some(s) if !s.is_empty() => s,
            _ => &self.station,
        }
    }
}

pub fn line_name(subway_id: &str) -> Option<&'static str> {
    SUBWAY_LINES
        .iter()
        .find(|(id, _)| *id == subway_id)
        .map(|(_, name)| *name)
}

/// "2" → "2호선"; names are matched as is.
pub fn resolve_line(arg: &str) -> Result<&'static str, BotError> {
    let wanted = if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_digit()) {
        format!("{}호선", arg)
    } else {
        arg.to_string()
    };
    SUBWAY_LINES
        .iter()
        .map(|(_, name)| *name)
        .find(|name| *name == wanted)
        .ok_or_else(|| BotError::input(format!("알 수 없는 노선입니다: {}", arg)))
}

fn train_emoji(kind: &str) -> Option<&'static str> {
    match kind {
        "급행" => Some("⚡"),
        "ITX" => Some("🚆"),
        "일반" => Some("🚈"),
        "특급" => Some("🚄"),
        _ => None,
    }
}

fn line_order(subway_id: &str) -> u32 {
    subway_id.parse().unwrap_or(u32::MAX)
}

fn format_arrival(a: &Arrival) -> String {
    let mut head = format!(
        "• {} {}",
        escape_markdown_v2(&a.direction),
        escape_markdown_v2(&a.train_line)
    );
    if let Some(kind) = a.train_kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        let label = match train_emoji(kind) {
            Some(e) => format!("{}{}", e, kind),
            None => kind.to_string(),
        };
        head.push(' ');
        head.push_str(&bold(&label));
    }
    let mut detail = escape_markdown_v2(a.message.trim());
    let position = a.position.trim();
    if !position.is_empty() && !a.message.contains(position) {
        detail.push_str(&format!(" \\({}\\)", escape_markdown_v2(position)));
    }
    format!("{}\n    ◦ {}\n", head, detail)
}

/// Arrivals grouped by line, filtered by the query's line and direction. Pure: same input, same text.
pub fn format_arrivals(query: &SubwayQuery, arrivals: &[Arrival]) -> Result<String, BotError> {
    let line_filter = query.line.as_deref().map(resolve_line).transpose()?;
    let mut sorted: Vec<&Arrival> = arrivals.iter().collect();
    sorted.sort_by_key(|a| line_order(&a.subway_id));

    let mut out = String::new();
    let mut current_line: Option<&str> = None;
    for a in sorted {
        let name = line_name(&a.subway_id).unwrap_or(a.subway_id.as_str());
        if line_filter.is_some_and(|l| l != name) {
            continue;
        }
        if query
            .direction
            .as_deref()
            .is_some_and(|d| d != a.direction.trim())
        {
            continue;
        }
        if current_line != Some(name) {
            out.push_str(&format!("\n{}\n", bold(name)));
            current_line = Some(name);
        }
        out.push_str(&format_arrival(a));
    }
    if out.is_empty() {
        out.push_str(&format!("\n{}\n", escape_markdown_v2("조건에 맞는 열차가 없습니다.")));
    }
    Ok(out)
}

async fn fetch(ctx: &BotContext, query: &SubwayQuery) -> Result<Vec<Arrival>, BotError> {
    if let Some(line) = query.line.as_deref() {
        resolve_line(line)?;
    }
    let station = query.api_station();
    let transit = &ctx.services.transit;
    match ctx
        .retry
        .run("subway arrivals", || transit.arrivals(station))
        .await
    {
        Err(ServiceError::NotFound) => Err(BotError::input(format!(
            "'{}'역의 도착 정보를 찾을 수 없습니다.",
            station
        ))),
        other => Ok(other?),
    }
}

/// Board for one station query.
pub async fn station_board(ctx: &BotContext, query: &SubwayQuery) -> Result<String, BotError> {
    let arrivals = fetch(ctx, query).await?;
    Ok(format!(
        "{}\n{}",
        bold(&format!("{}역 실시간 도착정보", query.api_station())),
        format_arrivals(query, &arrivals)?
    ))
}

/// Board combining several queries under one title.
pub async fn route_board(
    ctx: &BotContext,
    title: &str,
    queries: &[SubwayQuery],
) -> Result<String, BotError> {
    let mut out = bold(title);
    out.push('\n');
    for query in queries {
        let arrivals = fetch(ctx, query).await?;
        out.push_str(&format_arrivals(query, &arrivals)?);
    }
    Ok(out)
}

/// Guri toward Seoul: line 8 down and the Gyeongui-Jungang line up.
pub fn guri_to_seoul() -> Vec<SubwayQuery> {
    vec![
        SubwayQuery::new("구리", Some("8"), Some("하행")),
        SubwayQuery::new("구리", Some("경의중앙선"), Some("상행")),
    ]
}

/// Express Bus Terminal toward Guri: lines 9, 7 and 3 up.
pub fn express_to_guri() -> Vec<SubwayQuery> {
    vec![
        SubwayQuery::new("고속터미널", Some("9"), Some("상행")),
        SubwayQuery::new("고속터미널", Some("7"), Some("상행")),
        SubwayQuery::new("고속터미널", Some("3"), Some("상행")),
    ]
}

pub const GURI_TO_SEOUL_TITLE: &str = "구리역 서울행 실시간 도착정보";
pub const EXPRESS_TO_GURI_TITLE: &str = "고속터미널역 구리행 실시간 도착정보";

async fn lookup(
    ctx: &BotContext,
    event: &InboundEvent,
    query: &SubwayQuery,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    let board = station_board(ctx, query).await?;
    out.push(OutboundMessage::markdown(event.chat_id, board)).await;
    Ok(Next::End)
}

pub async fn enter(
    ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    match joined_args(event).as_deref().and_then(SubwayQuery::parse) {
        Some(query) => lookup(ctx, event, &query, out).await,
        None => {
            out.push(OutboundMessage::plain(event.chat_id, PROMPT)).await;
            Ok(Next::Goto(SessionState::Subway(State::AwaitStationName)))
        }
    }
}

pub async fn resume(
    state: State,
    ctx: &BotContext,
    event: &InboundEvent,
    out: &mut dyn Outbox,
) -> Result<Next, BotError> {
    match (state, &event.kind) {
        (State::AwaitStationName, EventKind::FreeText(text)) => match SubwayQuery::parse(text) {
            Some(query) => lookup(ctx, event, &query, out).await,
            None => {
                out.push(OutboundMessage::plain(event.chat_id, PROMPT)).await;
                Ok(Next::Goto(SessionState::Subway(State::AwaitStationName)))
            }
        },
        (_, other) => Err(BotError::Unrecoverable(format!(
            "subway conversation cannot handle {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(id: &str, dir: &str, line: &str, kind: Option<&str>, msg: &str, pos: &str) -> Arrival {
        Arrival {
            subway_id: id.to_string(),
            direction: dir.to_string(),
            train_line: line.to_string(),
            train_kind: kind.map(str::to_string),
            message: msg.to_string(),
            position: pos.to_string(),
        }
    }

    fn fixture() -> Vec<Arrival> {
        vec![
            arrival("1077", "상행", "신사행 - 양재방면", None, "2분 후", "양재시민의숲"),
            arrival("1002", "내선", "성수행 - 역삼방면", Some("일반"), "전역 도착", "교대"),
            arrival("1002", "외선", "서초행 - 교대방면", None, "[3]번째 전역 (역삼)", "역삼"),
        ]
    }

    #[test]
    fn parse_station_line_direction() {
        assert_eq!(
            SubwayQuery::parse("강남 2 상행"),
            Some(SubwayQuery::new("강남", Some("2"), Some("상행")))
        );
        assert_eq!(SubwayQuery::parse("구리"), Some(SubwayQuery::new("구리", None, None)));
        assert_eq!(SubwayQuery::parse("   "), None);
    }

    #[test]
    fn resolve_line_names() {
        assert_eq!(resolve_line("2").unwrap(), "2호선");
        assert_eq!(resolve_line("경의중앙선").unwrap(), "경의중앙선");
        assert!(matches!(resolve_line("99"), Err(BotError::UserInputInvalid(_))));
    }

    #[test]
    fn arrivals_grouped_by_line_in_id_order() {
        let text = format_arrivals(&SubwayQuery::new("강남", None, None), &fixture()).unwrap();
        let line2 = text.find("*2호선*").unwrap();
        let sinbundang = text.find("*신분당선*").unwrap();
        assert!(line2 < sinbundang);
        assert_eq!(text.matches("*2호선*").count(), 1);
        assert!(text.contains("• 내선 성수행 \\- 역삼방면 *🚈일반*\n    ◦ 전역 도착 \\(교대\\)\n"));
        // position already part of the message
        assert!(text.contains("◦ \\[3\\]번째 전역 \\(역삼\\)\n"));
    }

    #[test]
    fn formatting_is_deterministic() {
        let query = SubwayQuery::new("강남", Some("2"), None);
        let a = format_arrivals(&query, &fixture()).unwrap();
        let b = format_arrivals(&query, &fixture()).unwrap();
        assert_eq!(a, b);
        assert!(!a.contains("신분당선"));
    }

    #[test]
    fn direction_filter_can_empty_the_board() {
        let text =
            format_arrivals(&SubwayQuery::new("강남", Some("2"), Some("상행")), &fixture()).unwrap();
        assert!(text.contains("조건에 맞는 열차가 없습니다\\."));
    }

    #[test]
    fn station_suffix_is_dropped_for_the_api() {
        assert_eq!(SubwayQuery::new("강남역", None, None).api_station(), "강남");
        assert_eq!(SubwayQuery::new("역", None, None).api_station(), "역");
    }
}
