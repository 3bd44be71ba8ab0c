//! Command registry: what each command, button and scheduled target starts.
//!
//! Built once by [`CommandRegistry::standard`] and shared read-only by the dispatcher.

use crate::channels::{CallbackTag, EventKind, TriggerTarget};
use crate::conversation::Family;
use crate::scheduler::ScheduledJob;

/// Commands that answer in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatelessCommand {
    Start,
    Help,
    Cancel,
    WeatherHome,
    WeatherOffice,
    WeatherParentHome,
    GuriToSeoul,
    ExpressToGuri,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTarget {
    Conversation(Family),
    Stateless(StatelessCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub target: CommandTarget,
}

/// Work that runs without a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatelessAction {
    Command(StatelessCommand),
    Button(CallbackTag),
    Job(ScheduledJob),
}

pub struct CommandRegistry {
    commands: Vec<CommandSpec>,
}

impl CommandRegistry {
    pub fn new(commands: Vec<CommandSpec>) -> Self {
        Self { commands }
    }

    /// The bot's command set.
    pub fn standard() -> Self {
        use CommandTarget::{Conversation, Stateless};
        let spec = |name: &'static str, description: &'static str, target| CommandSpec {
            name,
            description,
            target,
        };
        Self::new(vec![
            spec("start", "봇 소개", Stateless(StatelessCommand::Start)),
            spec("help", "명령어 목록", Stateless(StatelessCommand::Help)),
            spec(
                "subway",
                "지하철 실시간 도착 정보 (예: /subway 강남 2 상행)",
                Conversation(Family::Subway),
            ),
            spec(
                "guri2seoul",
                "구리역 서울행 도착 정보",
                Stateless(StatelessCommand::GuriToSeoul),
            ),
            spec(
                "express2guri",
                "고속터미널역 구리행 도착 정보",
                Stateless(StatelessCommand::ExpressToGuri),
            ),
            spec(
                "weather_location",
                "지역 이름 또는 현재 위치의 날씨",
                Conversation(Family::WeatherLocation),
            ),
            spec(
                "weather_home",
                "집 날씨",
                Stateless(StatelessCommand::WeatherHome),
            ),
            spec(
                "weather_office",
                "회사 날씨",
                Stateless(StatelessCommand::WeatherOffice),
            ),
            spec(
                "weather_parent_home",
                "본가 날씨",
                Stateless(StatelessCommand::WeatherParentHome),
            ),
            spec(
                "summarize_to_memos",
                "웹 페이지/유튜브 요약을 메모로 저장",
                Conversation(Family::Summarize),
            ),
            spec("cancel", "진행 중인 대화 취소", Stateless(StatelessCommand::Cancel)),
        ])
    }

    pub fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    pub fn lookup(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn is_cancel(&self, kind: &EventKind) -> bool {
        matches!(kind, EventKind::Command { name, .. }
            if self.lookup(name).map(|c| c.target)
                == Some(CommandTarget::Stateless(StatelessCommand::Cancel)))
    }

    /// Conversation started by `kind`, if any.
    pub fn entry_family(&self, kind: &EventKind) -> Option<Family> {
        match kind {
            EventKind::Command { name, .. } => match self.lookup(name)?.target {
                CommandTarget::Conversation(f) => Some(f),
                CommandTarget::Stateless(_) => None,
            },
            EventKind::ButtonClick { tag, .. } => Family::ALL
                .into_iter()
                .find(|f| f.definition().entry_buttons.contains(tag)),
            EventKind::TimerFired(TriggerTarget::Conversation(f)) => Some(*f),
            _ => None,
        }
    }

    /// Stateless work for `kind`, if any.
    pub fn stateless_action(&self, kind: &EventKind) -> Option<StatelessAction> {
        match kind {
            EventKind::Command { name, .. } => match self.lookup(name)?.target {
                CommandTarget::Stateless(c) => Some(StatelessAction::Command(c)),
                CommandTarget::Conversation(_) => None,
            },
            EventKind::ButtonClick { tag, .. } => match tag {
                CallbackTag::GuriInfoYes | CallbackTag::GuriInfoNo => {
                    Some(StatelessAction::Button(*tag))
                }
                CallbackTag::MorningCurrent | CallbackTag::MorningCurrentAndOffice => None,
            },
            EventKind::TimerFired(TriggerTarget::Job(job)) => Some(StatelessAction::Job(*job)),
            _ => None,
        }
    }

    /// `/help` text, one line per command.
    pub fn help_text(&self) -> String {
        let mut out = String::from("사용 가능한 명령어:\n");
        for c in &self.commands {
            out.push_str(&format!("/{} - {}\n", c.name, c.description));
        }
        out
    }

    /// `(command, description)` pairs for Telegram setMyCommands.
    pub fn menu(&self) -> Vec<(String, String)> {
        self.commands
            .iter()
            .map(|c| (c.name.to_string(), c.description.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str) -> EventKind {
        EventKind::Command {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    #[test]
    fn conversation_entry_commands_come_from_definitions() {
        let registry = CommandRegistry::standard();
        for family in Family::ALL {
            for name in family.definition().entry_commands {
                assert_eq!(registry.entry_family(&command(name)), Some(family));
            }
        }
    }

    #[test]
    fn buttons_route_to_conversation_or_stateless() {
        let registry = CommandRegistry::standard();
        let click = |tag| EventKind::ButtonClick {
            tag,
            message_id: Some(5),
        };
        assert_eq!(
            registry.entry_family(&click(CallbackTag::MorningCurrentAndOffice)),
            Some(Family::MorningWeather)
        );
        assert_eq!(registry.stateless_action(&click(CallbackTag::MorningCurrent)), None);
        assert_eq!(
            registry.stateless_action(&click(CallbackTag::GuriInfoNo)),
            Some(StatelessAction::Button(CallbackTag::GuriInfoNo))
        );
        assert_eq!(registry.entry_family(&click(CallbackTag::GuriInfoYes)), None);
    }

    #[test]
    fn cancel_and_unknown_commands() {
        let registry = CommandRegistry::standard();
        assert!(registry.is_cancel(&command("cancel")));
        assert!(!registry.is_cancel(&command("subway")));
        assert_eq!(registry.entry_family(&command("nope")), None);
        assert_eq!(registry.stateless_action(&command("nope")), None);
    }

    #[test]
    fn help_lists_every_command() {
        let registry = CommandRegistry::standard();
        let help = registry.help_text();
        for c in registry.commands() {
            assert!(help.contains(&format!("/{} ", c.name)));
        }
        assert_eq!(registry.menu().len(), registry.commands().len());
    }
}
