//! Wall-clock triggers: at a time of day in a timezone, on a set of weekdays, submit a
//! `TimerFired` event to the dispatcher.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::channels::{EventKind, InboundEvent, TriggerTarget};
use crate::config::{JobSchedule, ScheduleConfig};

/// Channel that replies to scheduled events go out on.
pub const SCHEDULER_CHANNEL: &str = "telegram";

/// Stateless jobs a trigger can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledJob {
    /// Ask which morning weather to send.
    MorningWeatherOptions,
    /// Ask whether to send the Guri departure board.
    GuriDepartureCheck,
    NewsDigest,
}

impl ScheduledJob {
    pub fn name(self) -> &'static str {
        match self {
            ScheduledJob::MorningWeatherOptions => "morning_weather",
            ScheduledJob::GuriDepartureCheck => "guri_check",
            ScheduledJob::NewsDigest => "news_digest",
        }
    }

    pub fn failure_prefix(self) -> &'static str {
        match self {
            ScheduledJob::MorningWeatherOptions => "스케줄된 아침 날씨 옵션 전송 중 오류 발생",
            ScheduledJob::GuriDepartureCheck => "스케줄된 구리역 도착 정보 질문 전송 중 오류 발생",
            ScheduledJob::NewsDigest => "스케줄된 뉴스 요약 전송 중 오류 발생",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid time of day {0:?} (expected HH:MM or HH:MM:SS)")]
    Time(String),
    #[error("invalid weekday {0:?}")]
    Weekday(String),
    #[error("unknown timezone {0:?}")]
    Timezone(String),
}

pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ScheduleError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| ScheduleError::Time(s.to_string()))
}

pub fn parse_weekday(s: &str) -> Result<Weekday, ScheduleError> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| ScheduleError::Weekday(s.to_string()))
}

/// Fires at `time` in `timezone` on `days` (every day when empty).
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTrigger {
    pub name: String,
    pub time: NaiveTime,
    pub timezone: Tz,
    pub days: Vec<Weekday>,
    pub target: TriggerTarget,
    /// Chat the synthesized event belongs to.
    pub chat_id: i64,
}

impl ScheduledTrigger {
    pub fn daily(
        name: impl Into<String>,
        time: NaiveTime,
        timezone: Tz,
        target: TriggerTarget,
        chat_id: i64,
    ) -> Self {
        Self {
            name: name.into(),
            time,
            timezone,
            days: Vec::new(),
            target,
            chat_id,
        }
    }

    pub fn on_days(mut self, days: Vec<Weekday>) -> Self {
        self.days = days;
        self
    }

    fn runs_on(&self, day: Weekday) -> bool {
        self.days.is_empty() || self.days.contains(&day)
    }

    /// First firing instant strictly after `after`. Local times that do not exist (DST gap) are
    /// skipped; ambiguous ones fire at the earlier instant.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local_today = after.with_timezone(&self.timezone).date_naive();
        // a week plus a day covers every weekday set; extra days cover DST gaps
        for offset in 0..=14u64 {
            let date = local_today.checked_add_days(Days::new(offset))?;
            if !self.runs_on(date.weekday()) {
                continue;
            }
            let Some(local) = self
                .timezone
                .from_local_datetime(&date.and_time(self.time))
                .earliest()
            else {
                continue;
            };
            let at = local.with_timezone(&Utc);
            if at > after {
                return Some(at);
            }
        }
        None
    }

    /// The event submitted when this trigger fires.
    pub fn event(&self) -> InboundEvent {
        InboundEvent::new(
            SCHEDULER_CHANNEL,
            self.chat_id,
            self.chat_id,
            EventKind::TimerFired(self.target),
        )
    }
}

/// Source of the current instant for trigger loops.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that starts at a fixed instant and advances with tokio time, so paused-time tests
/// can drive triggers across days.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    start: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed()).unwrap_or_default();
        self.start + elapsed
    }
}

/// Receives fired events. The dispatcher implements this.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Handle the event; returns when handling is done.
    async fn submit(&self, event: InboundEvent);
}

pub struct Scheduler {
    triggers: Vec<ScheduledTrigger>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(triggers: Vec<ScheduledTrigger>) -> Self {
        Self {
            triggers,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Triggers for the enabled jobs of `config`, sending to `chat_id`.
    pub fn from_config(config: &ScheduleConfig, chat_id: i64) -> Result<Self, ScheduleError> {
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| ScheduleError::Timezone(config.timezone.clone()))?;
        let jobs: [(&JobSchedule, ScheduledJob); 3] = [
            (&config.morning_weather, ScheduledJob::MorningWeatherOptions),
            (&config.guri_check, ScheduledJob::GuriDepartureCheck),
            (&config.news_digest, ScheduledJob::NewsDigest),
        ];
        let mut triggers = Vec::new();
        for (schedule, job) in jobs {
            if !schedule.enabled {
                continue;
            }
            let days = schedule
                .days
                .iter()
                .map(|d| parse_weekday(d))
                .collect::<Result<Vec<_>, _>>()?;
            triggers.push(
                ScheduledTrigger::daily(
                    job.name(),
                    parse_time_of_day(&schedule.time)?,
                    timezone,
                    TriggerTarget::Job(job),
                    chat_id,
                )
                .on_days(days),
            );
        }
        Ok(Self::new(triggers))
    }

    pub fn triggers(&self) -> &[ScheduledTrigger] {
        &self.triggers
    }

    /// Spawn one task per trigger. Abort the handles to stop.
    pub fn start(self, sink: Arc<dyn EventSink>) -> Vec<JoinHandle<()>> {
        let clock = self.clock;
        self.triggers
            .into_iter()
            .map(|trigger| {
                let sink = Arc::clone(&sink);
                tokio::spawn(run_trigger(trigger, sink, Arc::clone(&clock)))
            })
            .collect()
    }
}

/// Sleep until each firing instant and submit; the next instant is computed only after the
/// handler returns.
async fn run_trigger(
    trigger: ScheduledTrigger,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
) {
    let mut after = clock.now();
    loop {
        let Some(next) = trigger.next_fire_after(after) else {
            log::warn!("trigger {}: no next firing time, stopping", trigger.name);
            return;
        };
        let wait = (next - clock.now()).to_std().unwrap_or_default();
        log::info!(
            "trigger {}: next at {} ({}s)",
            trigger.name,
            next.with_timezone(&trigger.timezone),
            wait.as_secs()
        );
        tokio::time::sleep(wait).await;
        log::info!("trigger {}: firing", trigger.name);
        sink.submit(trigger.event()).await;
        after = next.max(clock.now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::{America::New_York, Asia::Seoul};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records the clock time of every submit and how many handlers ran at once.
    struct RecordingSink {
        clock: TokioClock,
        busy_for: Duration,
        fired: Mutex<Vec<(DateTime<Utc>, EventKind)>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl RecordingSink {
        fn new(clock: TokioClock, busy_for: Duration) -> Arc<Self> {
            Arc::new(Self {
                clock,
                busy_for,
                fired: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            })
        }

        fn fired_at(&self) -> Vec<DateTime<Utc>> {
            self.fired.lock().unwrap().iter().map(|(at, _)| *at).collect()
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn submit(&self, event: InboundEvent) {
            self.fired.lock().unwrap().push((self.clock.now(), event.kind));
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(self.busy_for).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Whole seconds; paused tokio timers may wake a fraction of a millisecond late.
    fn secs(times: Vec<DateTime<Utc>>) -> Vec<i64> {
        times.iter().map(|t| t.timestamp()).collect()
    }

    fn kst(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Seoul
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn morning() -> ScheduledTrigger {
        ScheduledTrigger::daily(
            "morning",
            NaiveTime::from_hms_opt(5, 30, 0).unwrap(),
            Seoul,
            TriggerTarget::Job(ScheduledJob::MorningWeatherOptions),
            42,
        )
    }

    #[test]
    fn daily_trigger_fires_same_day_or_next() {
        // 2025-10-14 is a Tuesday
        assert_eq!(
            morning().next_fire_after(kst(2025, 10, 14, 5, 29)),
            Some(kst(2025, 10, 14, 5, 30))
        );
        assert_eq!(
            morning().next_fire_after(kst(2025, 10, 14, 5, 30)),
            Some(kst(2025, 10, 15, 5, 30))
        );
    }

    #[test]
    fn weekday_trigger_skips_weekend() {
        let guri = ScheduledTrigger::daily(
            "guri",
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            Seoul,
            TriggerTarget::Job(ScheduledJob::GuriDepartureCheck),
            42,
        )
        .on_days(vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ]);
        // Friday 2025-10-17 09:00 -> Monday 2025-10-20 08:00
        assert_eq!(
            guri.next_fire_after(kst(2025, 10, 17, 9, 0)),
            Some(kst(2025, 10, 20, 8, 0))
        );
    }

    #[test]
    fn nonexistent_local_time_is_skipped() {
        // 2025-03-09 02:30 does not exist in New York
        let trigger = ScheduledTrigger::daily(
            "dst",
            NaiveTime::from_hms_opt(2, 30, 0).unwrap(),
            New_York,
            TriggerTarget::Job(ScheduledJob::NewsDigest),
            1,
        );
        let before = New_York
            .with_ymd_and_hms(2025, 3, 8, 12, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc);
        let next = trigger.next_fire_after(before).unwrap();
        assert_eq!(
            next,
            New_York
                .with_ymd_and_hms(2025, 3, 10, 2, 30, 0)
                .single()
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn default_config_schedules_two_jobs() {
        let scheduler = Scheduler::from_config(&ScheduleConfig::default(), 7).unwrap();
        let names: Vec<_> = scheduler.triggers().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["morning_weather", "guri_check"]);
        assert_eq!(scheduler.triggers()[1].days.len(), 5);
        let event = scheduler.triggers()[0].event();
        assert_eq!(event.chat_id, 7);
        assert_eq!(
            event.kind,
            EventKind::TimerFired(TriggerTarget::Job(ScheduledJob::MorningWeatherOptions))
        );
    }

    #[test]
    fn bad_config_values_are_rejected() {
        let mut config = ScheduleConfig::default();
        config.morning_weather.time = "25:99".to_string();
        assert!(matches!(
            Scheduler::from_config(&config, 1),
            Err(ScheduleError::Time(_))
        ));
        let mut config = ScheduleConfig::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(matches!(
            Scheduler::from_config(&config, 1),
            Err(ScheduleError::Timezone(_))
        ));
        let mut config = ScheduleConfig::default();
        config.guri_check.days = vec!["someday".to_string()];
        assert!(matches!(
            Scheduler::from_config(&config, 1),
            Err(ScheduleError::Weekday(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_fires_once_per_instant_and_recurs() {
        let clock = TokioClock::starting_at(kst(2025, 10, 14, 5, 29));
        let sink = RecordingSink::new(clock, Duration::from_secs(2 * 3600));
        let handles = Scheduler::new(vec![morning()])
            .with_clock(Arc::new(clock))
            .start(sink.clone());

        // until Thursday 05:31
        tokio::time::sleep(Duration::from_secs(2 * 86_400 + 120)).await;
        for h in handles {
            h.abort();
        }

        assert_eq!(
            secs(sink.fired_at()),
            secs(vec![
                kst(2025, 10, 14, 5, 30),
                kst(2025, 10, 15, 5, 30),
                kst(2025, 10, 16, 5, 30),
            ])
        );
        let fired = sink.fired.lock().unwrap();
        assert!(fired.iter().all(|(_, kind)| *kind
            == EventKind::TimerFired(TriggerTarget::Job(ScheduledJob::MorningWeatherOptions))));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_never_overlaps_its_trigger() {
        let clock = TokioClock::starting_at(kst(2025, 10, 14, 5, 29));
        // the first run outlasts the next day's 05:30
        let sink = RecordingSink::new(clock, Duration::from_secs(25 * 3600));
        let handles = Scheduler::new(vec![morning()])
            .with_clock(Arc::new(clock))
            .start(sink.clone());

        tokio::time::sleep(Duration::from_secs(2 * 86_400 + 120)).await;
        for h in handles {
            h.abort();
        }

        assert_eq!(sink.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(
            secs(sink.fired_at()),
            secs(vec![kst(2025, 10, 14, 5, 30), kst(2025, 10, 16, 5, 30)])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_triggers_fire_independently() {
        let clock = TokioClock::starting_at(kst(2025, 10, 14, 5, 29));
        let sink = RecordingSink::new(clock, Duration::from_secs(3 * 3600));
        let news = ScheduledTrigger::daily(
            "news",
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            Seoul,
            TriggerTarget::Job(ScheduledJob::NewsDigest),
            42,
        );
        let handles = Scheduler::new(vec![morning(), news])
            .with_clock(Arc::new(clock))
            .start(sink.clone());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        for h in handles {
            h.abort();
        }

        // news fires while the morning handler is still busy
        assert_eq!(sink.max_running.load(Ordering::SeqCst), 2);
        assert_eq!(
            secs(sink.fired_at()),
            secs(vec![kst(2025, 10, 14, 5, 30), kst(2025, 10, 14, 6, 0)])
        );
    }
}
