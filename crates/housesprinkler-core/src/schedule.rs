//! Calendar schedule evaluator (spec.md §4.6): fires programs at their
//! configured time of day, subject to day-of-week/interval repeat rules,
//! a validity window, a rain delay, and a global on/off switch.
//!
//! Grounded in `pomodoroom-core::scheduler`'s day-template evaluation,
//! adapted from "does today's template apply" to "does this calendar rule
//! fire this minute".

use chrono::{DateTime, Datelike, Timelike, Utc};
use uuid::Uuid;

use crate::config::{RepeatKind, Schedule, SprinklerConfig};
use crate::program::ProgramRunner;
use crate::zone_queue::ZoneQueue;

/// Tolerance, in seconds past the target minute, within which a schedule
/// still counts as an exact time-of-day match. Covers jitter in the
/// driving tick without risking a double fire, since evaluation itself is
/// deduplicated to once per minute.
const TIME_MATCH_SLACK_SECS: u32 = 3;

fn time_matches(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    now.hour() == schedule.start.hour
        && now.minute() == schedule.start.minute
        && now.second() <= TIME_MATCH_SLACK_SECS
}

fn repeat_allows(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    match schedule.repeat {
        // A once schedule needs a concrete anchor (`begin`) and only fires
        // within 60 seconds of it; past that window a missed firing stays
        // missed rather than firing on some later day whose hour:minute
        // happens to match.
        RepeatKind::Once => {
            let now_secs = now.timestamp();
            schedule.last_launch == 0
                && schedule.begin != 0
                && now_secs >= schedule.begin
                && now_secs - schedule.begin < 60
        }
        RepeatKind::Daily => {
            if schedule.last_launch == 0 {
                return true;
            }
            let Some(last) = DateTime::from_timestamp(schedule.last_launch, 0) else {
                return true;
            };
            let days_elapsed = (now.date_naive() - last.date_naive()).num_days();
            days_elapsed >= schedule.interval.max(1)
        }
        RepeatKind::Weekly => {
            let weekday = now.weekday().num_days_from_sunday() as usize;
            let today_scheduled = schedule.days.get(weekday).copied().unwrap_or(false);
            if !today_scheduled {
                return false;
            }
            match DateTime::from_timestamp(schedule.last_launch, 0) {
                Some(last) => last.date_naive() != now.date_naive(),
                None => true,
            }
        }
    }
}

/// Evaluates calendar [`Schedule`]s once per minute and launches due
/// programs through a [`ProgramRunner`].
pub struct ScheduleEvaluator {
    last_evaluated_minute: Option<i64>,
    enabled: bool,
    rain_delay_honored: bool,
    rain_delay_until: i64,
}

impl Default for ScheduleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleEvaluator {
    pub fn new() -> Self {
        Self {
            last_evaluated_minute: None,
            enabled: true,
            rain_delay_honored: true,
            rain_delay_until: 0,
        }
    }

    /// Toggles the global schedule switch and returns the new state.
    pub fn switch(&mut self) -> bool {
        self.enabled = !self.enabled;
        tracing::info!(enabled = self.enabled, "schedule switch toggled");
        self.enabled
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Restores the global switch from a persisted snapshot.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Restores the rain delay deadline from a persisted snapshot.
    pub fn set_rain_delay_until(&mut self, until: i64) {
        self.rain_delay_until = until;
    }

    /// Whether an active rain delay currently suppresses schedule firing.
    pub fn rain_enable(&mut self, honored: bool) {
        self.rain_delay_honored = honored;
    }

    pub fn rain_delay_until(&self) -> i64 {
        self.rain_delay_until
    }

    /// Extends the rain delay by `delta_secs` seconds from whichever is
    /// later: the current delay, or now. A negative delta shortens it
    /// (not below `now`).
    pub fn set_rain(&mut self, delta_secs: i64, now: i64) {
        self.rain_delay_until = (self.rain_delay_until.max(now) + delta_secs).max(now);
        tracing::info!(until = self.rain_delay_until, "rain delay updated");
    }

    /// Evaluates every schedule once per wall-clock minute (idempotent
    /// within the same minute) and launches any that are due. Returns
    /// `true` if any schedule launched, so the caller knows whether
    /// `last_launch` bookkeeping needs persisting.
    pub fn tick(
        &mut self,
        config: &mut SprinklerConfig,
        runner: &ProgramRunner,
        queue: &mut ZoneQueue,
        index: u32,
        now: DateTime<Utc>,
    ) -> bool {
        let minute_key = now.timestamp().div_euclid(60);
        if self.last_evaluated_minute == Some(minute_key) {
            return false;
        }
        self.last_evaluated_minute = Some(minute_key);

        if !self.enabled {
            return false;
        }
        if self.rain_delay_honored && now.timestamp() < self.rain_delay_until {
            return false;
        }

        let now_secs = now.timestamp();
        let due: Vec<Uuid> = config
            .schedules
            .iter()
            .filter(|s| {
                s.enabled
                    && !(s.begin != 0 && now_secs < s.begin)
                    && !(s.until != 0 && now_secs > s.until)
                    && time_matches(s, now)
                    && repeat_allows(s, now)
                    && config.program(&s.program_name).map(|p| !p.running).unwrap_or(false)
            })
            .map(|s| s.id)
            .collect();

        let mut launched_any = false;
        for id in due {
            let Some(schedule) = config.schedules.iter().find(|s| s.id == id).cloned() else {
                continue;
            };
            if runner.start(config, queue, &schedule.program_name, false, index, now) {
                if let Some(s) = config.schedules.iter_mut().find(|s| s.id == id) {
                    s.last_launch = now_secs;
                }
                launched_any = true;
            }
        }
        launched_any
    }
}
