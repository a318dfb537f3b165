//! Recurring trigger bookkeeping for the publish pipeline.
//!
//! The scheduler only computes and advances fire times; the service loop in
//! the crate root sleeps on [`Scheduler::next_fire_time`] and runs the
//! pipeline when a trigger comes due.

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use weather_core::{
    ActivityLog, Clock, ErrorExt, PostTime, ScheduleConfig, ScheduleMode, SchedulingError,
};

/// Delay before the first run of an interval schedule.
pub const FIRST_INTERVAL_DELAY_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Daily(PostTime),
    Every { minutes: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub fire_at: DateTime<Utc>,
    pub recurrence: Recurrence,
}

/// First moment at or after `now` at which the wall clock in `tz` reads
/// `time`. A day on which `time` does not exist (spring-forward gap) is
/// skipped; an ambiguous time resolves to its earlier instant.
pub fn first_daily_occurrence<Tz: TimeZone>(
    now: DateTime<Utc>,
    time: PostTime,
    tz: &Tz,
) -> Result<DateTime<Utc>, SchedulingError> {
    daily_occurrence(now, time, tz, true)
}

/// Like [`first_daily_occurrence`] but strictly after `now`, for a trigger
/// that has just fired.
pub fn next_daily_occurrence<Tz: TimeZone>(
    now: DateTime<Utc>,
    time: PostTime,
    tz: &Tz,
) -> Result<DateTime<Utc>, SchedulingError> {
    daily_occurrence(now, time, tz, false)
}

fn daily_occurrence<Tz: TimeZone>(
    now: DateTime<Utc>,
    time: PostTime,
    tz: &Tz,
    inclusive: bool,
) -> Result<DateTime<Utc>, SchedulingError> {
    let today = now.with_timezone(tz).date_naive();

    for offset in 0..=2 {
        let Some(naive) = (today + Duration::days(offset)).and_hms_opt(time.hour, time.minute, 0)
        else {
            return Err(SchedulingError::InvalidTime {
                value: time.to_string(),
            });
        };
        match tz.from_local_datetime(&naive).earliest() {
            Some(local) => {
                let candidate = local.with_timezone(&Utc);
                if candidate > now || (inclusive && candidate == now) {
                    return Ok(candidate);
                }
            }
            None => debug!("{} does not exist on {}, skipping", time, naive.date()),
        }
    }

    Err(SchedulingError::NonexistentLocalTime {
        value: time.to_string(),
    })
}

impl ScheduledTrigger {
    /// Moves `fire_at` past `now` according to the recurrence.
    pub fn advance<Tz: TimeZone>(
        &mut self,
        now: DateTime<Utc>,
        tz: &Tz,
    ) -> Result<(), SchedulingError> {
        match self.recurrence {
            Recurrence::Daily(time) => {
                self.fire_at = next_daily_occurrence(now, time, tz)?;
            }
            Recurrence::Every { minutes } => {
                let step = Duration::minutes(i64::from(minutes.max(1)));
                while self.fire_at <= now {
                    self.fire_at += step;
                }
            }
        }
        Ok(())
    }
}

pub struct Scheduler<Tz: TimeZone = Local> {
    triggers: Vec<ScheduledTrigger>,
    clock: Arc<dyn Clock>,
    log: Arc<ActivityLog>,
    tz: Tz,
}

impl Scheduler<Local> {
    pub fn new(clock: Arc<dyn Clock>, log: Arc<ActivityLog>) -> Self {
        Self::with_timezone(clock, log, Local)
    }
}

impl<Tz: TimeZone> Scheduler<Tz> {
    pub fn with_timezone(clock: Arc<dyn Clock>, log: Arc<ActivityLog>, tz: Tz) -> Self {
        Self {
            triggers: Vec::new(),
            clock,
            log,
            tz,
        }
    }

    fn format_local(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz)
            .naive_local()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    /// Clears every trigger and rebuilds the set from `config`.
    ///
    /// Returns the number of triggers registered. With none registered the
    /// error is recorded in the debug log and returned, but the scheduler is
    /// still usable; [`Scheduler::next_fire_time`] simply reports `None`.
    pub fn configure(&mut self, config: &ScheduleConfig) -> Result<usize, SchedulingError> {
        self.triggers.clear();
        let now = self.clock.now();

        self.log.debug(format!(
            "Rescheduling with post_times: '{}', interval: {}",
            config
                .times_of_day()
                .iter()
                .map(PostTime::to_string)
                .collect::<Vec<_>>()
                .join(","),
            config
                .interval_minutes()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "none".to_string())
        ));
        for rejected in config.rejected() {
            self.log.debug(format!("Invalid time format: {}", rejected));
        }

        match config.mode() {
            ScheduleMode::Daily(times) => {
                for time in times {
                    match first_daily_occurrence(now, time, &self.tz) {
                        Ok(fire_at) => {
                            self.log.debug(format!(
                                "Scheduled post at {} daily, next run: {}",
                                time,
                                self.format_local(fire_at)
                            ));
                            self.triggers.push(ScheduledTrigger {
                                fire_at,
                                recurrence: Recurrence::Daily(time),
                            });
                        }
                        Err(e) => {
                            e.log_warn();
                            self.log.debug(format!("Skipping {}: {}", time, e));
                        }
                    }
                }
            }
            ScheduleMode::Interval { minutes } => {
                let fire_at = now + Duration::seconds(FIRST_INTERVAL_DELAY_SECS);
                self.log.debug(format!(
                    "Scheduled posts every {} minutes, next run: {}",
                    minutes,
                    self.format_local(fire_at)
                ));
                self.triggers.push(ScheduledTrigger {
                    fire_at,
                    recurrence: Recurrence::Every { minutes },
                });
            }
            ScheduleMode::Unscheduled => {}
        }

        match self.next_fire_time() {
            Some(next) => {
                self.log.debug(format!(
                    "Scheduled successfully, next run: {}",
                    self.format_local(next)
                ));
                info!("{} trigger(s) registered", self.triggers.len());
                Ok(self.triggers.len())
            }
            None => {
                let error = SchedulingError::NotScheduled;
                error.log_warn();
                self.log.debug("Scheduling failed: No event scheduled");
                Err(error)
            }
        }
    }

    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.triggers.iter().map(|t| t.fire_at).min()
    }

    /// How long the service loop should sleep; zero when a trigger is overdue.
    pub fn time_until_next(&self) -> Option<std::time::Duration> {
        self.next_fire_time()
            .map(|next| (next - self.clock.now()).to_std().unwrap_or_default())
    }

    pub fn triggers(&self) -> &[ScheduledTrigger] {
        &self.triggers
    }

    pub fn is_scheduled(&self) -> bool {
        !self.triggers.is_empty()
    }

    /// Advances every trigger that is due. Returns true when at least one
    /// was, meaning the pipeline should run once.
    pub fn take_due(&mut self) -> bool {
        let now = self.clock.now();
        let mut fired = false;
        let mut dropped = Vec::new();

        for (index, trigger) in self.triggers.iter_mut().enumerate() {
            if trigger.fire_at > now {
                continue;
            }
            fired = true;
            if let Err(e) = trigger.advance(now, &self.tz) {
                e.log_warn();
                dropped.push(index);
            }
        }
        for index in dropped.into_iter().rev() {
            let trigger = self.triggers.remove(index);
            self.log
                .debug(format!("Dropped trigger {:?}: no future occurrence", trigger.recurrence));
        }

        if fired {
            if let Some(next) = self.next_fire_time() {
                debug!("Next run: {}", self.format_local(next));
            }
        }
        fired
    }

    pub fn clear(&mut self) {
        self.triggers.clear();
        self.log.debug("Scheduler stopped, triggers cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use weather_core::ManualClock;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn scheduler(clock: &ManualClock) -> (Scheduler<Utc>, Arc<ActivityLog>) {
        let log = Arc::new(ActivityLog::new(Arc::new(clock.clone())));
        let scheduler = Scheduler::with_timezone(Arc::new(clock.clone()), log.clone(), Utc);
        (scheduler, log)
    }

    fn at(value: &str) -> PostTime {
        value.parse().unwrap()
    }

    #[test]
    fn test_next_daily_occurrence_today_or_tomorrow() {
        let now = start();
        assert_eq!(
            next_daily_occurrence(now, at("14:30"), &Utc).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 0).unwrap()
        );
        assert_eq!(
            next_daily_occurrence(now, at("09:00"), &Utc).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()
        );
        // an occurrence exactly at `now` is still today's, until it fires
        assert_eq!(
            first_daily_occurrence(now, at("10:00"), &Utc).unwrap(),
            now
        );
        assert_eq!(
            next_daily_occurrence(now, at("10:00"), &Utc).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_configure_exactly_at_post_time_fires_today() {
        let clock = ManualClock::new(start());
        let (mut scheduler, _) = scheduler(&clock);

        scheduler
            .configure(&ScheduleConfig::daily([at("10:00")]))
            .unwrap();
        assert_eq!(scheduler.next_fire_time(), Some(start()));
        assert_eq!(
            scheduler.time_until_next(),
            Some(std::time::Duration::ZERO)
        );

        assert!(scheduler.take_due());
        assert_eq!(
            scheduler.next_fire_time(),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap())
        );
        assert!(!scheduler.take_due());
    }

    #[test]
    fn test_next_daily_occurrence_uses_local_calendar() {
        // 23:30 UTC is already 01:30 the next day at UTC+2
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 23, 30, 0).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            next_daily_occurrence(now, at("08:00"), &plus_two).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 2, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_daily_configuration_one_trigger_per_time() {
        let clock = ManualClock::new(start());
        let (mut scheduler, _) = scheduler(&clock);

        let config = ScheduleConfig::from_settings("18:00, 08:00,08:00,18:00", Some(60));
        assert_eq!(scheduler.configure(&config).unwrap(), 2);
        assert_eq!(
            scheduler.next_fire_time(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap())
        );
        assert!(scheduler
            .triggers()
            .iter()
            .all(|t| matches!(t.recurrence, Recurrence::Daily(_))));
    }

    #[test]
    fn test_interval_configuration_starts_after_a_minute() {
        let clock = ManualClock::new(start());
        let (mut scheduler, log) = scheduler(&clock);

        scheduler.configure(&ScheduleConfig::every(90)).unwrap();
        assert_eq!(
            scheduler.next_fire_time(),
            Some(start() + Duration::seconds(60))
        );
        assert_eq!(
            scheduler.triggers()[0].recurrence,
            Recurrence::Every { minutes: 90 }
        );
        assert!(log
            .debug_entries()
            .iter()
            .any(|e| e.message.starts_with("Scheduled posts every 90 minutes")));
    }

    #[test]
    fn test_reconfiguring_is_idempotent() {
        let clock = ManualClock::new(start());
        let (mut scheduler, _) = scheduler(&clock);
        let config = ScheduleConfig::from_settings("07:15,19:45", Some(30));

        scheduler.configure(&config).unwrap();
        let first = scheduler.triggers().to_vec();
        scheduler.configure(&config).unwrap();
        assert_eq!(scheduler.triggers(), first.as_slice());
    }

    #[test]
    fn test_invalid_times_are_logged_and_skipped() {
        let clock = ManualClock::new(start());
        let (mut scheduler, log) = scheduler(&clock);

        let config = ScheduleConfig::from_settings("25:00,12:30,noon", None);
        assert_eq!(scheduler.configure(&config).unwrap(), 1);

        let messages: Vec<String> = log.debug_entries().into_iter().map(|e| e.message).collect();
        assert!(messages.contains(&"Invalid time format: 25:00".to_string()));
        assert!(messages.contains(&"Invalid time format: noon".to_string()));
    }

    #[test]
    fn test_nothing_to_schedule_is_reported() {
        let clock = ManualClock::new(start());
        let (mut scheduler, log) = scheduler(&clock);

        let error = scheduler
            .configure(&ScheduleConfig::from_settings("bogus", None))
            .unwrap_err();
        assert_eq!(error, SchedulingError::NotScheduled);
        assert_eq!(scheduler.next_fire_time(), None);
        assert_eq!(scheduler.time_until_next(), None);
        assert!(log
            .debug_entries()
            .iter()
            .any(|e| e.message == "Scheduling failed: No event scheduled"));
    }

    #[test]
    fn test_take_due_advances_triggers() {
        let clock = ManualClock::new(start());
        let (mut scheduler, _) = scheduler(&clock);
        scheduler.configure(&ScheduleConfig::every(30)).unwrap();

        assert!(!scheduler.take_due());

        clock.advance(Duration::seconds(61));
        assert!(scheduler.take_due());
        assert_eq!(
            scheduler.next_fire_time(),
            Some(start() + Duration::seconds(60) + Duration::minutes(30))
        );

        // a long stall fires once and skips the missed slots
        clock.advance(Duration::hours(3));
        assert!(scheduler.take_due());
        assert!(scheduler.next_fire_time().unwrap() > clock.now());
        assert!(!scheduler.take_due());
    }

    #[test]
    fn test_daily_trigger_moves_to_tomorrow_after_firing() {
        let clock = ManualClock::new(start());
        let (mut scheduler, _) = scheduler(&clock);
        scheduler
            .configure(&ScheduleConfig::daily([at("10:05")]))
            .unwrap();

        assert_eq!(
            scheduler.time_until_next(),
            Some(std::time::Duration::from_secs(300))
        );
        clock.advance(Duration::minutes(5));
        assert!(scheduler.take_due());
        assert_eq!(
            scheduler.next_fire_time(),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 10, 5, 0).unwrap())
        );
    }

    #[test]
    fn test_clear_removes_everything() {
        let clock = ManualClock::new(start());
        let (mut scheduler, _) = scheduler(&clock);
        scheduler.configure(&ScheduleConfig::every(60)).unwrap();
        assert!(scheduler.is_scheduled());

        scheduler.clear();
        assert!(!scheduler.is_scheduled());
        assert_eq!(scheduler.next_fire_time(), None);
    }
}
