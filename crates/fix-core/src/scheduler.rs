//! C9 — timezone-aware session schedule windows.
//!
//! Pure functions of `(Schedule, DateTime<Tz>)`, no I/O — `chrono`/
//! `chrono-tz` for timezone-aware windows, kept in the same
//! pure-function-of-state-and-time style as [`crate::session::Session`].

use std::collections::HashSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use chrono_tz::Tz;

/// One contiguous active window within a week, optionally spanning midnight.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    /// Days of week on which this window *starts*.
    pub days: HashSet<Weekday>,
    /// Local start-of-day time the window becomes active.
    pub start_time: NaiveTime,
    /// Local time the window becomes inactive — on the following day when
    /// [`TimeWindow::overnight`] is set.
    pub end_time: NaiveTime,
    /// If true, the window runs from `start_time` on a day in `days`
    /// through `end_time` on the following day.
    pub overnight: bool,
}

impl TimeWindow {
    fn contains(&self, now: DateTime<Tz>) -> bool {
        let weekday = now.weekday();
        let time = now.time();
        if self.overnight {
            let prev_day = weekday.pred();
            (self.days.contains(&weekday) && time >= self.start_time)
                || (self.days.contains(&prev_day) && time < self.end_time)
        } else {
            self.days.contains(&weekday) && time >= self.start_time && time < self.end_time
        }
    }
}

/// Optional fixed daily reset time, with a tolerance window during which the
/// reset is considered "due".
#[derive(Debug, Clone, Copy)]
pub struct ResetSchedule {
    /// Local time of day the reset should fire.
    pub reset_time: NaiveTime,
    /// How long after `reset_time` the reset is still considered on-time.
    pub tolerance: chrono::Duration,
}

/// A named time-window schedule associated with one or more sessions.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// IANA timezone windows and reset times are evaluated in.
    pub timezone: Tz,
    /// Active windows; a session is active if any window contains `now`.
    pub windows: Vec<TimeWindow>,
    /// Optional daily reset trigger.
    pub reset: Option<ResetSchedule>,
    /// Minutes before `end_time`/`reset_time` a one-shot warning fires.
    pub warning_minutes_before: i64,
    /// If false, `should_be_active` always returns `false` and no events
    /// fire.
    pub enabled: bool,
}

impl Schedule {
    /// True if any window is active at `now`, or the schedule is disabled
    /// (in which case this is always `false`).
    #[must_use]
    pub fn should_be_active(&self, now: DateTime<Tz>) -> bool {
        self.enabled && self.windows.iter().any(|w| w.contains(now))
    }
}

/// Events a [`ScheduleTracker`] emits as it observes a schedule over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    /// The schedule transitioned from inactive to active.
    SessionStart,
    /// The schedule transitioned from active to inactive.
    SessionEnd,
    /// The daily reset is due and has not yet fired today.
    Reset,
    /// A one-shot warning fired ahead of the window's end.
    EndWarning,
    /// A one-shot warning fired ahead of the daily reset.
    ResetWarning,
}

/// Tracks per-day "has this fired yet" state for one [`Schedule`], so
/// `tick` can be called every second without re-firing the same event
/// within a calendar day.
#[derive(Debug, Clone, Default)]
pub struct ScheduleTracker {
    was_active: Option<bool>,
    reset_fired_on: Option<NaiveDate>,
    end_warning_fired_on: Option<NaiveDate>,
    reset_warning_fired_on: Option<NaiveDate>,
}

impl ScheduleTracker {
    /// Evaluates `schedule` at `now_utc`, returning any newly-fired events.
    pub fn tick(&mut self, schedule: &Schedule, now_utc: DateTime<chrono::Utc>) -> Vec<ScheduleEvent> {
        let mut events = Vec::new();
        if !schedule.enabled {
            return events;
        }
        let now = now_utc.with_timezone(&schedule.timezone);
        let today = now.date_naive();

        let active = schedule.should_be_active(now);
        match self.was_active {
            Some(true) if !active => events.push(ScheduleEvent::SessionEnd),
            Some(false) if active => events.push(ScheduleEvent::SessionStart),
            None if active => events.push(ScheduleEvent::SessionStart),
            _ => {},
        }
        self.was_active = Some(active);

        if let Some(reset) = schedule.reset {
            let due = now.time() >= reset.reset_time && now.time() < reset.reset_time + reset.tolerance;
            if due && self.reset_fired_on != Some(today) {
                self.reset_fired_on = Some(today);
                events.push(ScheduleEvent::Reset);
            }

            if self.within_warning_window(now.time(), reset.reset_time, schedule.warning_minutes_before)
                && self.reset_warning_fired_on != Some(today)
            {
                self.reset_warning_fired_on = Some(today);
                events.push(ScheduleEvent::ResetWarning);
            }
        }

        for window in &schedule.windows {
            if self.within_warning_window(now.time(), window.end_time, schedule.warning_minutes_before)
                && self.end_warning_fired_on != Some(today)
            {
                self.end_warning_fired_on = Some(today);
                events.push(ScheduleEvent::EndWarning);
            }
        }

        events
    }

    fn within_warning_window(&self, time: NaiveTime, target: NaiveTime, minutes_before: i64) -> bool {
        if minutes_before <= 0 {
            return false;
        }
        let warning_start = target - chrono::Duration::minutes(minutes_before);
        if warning_start <= target {
            time >= warning_start && time < target
        } else {
            // `target` is near midnight and the subtraction wrapped.
            time >= warning_start || time < target
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn ny_time(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<chrono::Utc> {
        New_York.with_ymd_and_hms(y, m, d, h, min, 0).unwrap().with_timezone(&chrono::Utc)
    }

    fn overnight_fx_schedule() -> Schedule {
        let days: HashSet<Weekday> =
            [Weekday::Sun, Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu].into_iter().collect();
        Schedule {
            timezone: New_York,
            windows: vec![TimeWindow {
                days,
                start_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                overnight: true,
            }],
            reset: None,
            warning_minutes_before: 0,
            enabled: true,
        }
    }

    #[test]
    fn overnight_window_active_sunday_evening_and_monday_morning() {
        let schedule = overnight_fx_schedule();
        assert!(schedule.should_be_active(ny_time(2024, 1, 7, 17, 30).with_timezone(&New_York))); // Sunday
        assert!(schedule.should_be_active(ny_time(2024, 1, 8, 8, 0).with_timezone(&New_York))); // Monday
    }

    #[test]
    fn overnight_window_inactive_friday_evening_and_saturday() {
        let schedule = overnight_fx_schedule();
        assert!(!schedule.should_be_active(ny_time(2024, 1, 12, 18, 0).with_timezone(&New_York))); // Friday
        assert!(!schedule.should_be_active(ny_time(2024, 1, 13, 12, 0).with_timezone(&New_York))); // Saturday
    }

    #[test]
    fn disabled_schedule_is_never_active() {
        let mut schedule = overnight_fx_schedule();
        schedule.enabled = false;
        assert!(!schedule.should_be_active(ny_time(2024, 1, 7, 17, 30).with_timezone(&New_York)));
    }

    #[test]
    fn tracker_emits_start_then_end_on_transition() {
        let schedule = overnight_fx_schedule();
        let mut tracker = ScheduleTracker::default();

        let start_events = tracker.tick(&schedule, ny_time(2024, 1, 7, 17, 30));
        assert_eq!(start_events, vec![ScheduleEvent::SessionStart]);

        let end_events = tracker.tick(&schedule, ny_time(2024, 1, 12, 18, 0));
        assert_eq!(end_events, vec![ScheduleEvent::SessionEnd]);
    }

    #[test]
    fn reset_fires_once_per_day_within_tolerance() {
        let mut schedule = overnight_fx_schedule();
        schedule.reset = Some(ResetSchedule {
            reset_time: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            tolerance: chrono::Duration::minutes(5),
        });
        let mut tracker = ScheduleTracker::default();

        let first = tracker.tick(&schedule, ny_time(2024, 1, 8, 0, 2));
        assert!(first.contains(&ScheduleEvent::Reset));

        let second = tracker.tick(&schedule, ny_time(2024, 1, 8, 0, 4));
        assert!(!second.contains(&ScheduleEvent::Reset));

        let next_day = tracker.tick(&schedule, ny_time(2024, 1, 9, 0, 2));
        assert!(next_day.contains(&ScheduleEvent::Reset));
    }

    #[test]
    fn end_warning_fires_once_before_window_end() {
        let mut schedule = overnight_fx_schedule();
        schedule.warning_minutes_before = 10;
        let mut tracker = ScheduleTracker::default();

        let events = tracker.tick(&schedule, ny_time(2024, 1, 12, 16, 55));
        assert!(events.contains(&ScheduleEvent::EndWarning));

        let events = tracker.tick(&schedule, ny_time(2024, 1, 12, 16, 57));
        assert!(!events.contains(&ScheduleEvent::EndWarning));
    }
}
