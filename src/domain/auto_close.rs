use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use utoipa::ToSchema;

use super::schedule::{ScheduleTemplate, ShiftTime};

const SECONDS_PER_DAY: i64 = 86_400;

/// A point on the preview timeline, relative to the scheduled shift end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct TimelinePoint {
    #[schema(value_type = String, example = "00:15")]
    pub time: ShiftTime,
    pub minutes_after_shift_end: u32,
    /// Calendar days past the shift end date (1 = next day).
    pub day_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct AutoCloseTimeline {
    #[schema(value_type = String, example = "17:00")]
    pub shift_end: ShiftTime,
    pub reminder: TimelinePoint,
    pub auto_close: TimelinePoint,
    pub reminder_precedes_close: bool,
}

fn offset_from(shift_end: ShiftTime, minutes: u32) -> TimelinePoint {
    let (time, overflow) = shift_end
        .as_naive()
        .overflowing_add_signed(Duration::minutes(i64::from(minutes)));
    TimelinePoint {
        time: ShiftTime::from(time),
        minutes_after_shift_end: minutes,
        day_offset: (overflow / SECONDS_PER_DAY).unsigned_abs() as u32,
    }
}

/// Wall-clock reminder and close times for a shift ending at `shift_end`,
/// wrapping past midnight.
pub fn preview_timeline(shift_end: ShiftTime, reminder_minutes: u32, auto_close_minutes: u32) -> AutoCloseTimeline {
    AutoCloseTimeline {
        shift_end,
        reminder: offset_from(shift_end, reminder_minutes),
        auto_close: offset_from(shift_end, auto_close_minutes),
        reminder_precedes_close: reminder_minutes < auto_close_minutes,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoCloseAction {
    Wait,
    SendReminder,
    ForceClose,
}

/// Concrete instants for one open time entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoCloseSchedule {
    /// Scheduled shift end on the clock-in's local date, or the clock-in
    /// itself when the employee punched in after the shift ended.
    pub anchor: DateTime<Utc>,
    pub reminder_at: DateTime<Utc>,
    pub auto_close_at: DateTime<Utc>,
}

impl AutoCloseSchedule {
    pub fn for_entry(template: &ScheduleTemplate, clock_in: DateTime<Utc>, tz: Tz) -> Option<Self> {
        if !template.auto_close_enabled {
            return None;
        }

        let local_date = clock_in.with_timezone(&tz).date_naive();
        let scheduled_end = resolve_local(local_date.and_time(template.shift_end_time.as_naive()), tz)?;
        let anchor = scheduled_end.max(clock_in);

        Some(Self {
            anchor,
            reminder_at: anchor + Duration::minutes(i64::from(template.auto_close_first_reminder)),
            auto_close_at: anchor + Duration::minutes(i64::from(template.auto_close_window_minutes)),
        })
    }

    pub fn decide(&self, now: DateTime<Utc>, reminder_already_sent: bool) -> AutoCloseAction {
        if now >= self.auto_close_at {
            return AutoCloseAction::ForceClose;
        }
        // A reminder scheduled at or past the deadline would arrive after closure.
        if !reminder_already_sent && now >= self.reminder_at && self.reminder_at < self.auto_close_at {
            return AutoCloseAction::SendReminder;
        }
        AutoCloseAction::Wait
    }
}

/// Local wall time to UTC. Ambiguous times take the earlier instant; times
/// skipped by a DST jump move forward one hour.
pub fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn st(s: &str) -> ShiftTime {
        ShiftTime::parse(s).unwrap()
    }

    fn enabled(reminder: u32, window: u32) -> ScheduleTemplate {
        ScheduleTemplate {
            shift_start_time: st("08:00"),
            shift_end_time: st("17:00"),
            auto_close_enabled: true,
            auto_close_first_reminder: reminder,
            auto_close_window_minutes: window,
            ..ScheduleTemplate::default()
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_preview_same_day() {
        let timeline = preview_timeline(st("17:00"), 30, 120);
        assert_eq!(timeline.reminder.time.to_string(), "17:30");
        assert_eq!(timeline.reminder.day_offset, 0);
        assert_eq!(timeline.auto_close.time.to_string(), "19:00");
        assert!(timeline.reminder_precedes_close);
    }

    #[test]
    fn test_preview_wraps_past_midnight() {
        let timeline = preview_timeline(st("23:45"), 30, 60);
        assert_eq!(timeline.reminder.time.to_string(), "00:15");
        assert_eq!(timeline.reminder.day_offset, 1);
        assert_eq!(timeline.auto_close.time.to_string(), "00:45");
        assert_eq!(timeline.auto_close.day_offset, 1);
    }

    #[test]
    fn test_preview_flags_misordered_reminder() {
        let timeline = preview_timeline(st("17:00"), 90, 60);
        assert!(!timeline.reminder_precedes_close);
    }

    #[test]
    fn test_schedule_disabled_is_none() {
        let template = ScheduleTemplate::default();
        assert!(AutoCloseSchedule::for_entry(&template, utc(2026, 3, 2, 13, 0), Tz::UTC).is_none());
    }

    #[test]
    fn test_schedule_anchors_on_local_shift_end() {
        // 08:00 EST on 2026-01-05 is 13:00 UTC; 17:00 EST is 22:00 UTC.
        let template = enabled(30, 120);
        let schedule =
            AutoCloseSchedule::for_entry(&template, utc(2026, 1, 5, 13, 0), chrono_tz::America::New_York).unwrap();
        assert_eq!(schedule.anchor, utc(2026, 1, 5, 22, 0));
        assert_eq!(schedule.reminder_at, utc(2026, 1, 5, 22, 30));
        assert_eq!(schedule.auto_close_at, utc(2026, 1, 6, 0, 0));
    }

    #[test]
    fn test_schedule_anchors_on_late_clock_in() {
        let template = enabled(30, 120);
        let clock_in = utc(2026, 1, 5, 18, 10);
        let schedule = AutoCloseSchedule::for_entry(&template, clock_in, Tz::UTC).unwrap();
        assert_eq!(schedule.anchor, clock_in);
        assert_eq!(schedule.auto_close_at, utc(2026, 1, 5, 20, 10));
    }

    #[test]
    fn test_decide_progression() {
        let template = enabled(30, 120);
        let schedule = AutoCloseSchedule::for_entry(&template, utc(2026, 1, 5, 8, 0), Tz::UTC).unwrap();

        assert_eq!(schedule.decide(utc(2026, 1, 5, 17, 10), false), AutoCloseAction::Wait);
        assert_eq!(schedule.decide(utc(2026, 1, 5, 17, 30), false), AutoCloseAction::SendReminder);
        assert_eq!(schedule.decide(utc(2026, 1, 5, 17, 45), true), AutoCloseAction::Wait);
        assert_eq!(schedule.decide(utc(2026, 1, 5, 19, 0), true), AutoCloseAction::ForceClose);
        assert_eq!(schedule.decide(utc(2026, 1, 5, 19, 5), false), AutoCloseAction::ForceClose);
    }

    #[test]
    fn test_decide_never_reminds_after_deadline() {
        // Misconfigured stored template: reminder at or past the window.
        let template = enabled(120, 60);
        let schedule = AutoCloseSchedule::for_entry(&template, utc(2026, 1, 5, 8, 0), Tz::UTC).unwrap();
        assert_eq!(schedule.decide(utc(2026, 1, 5, 17, 59), false), AutoCloseAction::Wait);
        assert_eq!(schedule.decide(utc(2026, 1, 5, 18, 0), false), AutoCloseAction::ForceClose);
    }

    #[test]
    fn test_resolve_local_skips_dst_gap() {
        // 02:30 does not exist in New York on 2026-03-08.
        let naive = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap().and_hms_opt(2, 30, 0).unwrap();
        let resolved = resolve_local(naive, chrono_tz::America::New_York).unwrap();
        assert_eq!(resolved, utc(2026, 3, 8, 7, 30));
    }
}
