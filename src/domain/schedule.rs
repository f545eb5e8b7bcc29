use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use utoipa::ToSchema;

use super::auto_close::{preview_timeline, AutoCloseTimeline};

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("Invalid day of week {0}, expected 0-6")]
    InvalidDay(u8),

    #[error("Day of week {0} is listed more than once")]
    DuplicateDay(u8),

    #[error("Shift end {end} must be after shift start {start}; overnight shifts are not supported")]
    ShiftEndNotAfterStart { start: ShiftTime, end: ShiftTime },

    #[error("{0} must be positive when auto-close is enabled")]
    NonPositive(&'static str),

    #[error("First reminder ({reminder} min) must come before the auto-close deadline ({window} min)")]
    ReminderNotBeforeClose { reminder: u32, window: u32 },
}

/// Wall-clock time of day, serialized as "HH:MM".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShiftTime(NaiveTime);

impl ShiftTime {
    /// Accepts "HH:MM" and the "HH:MM:SS" form Postgres `time` columns render to.
    pub fn parse(input: &str) -> Result<Self, ScheduleError> {
        let trimmed = input.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .map(|t| Self(t.with_second(0).unwrap_or(t)))
            .map_err(|_| ScheduleError::InvalidTime(input.to_string()))
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        self.0.hour() * 60 + self.0.minute()
    }
}

impl From<NaiveTime> for ShiftTime {
    fn from(time: NaiveTime) -> Self {
        Self(time.with_second(0).unwrap_or(time))
    }
}

impl fmt::Display for ShiftTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

impl Serialize for ShiftTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ShiftTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ShiftTime::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn default_shift_start() -> ShiftTime {
    ShiftTime(NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN))
}

fn default_shift_end() -> ShiftTime {
    ShiftTime(NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN))
}

fn default_workdays() -> Vec<u8> {
    vec![1, 2, 3, 4, 5]
}

fn default_early_punch() -> Option<u32> {
    Some(15)
}

fn default_late_grace() -> Option<u32> {
    Some(5)
}

fn default_required_break() -> u32 {
    30
}

fn default_first_reminder() -> u32 {
    30
}

fn default_second_reminder() -> Option<u32> {
    Some(60)
}

fn default_auto_close_window() -> u32 {
    120
}

/// Shift window, workdays, break policy and auto-close parameters for a
/// single employee/dealership assignment. Stored as JSONB on the assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScheduleTemplate {
    #[serde(default = "default_shift_start")]
    #[schema(value_type = String, example = "08:00")]
    pub shift_start_time: ShiftTime,
    #[serde(default = "default_shift_end")]
    #[schema(value_type = String, example = "17:00")]
    pub shift_end_time: ShiftTime,
    /// 0 = Sunday .. 6 = Saturday
    #[serde(default = "default_workdays")]
    pub days_of_week: Vec<u8>,
    #[serde(default = "default_early_punch")]
    pub early_punch_allowed_minutes: Option<u32>,
    #[serde(default = "default_late_grace")]
    pub late_punch_grace_minutes: Option<u32>,
    #[serde(default = "default_required_break")]
    pub required_break_minutes: u32,
    #[serde(default)]
    pub break_is_paid: bool,
    #[serde(default)]
    pub require_face_validation: bool,
    #[serde(default)]
    pub auto_close_enabled: bool,
    #[serde(default = "default_first_reminder")]
    pub auto_close_first_reminder: u32,
    // Persisted for compatibility; no timing logic reads it.
    #[serde(default = "default_second_reminder")]
    pub auto_close_second_reminder: Option<u32>,
    #[serde(default = "default_auto_close_window")]
    pub auto_close_window_minutes: u32,
}

impl Default for ScheduleTemplate {
    fn default() -> Self {
        Self {
            shift_start_time: default_shift_start(),
            shift_end_time: default_shift_end(),
            days_of_week: default_workdays(),
            early_punch_allowed_minutes: default_early_punch(),
            late_punch_grace_minutes: default_late_grace(),
            required_break_minutes: default_required_break(),
            break_is_paid: false,
            require_face_validation: false,
            auto_close_enabled: false,
            auto_close_first_reminder: default_first_reminder(),
            auto_close_second_reminder: default_second_reminder(),
            auto_close_window_minutes: default_auto_close_window(),
        }
    }
}

impl ScheduleTemplate {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.shift_end_time <= self.shift_start_time {
            return Err(ScheduleError::ShiftEndNotAfterStart {
                start: self.shift_start_time,
                end: self.shift_end_time,
            });
        }

        let mut seen = [false; 7];
        for &day in &self.days_of_week {
            let slot = seen
                .get_mut(day as usize)
                .ok_or(ScheduleError::InvalidDay(day))?;
            if *slot {
                return Err(ScheduleError::DuplicateDay(day));
            }
            *slot = true;
        }

        if let Some(0) = self.auto_close_second_reminder {
            return Err(ScheduleError::NonPositive("auto_close_second_reminder"));
        }

        if self.auto_close_enabled {
            if self.auto_close_first_reminder == 0 {
                return Err(ScheduleError::NonPositive("auto_close_first_reminder"));
            }
            if self.auto_close_window_minutes == 0 {
                return Err(ScheduleError::NonPositive("auto_close_window_minutes"));
            }
            if self.auto_close_first_reminder >= self.auto_close_window_minutes {
                return Err(ScheduleError::ReminderNotBeforeClose {
                    reminder: self.auto_close_first_reminder,
                    window: self.auto_close_window_minutes,
                });
            }
        }

        Ok(())
    }

    pub fn works_on(&self, day_from_sunday: u32) -> bool {
        self.days_of_week.iter().any(|&d| u32::from(d) == day_from_sunday)
    }

    pub fn shift_minutes(&self) -> u32 {
        self.shift_end_time
            .minutes_since_midnight()
            .saturating_sub(self.shift_start_time.minutes_since_midnight())
    }
}

/// Renders a workday selection: "All days", "No days", "Mon-Fri" for a
/// contiguous run longer than two days, otherwise "Mon, Wed".
pub fn format_days_of_week(days: &[u8]) -> String {
    let mut sorted: Vec<u8> = days.iter().copied().filter(|d| (*d as usize) < DAY_NAMES.len()).collect();
    sorted.sort_unstable();
    sorted.dedup();

    match sorted.as_slice() {
        [] => "No days".to_string(),
        all if all.len() == DAY_NAMES.len() => "All days".to_string(),
        [first, .., last]
            if sorted.len() > 2 && sorted.windows(2).all(|pair| pair[1] == pair[0] + 1) =>
        {
            format!("{}-{}", DAY_NAMES[*first as usize], DAY_NAMES[*last as usize])
        }
        _ => sorted
            .iter()
            .map(|d| DAY_NAMES[*d as usize])
            .collect::<Vec<_>>()
            .join(", "),
    }
}

pub fn auto_close_label(template: &ScheduleTemplate) -> String {
    if !template.auto_close_enabled {
        return "Auto-Close: Off".to_string();
    }
    format!(
        "Auto-Close: {} min (reminder at {} min)",
        template.auto_close_window_minutes, template.auto_close_first_reminder
    )
}

pub fn break_label(template: &ScheduleTemplate) -> String {
    if template.required_break_minutes == 0 {
        return "No break required".to_string();
    }
    let paid = if template.break_is_paid { "paid" } else { "unpaid" };
    format!("{} min break ({})", template.required_break_minutes, paid)
}

/// Read-only rendering of a template. `auto_close_timeline` is absent when
/// auto-close is off, so clients never show reminder/window values for it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScheduleSummary {
    pub days: String,
    pub hours: String,
    pub shift_minutes: u32,
    pub break_policy: String,
    pub auto_close: String,
    pub face_validation: bool,
    pub auto_close_timeline: Option<AutoCloseTimeline>,
}

impl From<&ScheduleTemplate> for ScheduleSummary {
    fn from(template: &ScheduleTemplate) -> Self {
        let auto_close_timeline = template.auto_close_enabled.then(|| {
            preview_timeline(
                template.shift_end_time,
                template.auto_close_first_reminder,
                template.auto_close_window_minutes,
            )
        });

        Self {
            days: format_days_of_week(&template.days_of_week),
            hours: format!("{} - {}", template.shift_start_time, template.shift_end_time),
            shift_minutes: template.shift_minutes(),
            break_policy: break_label(template),
            auto_close: auto_close_label(template),
            face_validation: template.require_face_validation,
            auto_close_timeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> ShiftTime {
        ShiftTime::parse(s).unwrap()
    }

    #[test]
    fn test_shift_time_parses_both_forms() {
        assert_eq!(t("08:30").to_string(), "08:30");
        assert_eq!(t("17:05:00").to_string(), "17:05");
        assert!(ShiftTime::parse("25:00").is_err());
        assert!(ShiftTime::parse("8am").is_err());
    }

    #[test]
    fn test_all_days() {
        assert_eq!(format_days_of_week(&[0, 1, 2, 3, 4, 5, 6]), "All days");
        assert_eq!(format_days_of_week(&[6, 5, 4, 3, 2, 1, 0]), "All days");
    }

    #[test]
    fn test_no_days() {
        assert_eq!(format_days_of_week(&[]), "No days");
    }

    #[test]
    fn test_contiguous_run_renders_range() {
        assert_eq!(format_days_of_week(&[1, 2, 3, 4, 5]), "Mon-Fri");
        assert_eq!(format_days_of_week(&[5, 3, 4]), "Wed-Fri");
    }

    #[test]
    fn test_short_or_gapped_selection_renders_list() {
        assert_eq!(format_days_of_week(&[1, 2]), "Mon, Tue");
        assert_eq!(format_days_of_week(&[1, 3, 5]), "Mon, Wed, Fri");
        assert_eq!(format_days_of_week(&[0, 1, 2, 4]), "Sun, Mon, Tue, Thu");
        assert_eq!(format_days_of_week(&[6]), "Sat");
    }

    #[test]
    fn test_saturday_to_monday_does_not_wrap() {
        assert_eq!(format_days_of_week(&[6, 0, 1]), "Sun, Mon, Sat");
    }

    #[test]
    fn test_disabled_auto_close_renders_off_and_hides_timeline() {
        let template = ScheduleTemplate::default();
        let summary = ScheduleSummary::from(&template);
        assert_eq!(summary.auto_close, "Auto-Close: Off");
        assert!(summary.auto_close_timeline.is_none());
    }

    #[test]
    fn test_enabled_auto_close_summary() {
        let template = ScheduleTemplate {
            auto_close_enabled: true,
            auto_close_first_reminder: 15,
            auto_close_window_minutes: 45,
            ..ScheduleTemplate::default()
        };
        let summary = ScheduleSummary::from(&template);
        assert_eq!(summary.auto_close, "Auto-Close: 45 min (reminder at 15 min)");
        assert_eq!(summary.hours, "08:00 - 17:00");
        assert_eq!(summary.shift_minutes, 540);
        assert_eq!(summary.days, "Mon-Fri");
        let timeline = summary.auto_close_timeline.unwrap();
        assert_eq!(timeline.reminder.time.to_string(), "17:15");
        assert_eq!(timeline.auto_close.time.to_string(), "17:45");
    }

    #[test]
    fn test_validate_rejects_reminder_after_close() {
        let template = ScheduleTemplate {
            auto_close_enabled: true,
            auto_close_first_reminder: 90,
            auto_close_window_minutes: 60,
            ..ScheduleTemplate::default()
        };
        assert_eq!(
            template.validate(),
            Err(ScheduleError::ReminderNotBeforeClose { reminder: 90, window: 60 })
        );
    }

    #[test]
    fn test_validate_ignores_auto_close_fields_when_disabled() {
        let template = ScheduleTemplate {
            auto_close_enabled: false,
            auto_close_first_reminder: 90,
            auto_close_window_minutes: 60,
            ..ScheduleTemplate::default()
        };
        assert!(template.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_days_and_overnight() {
        let dup = ScheduleTemplate { days_of_week: vec![1, 1], ..ScheduleTemplate::default() };
        assert_eq!(dup.validate(), Err(ScheduleError::DuplicateDay(1)));

        let out_of_range = ScheduleTemplate { days_of_week: vec![7], ..ScheduleTemplate::default() };
        assert_eq!(out_of_range.validate(), Err(ScheduleError::InvalidDay(7)));

        let overnight = ScheduleTemplate {
            shift_start_time: t("22:00"),
            shift_end_time: t("06:00"),
            ..ScheduleTemplate::default()
        };
        assert!(matches!(overnight.validate(), Err(ScheduleError::ShiftEndNotAfterStart { .. })));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let template: ScheduleTemplate = serde_json::from_value(serde_json::json!({
            "shift_start_time": "09:00",
            "shift_end_time": "18:00:00",
            "days_of_week": []
        }))
        .unwrap();
        assert_eq!(template.shift_end_time.to_string(), "18:00");
        assert_eq!(template.required_break_minutes, 30);
        assert_eq!(template.auto_close_second_reminder, Some(60));
        assert_eq!(ScheduleSummary::from(&template).days, "No days");
    }
}
