use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

use super::schedule::ScheduleTemplate;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PunchError {
    #[error("Cannot {kind} while {state}")]
    InvalidTransition { state: PunchState, kind: PunchKind },

    #[error("Clock-in is {minutes_early} min before shift start; at most {allowed} min early is allowed")]
    TooEarly { minutes_early: u32, allowed: u32 },

    #[error("Time entry is out of order: {0}")]
    OutOfOrder(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PunchKind {
    ClockIn,
    BreakStart,
    BreakEnd,
    ClockOut,
}

impl PunchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunchKind::ClockIn => "clock_in",
            PunchKind::BreakStart => "break_start",
            PunchKind::BreakEnd => "break_end",
            PunchKind::ClockOut => "clock_out",
        }
    }
}

impl std::fmt::Display for PunchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str().replace('_', " "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PunchState {
    Off,
    OnShift,
    OnBreak,
}

impl std::fmt::Display for PunchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PunchState::Off => "off the clock",
            PunchState::OnShift => "on shift",
            PunchState::OnBreak => "on break",
        })
    }
}

/// Punch timestamps of a single entry, as stored in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryTimes {
    pub clock_in: Option<DateTime<Utc>>,
    pub break_start: Option<DateTime<Utc>>,
    pub break_end: Option<DateTime<Utc>>,
    pub clock_out: Option<DateTime<Utc>>,
}

impl EntryTimes {
    pub fn state(&self) -> PunchState {
        match (self.clock_in, self.clock_out, self.break_start, self.break_end) {
            (Some(_), None, Some(_), None) => PunchState::OnBreak,
            (Some(_), None, _, _) => PunchState::OnShift,
            _ => PunchState::Off,
        }
    }

    /// Checks clock_in <= break_start <= break_end <= clock_out over the
    /// fields that are present.
    pub fn validate_order(&self) -> Result<(), PunchError> {
        let clock_in = self.clock_in.ok_or(PunchError::OutOfOrder("clock_in is required"))?;

        if self.break_end.is_some() && self.break_start.is_none() {
            return Err(PunchError::OutOfOrder("break_end without break_start"));
        }

        let mut last = clock_in;
        for (value, label) in [
            (self.break_start, "break_start precedes the previous punch"),
            (self.break_end, "break_end precedes the previous punch"),
            (self.clock_out, "clock_out precedes the previous punch"),
        ] {
            if let Some(value) = value {
                if value < last {
                    return Err(PunchError::OutOfOrder(label));
                }
                last = value;
            }
        }

        if self.clock_out.is_some() && self.break_start.is_some() && self.break_end.is_none() {
            return Err(PunchError::OutOfOrder("break must end before clock_out"));
        }

        Ok(())
    }

    pub fn break_minutes(&self) -> i64 {
        match (self.break_start, self.break_end) {
            (Some(start), Some(end)) => (end - start).num_minutes().max(0),
            _ => 0,
        }
    }

    pub fn total_minutes(&self) -> Option<i64> {
        match (self.clock_in, self.clock_out) {
            (Some(start), Some(end)) => Some((end - start).num_minutes().max(0)),
            _ => None,
        }
    }
}

/// One break per entry; a clock-out during a break is rejected.
pub fn next_state(state: PunchState, kind: PunchKind) -> Result<PunchState, PunchError> {
    match (state, kind) {
        (PunchState::Off, PunchKind::ClockIn) => Ok(PunchState::OnShift),
        (PunchState::OnShift, PunchKind::BreakStart) => Ok(PunchState::OnBreak),
        (PunchState::OnBreak, PunchKind::BreakEnd) => Ok(PunchState::OnShift),
        (PunchState::OnShift, PunchKind::ClockOut) => Ok(PunchState::Off),
        (state, kind) => Err(PunchError::InvalidTransition { state, kind }),
    }
}

/// Applies a punch at `at` to the entry, returning the updated times.
pub fn apply_punch(times: EntryTimes, kind: PunchKind, at: DateTime<Utc>) -> Result<EntryTimes, PunchError> {
    let state = times.state();
    next_state(state, kind)?;

    let mut updated = times;
    match kind {
        PunchKind::ClockIn => {
            updated = EntryTimes { clock_in: Some(at), ..EntryTimes::default() };
        }
        PunchKind::BreakStart => {
            if times.break_start.is_some() {
                return Err(PunchError::InvalidTransition { state, kind });
            }
            updated.break_start = Some(at);
        }
        PunchKind::BreakEnd => updated.break_end = Some(at),
        PunchKind::ClockOut => updated.clock_out = Some(at),
    }

    updated.validate_order()?;
    Ok(updated)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PunchWindowCheck {
    OnTime,
    Unscheduled,
    Late { minutes_late: u32 },
}

/// Early-punch and late-grace rules for a clock-in at local wall time.
/// Absent tolerances impose no restriction; unscheduled days are accepted.
pub fn check_punch_window(
    template: &ScheduleTemplate,
    clock_in_local: NaiveDateTime,
) -> Result<PunchWindowCheck, PunchError> {
    if !template.works_on(clock_in_local.weekday().num_days_from_sunday()) {
        return Ok(PunchWindowCheck::Unscheduled);
    }

    let start = clock_in_local.date().and_time(template.shift_start_time.as_naive());
    let offset = (clock_in_local - start).num_minutes();

    if offset < 0 {
        let minutes_early = offset.unsigned_abs() as u32;
        if let Some(allowed) = template.early_punch_allowed_minutes {
            if minutes_early > allowed {
                return Err(PunchError::TooEarly { minutes_early, allowed });
            }
        }
        return Ok(PunchWindowCheck::OnTime);
    }

    match template.late_punch_grace_minutes {
        Some(grace) if offset > i64::from(grace) => Ok(PunchWindowCheck::Late { minutes_late: offset as u32 }),
        _ => Ok(PunchWindowCheck::OnTime),
    }
}

/// Row fed into the timecard rollup.
#[derive(Debug, Clone)]
pub struct TimecardInput {
    pub employee_id: Uuid,
    pub employee_name: String,
    pub times: EntryTimes,
    pub auto_closed: bool,
    pub is_late: bool,
    pub break_is_paid: bool,
    pub required_break_minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TimecardSummary {
    pub employee_id: Uuid,
    pub employee_name: String,
    pub entries: u32,
    pub open_entries: u32,
    pub total_minutes: i64,
    pub break_minutes: i64,
    pub paid_minutes: i64,
    pub auto_closed_entries: u32,
    pub late_entries: u32,
    pub break_shortfalls: u32,
}

/// Per-employee totals, ordered by employee name. Open entries are counted
/// but contribute no minutes.
pub fn summarize(inputs: impl IntoIterator<Item = TimecardInput>) -> Vec<TimecardSummary> {
    let mut by_employee: BTreeMap<(String, Uuid), TimecardSummary> = BTreeMap::new();

    for input in inputs {
        let summary = by_employee
            .entry((input.employee_name.clone(), input.employee_id))
            .or_insert_with(|| TimecardSummary {
                employee_id: input.employee_id,
                employee_name: input.employee_name.clone(),
                ..TimecardSummary::default()
            });

        summary.entries += 1;
        if input.auto_closed {
            summary.auto_closed_entries += 1;
        }
        if input.is_late {
            summary.late_entries += 1;
        }

        let Some(total) = input.times.total_minutes() else {
            summary.open_entries += 1;
            continue;
        };

        let break_minutes = input.times.break_minutes();
        summary.total_minutes += total;
        summary.break_minutes += break_minutes;
        summary.paid_minutes += if input.break_is_paid { total } else { total - break_minutes };

        if input.required_break_minutes > 0 && break_minutes < i64::from(input.required_break_minutes) {
            summary.break_shortfalls += 1;
        }
    }

    by_employee.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schedule::ShiftTime;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, h, m, 0).unwrap()
    }

    fn local(day: u32, h: u32, m: u32) -> NaiveDateTime {
        // 2026-01-05 is a Monday.
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn template() -> ScheduleTemplate {
        ScheduleTemplate {
            shift_start_time: ShiftTime::parse("08:00").unwrap(),
            shift_end_time: ShiftTime::parse("17:00").unwrap(),
            days_of_week: vec![1, 2, 3, 4, 5],
            early_punch_allowed_minutes: Some(15),
            late_punch_grace_minutes: Some(5),
            ..ScheduleTemplate::default()
        }
    }

    #[test]
    fn test_full_day_of_punches() {
        let times = apply_punch(EntryTimes::default(), PunchKind::ClockIn, at(8, 0)).unwrap();
        assert_eq!(times.state(), PunchState::OnShift);
        let times = apply_punch(times, PunchKind::BreakStart, at(12, 0)).unwrap();
        assert_eq!(times.state(), PunchState::OnBreak);
        let times = apply_punch(times, PunchKind::BreakEnd, at(12, 30)).unwrap();
        assert_eq!(times.state(), PunchState::OnShift);
        let times = apply_punch(times, PunchKind::ClockOut, at(17, 0)).unwrap();
        assert_eq!(times.state(), PunchState::Off);
        assert_eq!(times.total_minutes(), Some(540));
        assert_eq!(times.break_minutes(), 30);
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(matches!(
            next_state(PunchState::Off, PunchKind::ClockOut),
            Err(PunchError::InvalidTransition { .. })
        ));
        assert!(next_state(PunchState::OnBreak, PunchKind::ClockOut).is_err());
        assert!(next_state(PunchState::OnShift, PunchKind::ClockIn).is_err());
    }

    #[test]
    fn test_second_break_rejected() {
        let times = EntryTimes {
            clock_in: Some(at(8, 0)),
            break_start: Some(at(12, 0)),
            break_end: Some(at(12, 30)),
            clock_out: None,
        };
        assert!(apply_punch(times, PunchKind::BreakStart, at(15, 0)).is_err());
    }

    #[test]
    fn test_validate_order() {
        let times = EntryTimes {
            clock_in: Some(at(8, 0)),
            break_start: Some(at(7, 0)),
            ..EntryTimes::default()
        };
        assert!(times.validate_order().is_err());

        let times = EntryTimes {
            clock_in: Some(at(8, 0)),
            break_end: Some(at(9, 0)),
            ..EntryTimes::default()
        };
        assert_eq!(
            times.validate_order(),
            Err(PunchError::OutOfOrder("break_end without break_start"))
        );
    }

    #[test]
    fn test_punch_window_early_and_late() {
        let template = template();
        assert_eq!(check_punch_window(&template, local(5, 7, 50)), Ok(PunchWindowCheck::OnTime));
        assert_eq!(
            check_punch_window(&template, local(5, 7, 30)),
            Err(PunchError::TooEarly { minutes_early: 30, allowed: 15 })
        );
        assert_eq!(check_punch_window(&template, local(5, 8, 5)), Ok(PunchWindowCheck::OnTime));
        assert_eq!(
            check_punch_window(&template, local(5, 8, 20)),
            Ok(PunchWindowCheck::Late { minutes_late: 20 })
        );
    }

    #[test]
    fn test_punch_window_absent_tolerances() {
        let template = ScheduleTemplate {
            early_punch_allowed_minutes: None,
            late_punch_grace_minutes: None,
            ..template()
        };
        assert_eq!(check_punch_window(&template, local(5, 5, 0)), Ok(PunchWindowCheck::OnTime));
        assert_eq!(check_punch_window(&template, local(5, 11, 0)), Ok(PunchWindowCheck::OnTime));
    }

    #[test]
    fn test_punch_window_unscheduled_day() {
        // 2026-01-10 is a Saturday.
        assert_eq!(check_punch_window(&template(), local(10, 6, 0)), Ok(PunchWindowCheck::Unscheduled));
    }

    #[test]
    fn test_summarize_paid_and_unpaid_breaks() {
        let employee_id = Uuid::new_v4();
        let closed = |paid: bool, break_len: i64| TimecardInput {
            employee_id,
            employee_name: "Ana".to_string(),
            times: EntryTimes {
                clock_in: Some(at(8, 0)),
                break_start: Some(at(12, 0)),
                break_end: Some(at(12, 0) + Duration::minutes(break_len)),
                clock_out: Some(at(16, 0)),
            },
            auto_closed: false,
            is_late: false,
            break_is_paid: paid,
            required_break_minutes: 30,
        };

        let open = TimecardInput {
            times: EntryTimes { clock_in: Some(at(8, 0)), ..EntryTimes::default() },
            auto_closed: true,
            ..closed(false, 0)
        };

        let summaries = summarize(vec![closed(false, 30), closed(true, 20), open]);
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.entries, 3);
        assert_eq!(s.open_entries, 1);
        assert_eq!(s.total_minutes, 960);
        assert_eq!(s.break_minutes, 50);
        assert_eq!(s.paid_minutes, 450 + 480);
        assert_eq!(s.break_shortfalls, 1);
        assert_eq!(s.auto_closed_entries, 1);
    }
}
