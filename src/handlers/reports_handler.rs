use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::{
    domain::{punch::TimecardInput, punch::summarize, EntryTimes, TimecardSummary},
    extractors::{permissions, AuthenticatedUser, Permission},
    handlers::time_entries_handler::{dealership_timezone, local_day_bounds},
    models::TimecardRow,
    AppError, AppResult, AppState,
};

const MAX_REPORT_DAYS: i64 = 93;

/// Both ends are included, so Jan 1 to Jan 1 is one day.
fn check_report_range(from: NaiveDate, to: NaiveDate) -> AppResult<()> {
    if (to - from).num_days() + 1 > MAX_REPORT_DAYS {
        return Err(AppError::BadRequest(format!(
            "Date range may span at most {} days",
            MAX_REPORT_DAYS
        )));
    }
    Ok(())
}

impl From<TimecardRow> for TimecardInput {
    fn from(row: TimecardRow) -> Self {
        TimecardInput {
            employee_id: row.employee_id,
            employee_name: row.employee_name,
            times: EntryTimes {
                clock_in: Some(row.clock_in),
                break_start: row.break_start,
                break_end: row.break_end,
                clock_out: row.clock_out,
            },
            auto_closed: row.auto_closed,
            is_late: row.is_late,
            break_is_paid: row.break_is_paid.unwrap_or(false),
            required_break_minutes: row.required_break_minutes.map_or(0, |m| m.max(0) as u32),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TimecardReportQuery {
    #[serde(rename = "dealershipId")]
    pub dealership_id: i32,
    /// First local day, YYYY-MM-DD
    pub from: NaiveDate,
    /// Last local day, inclusive
    pub to: NaiveDate,
}

/// GET /api/reports/timecards?dealershipId=&from=&to=
#[utoipa::path(
    get,
    path = "/api/reports/timecards",
    params(TimecardReportQuery),
    responses(
        (status = 200, description = "Per-employee totals for the range", body = Vec<TimecardSummary>),
        (status = 400, description = "Invalid or too long date range"),
        (status = 403, description = "Missing can_view_reports permission")
    ),
    tag = "reports",
    security(("cookie_auth" = []))
)]
pub async fn get_timecard_report(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Query(query): Query<TimecardReportQuery>,
) -> AppResult<Json<Vec<TimecardSummary>>> {
    check_report_range(query.from, query.to)?;
    permissions::require_permission(&state.db, &auth, query.dealership_id, Permission::ViewReports).await?;

    let tz = dealership_timezone(&state.db, query.dealership_id, state.config.default_timezone).await?;
    let (start, end) = local_day_bounds(query.from, query.to, tz)?;

    // Break policy comes from the template of the assignment the entry was punched under
    let rows = sqlx::query_as::<_, TimecardRow>(
        r#"
        SELECT
            t.employee_id,
            e.first_name || ' ' || e.last_name AS employee_name,
            t.clock_in,
            t.break_start,
            t.break_end,
            t.clock_out,
            t.is_late,
            (t.auto_closed_at IS NOT NULL) AS auto_closed,
            (a.schedule_template ->> 'break_is_paid')::boolean AS break_is_paid,
            (a.schedule_template ->> 'required_break_minutes')::int AS required_break_minutes
        FROM "TimeEntries" t
        JOIN "Employees" e ON e.id = t.employee_id
        LEFT JOIN "EmployeeAssignments" a ON a.id = t.assignment_id
        WHERE t.dealership_id = $1 AND t.clock_in >= $2 AND t.clock_in < $3
        "#,
    )
    .bind(query.dealership_id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    tracing::debug!(dealership_id = query.dealership_id, entries = rows.len(), "Timecard report rows loaded");

    Ok(Json(summarize(rows.into_iter().map(TimecardInput::from))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn test_row_defaults_when_template_missing() {
        let row = TimecardRow {
            employee_id: Uuid::new_v4(),
            employee_name: "Ana Lima".to_string(),
            clock_in: Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap(),
            break_start: None,
            break_end: None,
            clock_out: Some(Utc.with_ymd_and_hms(2026, 2, 2, 20, 0, 0).unwrap()),
            is_late: false,
            auto_closed: true,
            break_is_paid: None,
            required_break_minutes: Some(-5),
        };
        let input = TimecardInput::from(row);
        assert!(!input.break_is_paid);
        assert_eq!(input.required_break_minutes, 0);

        let summary = summarize([input]);
        assert_eq!(summary[0].total_minutes, 480);
        assert_eq!(summary[0].auto_closed_entries, 1);
    }

    #[test]
    fn test_report_range_counts_both_ends() {
        let from = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(check_report_range(from, from).is_ok());
        // Jan 1 through Apr 3 is 93 days
        assert!(check_report_range(from, NaiveDate::from_ymd_opt(2026, 4, 3).unwrap()).is_ok());
        assert!(matches!(
            check_report_range(from, NaiveDate::from_ymd_opt(2026, 4, 4).unwrap()),
            Err(AppError::BadRequest(_))
        ));
    }
}
