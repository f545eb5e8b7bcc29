use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    config,
    domain::{auto_close::resolve_local, punch, EntryTimes, PunchKind, PunchWindowCheck, ScheduleTemplate},
    extractors::{permissions, AuthenticatedUser, Permission},
    handlers::audit_handler::{insert_audit, AuditRecord},
    models::{AdjustTimeEntryInput, AuditAction, TimeEntry, TimeEntryMutationResponse, TimeEntryWithEmployee},
    AppError, AppResult, AppState,
};

/// Dealership timezone, falling back to the configured default when the
/// column is empty or unparseable.
pub async fn dealership_timezone(db: &sqlx::PgPool, dealership_id: i32, fallback: Tz) -> AppResult<Tz> {
    let name = sqlx::query_scalar::<_, Option<String>>(r#"SELECT timezone FROM "Dealerships" WHERE id = $1"#)
        .bind(dealership_id)
        .fetch_optional(db)
        .await?
        .flatten();

    Ok(timezone_or(name.as_deref(), fallback))
}

pub fn timezone_or(name: Option<&str>, fallback: Tz) -> Tz {
    match name {
        Some(name) => config::parse_timezone(name).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default timezone");
            fallback
        }),
        None => fallback,
    }
}

/// UTC bounds covering local days `from` through `to`, inclusive.
pub fn local_day_bounds(from: NaiveDate, to: NaiveDate, tz: Tz) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    if to < from {
        return Err(AppError::BadRequest("`to` must not be before `from`".to_string()));
    }
    let start = resolve_local(from.and_time(chrono::NaiveTime::MIN), tz);
    let end = resolve_local((to + Duration::days(1)).and_time(chrono::NaiveTime::MIN), tz);
    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(AppError::BadRequest("Date range cannot be resolved in the dealership timezone".to_string())),
    }
}

/// Result of one punch against the ledger.
pub struct RecordedPunch {
    pub entry: TimeEntry,
    pub window: Option<PunchWindowCheck>,
}

/// Context needed to apply a punch for one employee assignment.
pub struct PunchRequest<'a> {
    pub employee_id: Uuid,
    pub assignment_id: Uuid,
    pub dealership_id: i32,
    pub template: &'a ScheduleTemplate,
    pub kiosk_id: Option<Uuid>,
    pub face_verified: bool,
    pub kind: PunchKind,
    pub at: DateTime<Utc>,
    pub tz: Tz,
}

/// Advisory lock key serializing punches of one employee.
fn punch_lock_key(employee_id: Uuid) -> String {
    format!("punch:{}", employee_id)
}

/// Applies a punch inside the caller's transaction: locks the employee,
/// runs the state machine and clock-in window, writes the entry and an audit row.
pub async fn record_punch(conn: &mut sqlx::PgConnection, request: PunchRequest<'_>) -> AppResult<RecordedPunch> {
    // Row locks cover nothing while no entry is open, so clock-ins need this
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(punch_lock_key(request.employee_id))
        .execute(&mut *conn)
        .await?;

    let open = sqlx::query_as::<_, TimeEntry>(
        r#"
        SELECT * FROM "TimeEntries"
        WHERE employee_id = $1 AND clock_out IS NULL
        ORDER BY clock_in DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(request.employee_id)
    .fetch_optional(&mut *conn)
    .await?;

    let current = open.as_ref().map(TimeEntry::times).unwrap_or_default();
    let updated = punch::apply_punch(current, request.kind, request.at)?;

    let (entry, window) = match (request.kind, open) {
        (PunchKind::ClockIn, _) => {
            let local = request.at.with_timezone(&request.tz).naive_local();
            let window = punch::check_punch_window(request.template, local)?;
            let is_late = matches!(window, PunchWindowCheck::Late { .. });

            let entry = sqlx::query_as::<_, TimeEntry>(
                r#"
                INSERT INTO "TimeEntries" (
                    id, employee_id, assignment_id, dealership_id, kiosk_id, clock_in,
                    is_late, face_verified, requires_supervisor_review
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, false)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(request.employee_id)
            .bind(request.assignment_id)
            .bind(request.dealership_id)
            .bind(request.kiosk_id)
            .bind(request.at)
            .bind(is_late)
            .bind(request.face_verified)
            .fetch_one(&mut *conn)
            .await?;

            (entry, Some(window))
        }
        (_, Some(open)) => {
            let entry = sqlx::query_as::<_, TimeEntry>(
                r#"
                UPDATE "TimeEntries"
                SET break_start = $1, break_end = $2, clock_out = $3
                WHERE id = $4
                RETURNING *
                "#,
            )
            .bind(updated.break_start)
            .bind(updated.break_end)
            .bind(updated.clock_out)
            .bind(open.id)
            .fetch_one(&mut *conn)
            .await?;

            (entry, None)
        }
        // apply_punch only allows non-clock-in punches against an open entry
        (kind, None) => {
            return Err(AppError::Conflict(format!("Cannot {} without an open time entry", kind)));
        }
    };

    insert_audit(
        &mut *conn,
        AuditRecord {
            entry_id: Some(entry.id),
            employee_id: request.employee_id,
            dealership_id: request.dealership_id,
            action: AuditAction::from(request.kind),
            actor: None,
            old: None,
            new: Some(serde_json::json!({
                "at": request.at,
                "kiosk_id": request.kiosk_id,
                "face_verified": request.face_verified,
            })),
        },
    )
    .await?;

    Ok(RecordedPunch { entry, window })
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GetTimeEntriesQuery {
    #[serde(rename = "dealershipId")]
    pub dealership_id: i32,
    #[serde(rename = "employeeId")]
    pub employee_id: Option<Uuid>,
    /// First local day, YYYY-MM-DD
    pub from: Option<NaiveDate>,
    /// Last local day, inclusive
    pub to: Option<NaiveDate>,
}

/// GET /api/time-entries?dealershipId=&employeeId=&from=&to=
#[utoipa::path(
    get,
    path = "/api/time-entries",
    params(GetTimeEntriesQuery),
    responses(
        (status = 200, description = "Time entries, newest first", body = Vec<TimeEntryWithEmployee>),
        (status = 403, description = "Missing can_review_timecards permission")
    ),
    tag = "time-entries",
    security(("cookie_auth" = []))
)]
pub async fn get_time_entries(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Query(query): Query<GetTimeEntriesQuery>,
) -> AppResult<Json<Vec<TimeEntryWithEmployee>>> {
    permissions::require_permission(&state.db, &auth, query.dealership_id, Permission::ReviewTimecards).await?;

    let (start, end) = match (query.from, query.to) {
        (Some(from), Some(to)) => {
            let tz = dealership_timezone(&state.db, query.dealership_id, state.config.default_timezone).await?;
            let (start, end) = local_day_bounds(from, to, tz)?;
            (Some(start), Some(end))
        }
        (None, None) => (None, None),
        _ => return Err(AppError::BadRequest("`from` and `to` must be given together".to_string())),
    };

    let entries = sqlx::query_as::<_, TimeEntryWithEmployee>(
        r#"
        SELECT t.*, e.first_name || ' ' || e.last_name AS employee_name, e.employee_number
        FROM "TimeEntries" t
        JOIN "Employees" e ON e.id = t.employee_id
        WHERE t.dealership_id = $1
          AND ($2::uuid IS NULL OR t.employee_id = $2)
          AND ($3::timestamptz IS NULL OR t.clock_in >= $3)
          AND ($4::timestamptz IS NULL OR t.clock_in < $4)
        ORDER BY t.clock_in DESC
        LIMIT 500
        "#,
    )
    .bind(query.dealership_id)
    .bind(query.employee_id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(entries))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PendingReviewQuery {
    #[serde(rename = "dealershipId")]
    pub dealership_id: i32,
}

/// GET /api/time-entries/pending-review?dealershipId=
#[utoipa::path(
    get,
    path = "/api/time-entries/pending-review",
    params(PendingReviewQuery),
    responses(
        (status = 200, description = "Entries flagged for supervisor review, oldest first", body = Vec<TimeEntryWithEmployee>),
        (status = 403, description = "Missing can_review_timecards permission")
    ),
    tag = "time-entries",
    security(("cookie_auth" = []))
)]
pub async fn get_pending_review(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Query(query): Query<PendingReviewQuery>,
) -> AppResult<Json<Vec<TimeEntryWithEmployee>>> {
    permissions::require_permission(&state.db, &auth, query.dealership_id, Permission::ReviewTimecards).await?;

    let entries = sqlx::query_as::<_, TimeEntryWithEmployee>(
        r#"
        SELECT t.*, e.first_name || ' ' || e.last_name AS employee_name, e.employee_number
        FROM "TimeEntries" t
        JOIN "Employees" e ON e.id = t.employee_id
        WHERE t.dealership_id = $1 AND t.requires_supervisor_review = true
        ORDER BY t.clock_in ASC
        "#,
    )
    .bind(query.dealership_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(entries))
}

async fn lock_entry(conn: &mut sqlx::PgConnection, entry_id: Uuid) -> AppResult<TimeEntry> {
    sqlx::query_as::<_, TimeEntry>(r#"SELECT * FROM "TimeEntries" WHERE id = $1 FOR UPDATE"#)
        .bind(entry_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Time entry {} not found", entry_id)))
}

/// POST /api/time-entries/{id}/approve - Accept a flagged entry as recorded
#[utoipa::path(
    post,
    path = "/api/time-entries/{id}/approve",
    params(("id" = Uuid, Path, description = "Time entry ID")),
    responses(
        (status = 200, description = "Entry approved", body = TimeEntryMutationResponse),
        (status = 404, description = "Time entry not found"),
        (status = 409, description = "Entry is not awaiting review")
    ),
    tag = "time-entries",
    security(("cookie_auth" = []))
)]
pub async fn approve_time_entry(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
    auth: AuthenticatedUser,
) -> AppResult<Json<TimeEntryMutationResponse>> {
    let mut tx = state.db.begin().await?;
    let existing = lock_entry(&mut *tx, entry_id).await?;

    permissions::require_permission(&state.db, &auth, existing.dealership_id, Permission::ReviewTimecards).await?;

    if !existing.requires_supervisor_review {
        return Err(AppError::Conflict("Time entry is not awaiting review".to_string()));
    }

    let entry = sqlx::query_as::<_, TimeEntry>(
        r#"
        UPDATE "TimeEntries"
        SET requires_supervisor_review = false, reviewed_by = $1, reviewed_at = now()
        WHERE id = $2
        RETURNING *
        "#,
    )
    .bind(auth.profile_id)
    .bind(entry_id)
    .fetch_one(&mut *tx)
    .await?;

    insert_audit(
        &mut *tx,
        AuditRecord {
            entry_id: Some(entry_id),
            employee_id: entry.employee_id,
            dealership_id: entry.dealership_id,
            action: AuditAction::ReviewApproved,
            actor: Some(auth.profile_id),
            old: None,
            new: None,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(%entry_id, reviewer = %auth.profile_id, "Time entry approved");
    Ok(Json(TimeEntryMutationResponse {
        success: true,
        entry,
        message: Some("Time entry approved".to_string()),
    }))
}

/// Merges a supervisor edit over the stored entry. Absent fields keep their value.
pub fn merge_adjustment(existing: &TimeEntry, input: &AdjustTimeEntryInput) -> Result<EntryTimes, punch::PunchError> {
    let merged = EntryTimes {
        clock_in: input.clock_in.or(Some(existing.clock_in)),
        break_start: input.break_start.or(existing.break_start),
        break_end: input.break_end.or(existing.break_end),
        clock_out: input.clock_out.or(existing.clock_out),
    };
    merged.validate_order()?;
    Ok(merged)
}

/// PUT /api/time-entries/{id} - Supervisor manual edit
#[utoipa::path(
    put,
    path = "/api/time-entries/{id}",
    params(("id" = Uuid, Path, description = "Time entry ID")),
    request_body = AdjustTimeEntryInput,
    responses(
        (status = 200, description = "Entry adjusted and review cleared", body = TimeEntryMutationResponse),
        (status = 404, description = "Time entry not found"),
        (status = 422, description = "Punches out of order")
    ),
    tag = "time-entries",
    security(("cookie_auth" = []))
)]
pub async fn adjust_time_entry(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
    auth: AuthenticatedUser,
    Json(input): Json<AdjustTimeEntryInput>,
) -> AppResult<Json<TimeEntryMutationResponse>> {
    let mut tx = state.db.begin().await?;
    let existing = lock_entry(&mut *tx, entry_id).await?;

    permissions::require_permission(&state.db, &auth, existing.dealership_id, Permission::ReviewTimecards).await?;

    let merged = merge_adjustment(&existing, &input)?;
    let clock_in = merged.clock_in.unwrap_or(existing.clock_in);

    let entry = sqlx::query_as::<_, TimeEntry>(
        r#"
        UPDATE "TimeEntries"
        SET clock_in = $1,
            break_start = $2,
            break_end = $3,
            clock_out = $4,
            notes = COALESCE($5, notes),
            requires_supervisor_review = false,
            reviewed_by = $6,
            reviewed_at = now()
        WHERE id = $7
        RETURNING *
        "#,
    )
    .bind(clock_in)
    .bind(merged.break_start)
    .bind(merged.break_end)
    .bind(merged.clock_out)
    .bind(&input.notes)
    .bind(auth.profile_id)
    .bind(entry_id)
    .fetch_one(&mut *tx)
    .await?;

    insert_audit(
        &mut *tx,
        AuditRecord {
            entry_id: Some(entry_id),
            employee_id: entry.employee_id,
            dealership_id: entry.dealership_id,
            action: AuditAction::ReviewAdjusted,
            actor: Some(auth.profile_id),
            old: Some(serde_json::to_value(&existing).map_err(|e| AppError::Internal(e.to_string()))?),
            new: Some(serde_json::to_value(&entry).map_err(|e| AppError::Internal(e.to_string()))?),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(%entry_id, reviewer = %auth.profile_id, "Time entry adjusted");
    Ok(Json(TimeEntryMutationResponse {
        success: true,
        entry,
        message: Some("Time entry adjusted".to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_punch_lock_is_per_employee() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        assert_eq!(punch_lock_key(first), punch_lock_key(first));
        assert_ne!(punch_lock_key(first), punch_lock_key(second));
        // Assignment creation locks on the bare id
        assert_ne!(punch_lock_key(first), first.to_string());
    }

    fn entry() -> TimeEntry {
        TimeEntry {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            assignment_id: Uuid::new_v4(),
            dealership_id: 1,
            kiosk_id: None,
            clock_in: Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap(),
            break_start: None,
            break_end: None,
            clock_out: Some(Utc.with_ymd_and_hms(2026, 3, 2, 23, 0, 0).unwrap()),
            is_late: false,
            face_verified: false,
            notes: None,
            reminder_sent_at: None,
            auto_closed_at: Some(Utc.with_ymd_and_hms(2026, 3, 2, 23, 0, 0).unwrap()),
            requires_supervisor_review: true,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap(),
        }
    }

    fn adjust() -> AdjustTimeEntryInput {
        AdjustTimeEntryInput { clock_in: None, break_start: None, break_end: None, clock_out: None, notes: None }
    }

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let existing = entry();
        let corrected = Utc.with_ymd_and_hms(2026, 3, 2, 21, 30, 0).unwrap();
        let merged = merge_adjustment(&existing, &AdjustTimeEntryInput { clock_out: Some(corrected), ..adjust() }).unwrap();
        assert_eq!(merged.clock_in, Some(existing.clock_in));
        assert_eq!(merged.clock_out, Some(corrected));
    }

    #[test]
    fn test_merge_rejects_out_of_order_edit() {
        let existing = entry();
        let before_clock_in = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let result = merge_adjustment(&existing, &AdjustTimeEntryInput { clock_out: Some(before_clock_in), ..adjust() });
        assert!(result.is_err());
    }

    #[test]
    fn test_local_day_bounds_follow_timezone() {
        let tz: Tz = chrono_tz::America::Chicago;
        let day = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let (start, end) = local_day_bounds(day, day, tz).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 1, 15, 6, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 1, 16, 6, 0, 0).unwrap());
        assert!(local_day_bounds(day, day - Duration::days(1), tz).is_err());
    }

    #[test]
    fn test_timezone_fallback() {
        let fallback = chrono_tz::America::New_York;
        assert_eq!(timezone_or(Some("America/Denver"), fallback), chrono_tz::America::Denver);
        assert_eq!(timezone_or(Some("nowhere"), fallback), fallback);
        assert_eq!(timezone_or(None, fallback), fallback);
    }
}
