use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::{
    domain::{employee, face, PunchState},
    extractors::KioskDevice,
    handlers::time_entries_handler::{dealership_timezone, record_punch, PunchRequest},
    models::{Assignment, Employee, Kiosk, KioskPunchInput, KioskPunchResponse, KioskStatusResponse, TimeEntry},
    AppError, AppResult, AppState,
};

/// Active employee with a PIN at the kiosk's dealership, plus the active assignment there.
async fn identify(db: &sqlx::PgPool, kiosk: &Kiosk, pin: &str) -> AppResult<(Employee, Assignment)> {
    if !employee::is_valid_pin(pin) {
        return Err(AppError::Validation("PIN must be 4 to 6 digits".to_string()));
    }

    let employee = sqlx::query_as::<_, Employee>(
        r#"
        SELECT * FROM "Employees"
        WHERE dealership_id = $1 AND pin = $2 AND status = 'active'
        "#,
    )
    .bind(kiosk.dealership_id)
    .bind(pin)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| {
        tracing::info!(kiosk_id = %kiosk.id, "Unknown PIN at kiosk");
        AppError::Unauthorized("Invalid PIN".to_string())
    })?;

    let assignment = sqlx::query_as::<_, Assignment>(
        r#"
        SELECT * FROM "EmployeeAssignments"
        WHERE employee_id = $1 AND dealership_id = $2 AND status = 'active'
        ORDER BY started_at DESC
        LIMIT 1
        "#,
    )
    .bind(employee.id)
    .bind(kiosk.dealership_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::Forbidden(format!("{} has no active assignment here", employee.full_name())))?;

    Ok((employee, assignment))
}

pub fn face_required(kiosk: &Kiosk, assignment: &Assignment) -> bool {
    kiosk.face_recognition_enabled && assignment.schedule_template.require_face_validation
}

/// Returns whether the face was verified. Skipped (false) when the kiosk or
/// the schedule does not require it.
pub fn verify_face(required: bool, enrolled: Option<&[f32]>, probe: Option<&[f32]>) -> AppResult<bool> {
    if !required {
        return Ok(false);
    }

    let enrolled = enrolled.ok_or_else(|| {
        AppError::Validation("Face validation is required but the employee is not enrolled".to_string())
    })?;
    let probe = probe.ok_or_else(|| AppError::Validation("Face descriptor is required".to_string()))?;
    face::validate_descriptor(probe)?;

    if face::is_match(enrolled, probe) {
        Ok(true)
    } else {
        Err(AppError::Unauthorized("Face does not match the enrolled employee".to_string()))
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct KioskStatusQuery {
    pub pin: String,
}

/// GET /api/kiosk/status?pin= - Current punch state for the employee
#[utoipa::path(
    get,
    path = "/api/kiosk/status",
    params(KioskStatusQuery),
    responses(
        (status = 200, description = "Punch state", body = KioskStatusResponse),
        (status = 401, description = "Invalid PIN or kiosk token")
    ),
    tag = "kiosk",
    security(("kiosk_token" = []))
)]
pub async fn get_kiosk_status(
    State(state): State<Arc<AppState>>,
    device: KioskDevice,
    Query(query): Query<KioskStatusQuery>,
) -> AppResult<Json<KioskStatusResponse>> {
    let (employee, assignment) = identify(&state.db, &device.kiosk, &query.pin).await?;

    let open = sqlx::query_as::<_, TimeEntry>(
        r#"
        SELECT * FROM "TimeEntries"
        WHERE employee_id = $1 AND clock_out IS NULL
        ORDER BY clock_in DESC
        LIMIT 1
        "#,
    )
    .bind(employee.id)
    .fetch_optional(&state.db)
    .await?;

    Ok(Json(KioskStatusResponse {
        employee_name: employee.full_name(),
        state: open.as_ref().map(|e| e.times().state()).unwrap_or(PunchState::Off),
        open_entry_id: open.map(|e| e.id),
        face_required: face_required(&device.kiosk, &assignment),
    }))
}

/// POST /api/kiosk/punch - Clock in/out or take a break
#[utoipa::path(
    post,
    path = "/api/kiosk/punch",
    request_body = KioskPunchInput,
    responses(
        (status = 200, description = "Punch recorded", body = KioskPunchResponse),
        (status = 401, description = "Invalid PIN, face mismatch or kiosk token"),
        (status = 409, description = "Punch not allowed in the current state"),
        (status = 422, description = "Too early, or face enrollment missing")
    ),
    tag = "kiosk",
    security(("kiosk_token" = []))
)]
pub async fn kiosk_punch(
    State(state): State<Arc<AppState>>,
    device: KioskDevice,
    Json(input): Json<KioskPunchInput>,
) -> AppResult<Json<KioskPunchResponse>> {
    let kiosk = &device.kiosk;
    let (employee, assignment) = identify(&state.db, kiosk, &input.pin).await?;

    let face_verified = verify_face(
        face_required(kiosk, &assignment),
        employee.face_descriptor.as_deref(),
        input.face_descriptor.as_deref(),
    )?;

    let tz = dealership_timezone(&state.db, kiosk.dealership_id, state.config.default_timezone).await?;
    let now = Utc::now();

    let mut tx = state.db.begin().await?;
    let recorded = record_punch(
        &mut *tx,
        PunchRequest {
            employee_id: employee.id,
            assignment_id: assignment.id,
            dealership_id: kiosk.dealership_id,
            template: &assignment.schedule_template,
            kiosk_id: Some(kiosk.id),
            face_verified,
            kind: input.action,
            at: now,
            tz,
        },
    )
    .await?;
    tx.commit().await?;

    let state_after = recorded.entry.times().state();
    tracing::info!(
        kiosk_id = %kiosk.id,
        employee_id = %employee.id,
        entry_id = %recorded.entry.id,
        action = input.action.as_str(),
        face_verified,
        "Kiosk punch recorded"
    );

    Ok(Json(KioskPunchResponse {
        success: true,
        employee_name: employee.full_name(),
        action: input.action,
        state: state_after,
        entry_id: recorded.entry.id,
        punched_at: now,
        window: recorded.window,
        face_verified,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(value: f32) -> Vec<f32> {
        vec![value; face::DESCRIPTOR_LEN]
    }

    #[test]
    fn test_face_not_required_skips_check() {
        assert!(!verify_face(false, None, None).unwrap());
    }

    #[test]
    fn test_face_required_but_not_enrolled() {
        let probe = descriptor(0.1);
        assert!(matches!(
            verify_face(true, None, Some(&probe)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_face_required_without_probe() {
        let enrolled = descriptor(0.1);
        assert!(matches!(
            verify_face(true, Some(&enrolled), None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_face_match_and_mismatch() {
        let enrolled = descriptor(0.10);
        // Distance sqrt(128 * 0.01^2) ~= 0.113
        let close = descriptor(0.11);
        assert!(verify_face(true, Some(&enrolled), Some(&close)).unwrap());

        // Distance sqrt(128 * 0.1^2) ~= 1.13
        let far = descriptor(0.20);
        assert!(matches!(
            verify_face(true, Some(&enrolled), Some(&far)),
            Err(AppError::Unauthorized(_))
        ));
    }
}
