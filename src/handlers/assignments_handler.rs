use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use sqlx::types::Json as SqlJson;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    domain::{ScheduleSummary, ScheduleTemplate},
    extractors::{permissions, AuthenticatedUser, Permission},
    models::{
        Assignment, CreateAssignmentInput, SchedulePreviewInput, SchedulePreviewResponse, TerminateAssignmentInput,
        UpdateAssignmentInput,
    },
    notify::{auto_closed_message, reminder_message, MessageContext},
    AppError, AppResult, AppState,
};

async fn fetch_assignment(db: &sqlx::PgPool, assignment_id: Uuid) -> AppResult<Assignment> {
    sqlx::query_as::<_, Assignment>(r#"SELECT * FROM "EmployeeAssignments" WHERE id = $1"#)
        .bind(assignment_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", assignment_id)))
}

/// Employees are assigned only at their own dealership, where kiosks can
/// identify them. Anything else reads as not found.
fn ensure_home_dealership(employee_id: Uuid, home_dealership_id: i32, dealership_id: i32) -> AppResult<()> {
    if home_dealership_id != dealership_id {
        return Err(AppError::NotFound(format!(
            "Employee {} not found at dealership {}",
            employee_id, dealership_id
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GetAssignmentsQuery {
    #[serde(rename = "dealershipId")]
    pub dealership_id: Option<i32>,
    #[serde(rename = "employeeId")]
    pub employee_id: Option<Uuid>,
    #[serde(rename = "includeInactive", default)]
    pub include_inactive: bool,
}

/// GET /api/assignments?dealershipId=&employeeId=&includeInactive=
#[utoipa::path(
    get,
    path = "/api/assignments",
    params(GetAssignmentsQuery),
    responses(
        (status = 200, description = "Assignments, active only unless includeInactive", body = Vec<Assignment>),
        (status = 400, description = "Neither dealershipId nor employeeId given")
    ),
    tag = "assignments",
    security(("cookie_auth" = []))
)]
pub async fn get_assignments(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Query(query): Query<GetAssignmentsQuery>,
) -> AppResult<Json<Vec<Assignment>>> {
    let dealership_id = match (query.dealership_id, query.employee_id) {
        (Some(dealership_id), _) => dealership_id,
        (None, Some(employee_id)) => {
            sqlx::query_scalar::<_, i32>(r#"SELECT dealership_id FROM "Employees" WHERE id = $1"#)
                .bind(employee_id)
                .fetch_optional(&state.db)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Employee {} not found", employee_id)))?
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "dealershipId or employeeId is required".to_string(),
            ))
        }
    };

    permissions::require_member(&state.db, &auth, dealership_id).await?;

    let assignments = sqlx::query_as::<_, Assignment>(
        r#"
        SELECT * FROM "EmployeeAssignments"
        WHERE dealership_id = $1
          AND ($2::uuid IS NULL OR employee_id = $2)
          AND ($3 OR status = 'active')
        ORDER BY started_at DESC
        "#,
    )
    .bind(dealership_id)
    .bind(query.employee_id)
    .bind(query.include_inactive)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(assignments))
}

/// POST /api/assignments - Assign an employee to a dealership with a schedule
#[utoipa::path(
    post,
    path = "/api/assignments",
    request_body = CreateAssignmentInput,
    responses(
        (status = 200, description = "Assignment created", body = Assignment),
        (status = 403, description = "Missing can_manage_schedules permission"),
        (status = 404, description = "Employee not found at this dealership"),
        (status = 409, description = "Employee already has an active assignment here"),
        (status = 422, description = "Invalid schedule template")
    ),
    tag = "assignments",
    security(("cookie_auth" = []))
)]
pub async fn create_assignment(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(input): Json<CreateAssignmentInput>,
) -> AppResult<Json<Assignment>> {
    input.schedule_template.validate()?;

    permissions::require_permission(&state.db, &auth, input.dealership_id, Permission::ManageSchedules).await?;

    let mut tx = state.db.begin().await?;

    let home_dealership_id = sqlx::query_scalar::<_, i32>(
        r#"SELECT dealership_id FROM "Employees" WHERE id = $1 AND status <> 'terminated'"#,
    )
    .bind(input.employee_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Employee {} not found", input.employee_id)))?;

    ensure_home_dealership(input.employee_id, home_dealership_id, input.dealership_id)?;

    // Serializes concurrent creates for the same employee
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(input.employee_id.to_string())
        .execute(&mut *tx)
        .await?;

    let already_active = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM "EmployeeAssignments"
            WHERE employee_id = $1 AND dealership_id = $2 AND status = 'active'
        )
        "#,
    )
    .bind(input.employee_id)
    .bind(input.dealership_id)
    .fetch_one(&mut *tx)
    .await?;

    if already_active {
        return Err(AppError::Conflict(
            "Employee already has an active assignment at this dealership".to_string(),
        ));
    }

    let assignment = sqlx::query_as::<_, Assignment>(
        r#"
        INSERT INTO "EmployeeAssignments" (id, employee_id, dealership_id, status, schedule_template, started_at)
        VALUES ($1, $2, $3, 'active', $4, now())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(input.employee_id)
    .bind(input.dealership_id)
    .bind(SqlJson(&input.schedule_template))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        assignment_id = %assignment.id,
        employee_id = %assignment.employee_id,
        dealership_id = assignment.dealership_id,
        auto_close = input.schedule_template.auto_close_enabled,
        "Assignment created"
    );
    Ok(Json(assignment))
}

/// PUT /api/assignments/{id} - Replace the schedule template
#[utoipa::path(
    put,
    path = "/api/assignments/{id}",
    params(("id" = Uuid, Path, description = "Assignment ID")),
    request_body = UpdateAssignmentInput,
    responses(
        (status = 200, description = "Assignment updated", body = Assignment),
        (status = 404, description = "Assignment not found or no longer active"),
        (status = 422, description = "Invalid schedule template")
    ),
    tag = "assignments",
    security(("cookie_auth" = []))
)]
pub async fn update_assignment(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<Uuid>,
    auth: AuthenticatedUser,
    Json(input): Json<UpdateAssignmentInput>,
) -> AppResult<Json<Assignment>> {
    input.schedule_template.validate()?;

    let existing = fetch_assignment(&state.db, assignment_id).await?;
    permissions::require_permission(&state.db, &auth, existing.dealership_id, Permission::ManageSchedules).await?;

    let updated = sqlx::query_as::<_, Assignment>(
        r#"
        UPDATE "EmployeeAssignments"
        SET schedule_template = $1
        WHERE id = $2 AND status = 'active'
        RETURNING *
        "#,
    )
    .bind(SqlJson(&input.schedule_template))
    .bind(assignment_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Active assignment {} not found", assignment_id)))?;

    tracing::info!(%assignment_id, "Schedule template updated");
    Ok(Json(updated))
}

/// POST /api/assignments/{id}/terminate - Soft-end an assignment
#[utoipa::path(
    post,
    path = "/api/assignments/{id}/terminate",
    params(("id" = Uuid, Path, description = "Assignment ID")),
    request_body = TerminateAssignmentInput,
    responses(
        (status = 200, description = "Assignment ended", body = Assignment),
        (status = 404, description = "Assignment not found or already ended")
    ),
    tag = "assignments",
    security(("cookie_auth" = []))
)]
pub async fn terminate_assignment(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<Uuid>,
    auth: AuthenticatedUser,
    Json(input): Json<TerminateAssignmentInput>,
) -> AppResult<Json<Assignment>> {
    let existing = fetch_assignment(&state.db, assignment_id).await?;
    permissions::require_permission(&state.db, &auth, existing.dealership_id, Permission::ManageSchedules).await?;

    let ended = sqlx::query_as::<_, Assignment>(
        r#"
        UPDATE "EmployeeAssignments"
        SET status = $1, ended_at = now()
        WHERE id = $2 AND status = 'active'
        RETURNING *
        "#,
    )
    .bind(input.status.as_status())
    .bind(assignment_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Active assignment {} not found", assignment_id)))?;

    tracing::info!(%assignment_id, status = input.status.as_status(), "Assignment ended");
    Ok(Json(ended))
}

/// GET /api/assignments/{id}/summary
#[utoipa::path(
    get,
    path = "/api/assignments/{id}/summary",
    params(("id" = Uuid, Path, description = "Assignment ID")),
    responses(
        (status = 200, description = "Rendered schedule", body = ScheduleSummary),
        (status = 404, description = "Assignment not found")
    ),
    tag = "assignments",
    security(("cookie_auth" = []))
)]
pub async fn get_assignment_summary(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<Uuid>,
    auth: AuthenticatedUser,
) -> AppResult<Json<ScheduleSummary>> {
    let assignment = fetch_assignment(&state.db, assignment_id).await?;
    permissions::require_member(&state.db, &auth, assignment.dealership_id).await?;
    Ok(Json(ScheduleSummary::from(&assignment.schedule_template.0)))
}

/// Summary plus sample texts for the form preview. Validation problems come
/// back as warnings so the form can render while the user is still editing.
pub fn build_preview(input: &SchedulePreviewInput) -> SchedulePreviewResponse {
    let template: &ScheduleTemplate = &input.schedule_template;
    let summary = ScheduleSummary::from(template);

    let mut warnings = Vec::new();
    if let Err(e) = template.validate() {
        warnings.push(e.to_string());
    }
    if template.days_of_week.is_empty() {
        warnings.push("No workdays selected".to_string());
    }

    let (reminder, closed) = match &summary.auto_close_timeline {
        Some(timeline) => {
            let language = input.language.unwrap_or_default();
            let ctx = MessageContext {
                first_name: input.employee_first_name.clone().unwrap_or_else(|| "Alex".to_string()),
                dealership_name: input.dealership_name.clone().unwrap_or_else(|| "your dealership".to_string()),
                shift_end: timeline.shift_end.to_string(),
                auto_close_at: timeline.auto_close.time.to_string(),
            };
            if timeline.auto_close.day_offset > 0 {
                warnings.push("Auto-close falls on the day after the shift ends".to_string());
            }
            (
                Some(reminder_message(language, &ctx)),
                Some(auto_closed_message(language, &ctx)),
            )
        }
        None => (None, None),
    };

    SchedulePreviewResponse {
        summary,
        reminder_message: reminder,
        auto_closed_message: closed,
        warnings,
    }
}

/// POST /api/schedules/preview - Render a template without saving it
#[utoipa::path(
    post,
    path = "/api/schedules/preview",
    request_body = SchedulePreviewInput,
    responses(
        (status = 200, description = "Preview of the schedule", body = SchedulePreviewResponse)
    ),
    tag = "assignments",
    security(("cookie_auth" = []))
)]
pub async fn preview_schedule(
    _auth: AuthenticatedUser,
    Json(input): Json<SchedulePreviewInput>,
) -> AppResult<Json<SchedulePreviewResponse>> {
    Ok(Json(build_preview(&input)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schedule::ShiftTime;
    use crate::notify::Language;

    fn input(template: ScheduleTemplate, language: Option<Language>) -> SchedulePreviewInput {
        SchedulePreviewInput {
            schedule_template: template,
            language,
            employee_first_name: Some("Maria".to_string()),
            dealership_name: Some("Sunset Motors".to_string()),
        }
    }

    #[test]
    fn test_assignment_must_be_at_home_dealership() {
        let employee_id = Uuid::new_v4();
        assert!(ensure_home_dealership(employee_id, 1, 1).is_ok());
        assert!(matches!(
            ensure_home_dealership(employee_id, 1, 2),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_preview_without_auto_close_has_no_messages() {
        let preview = build_preview(&input(ScheduleTemplate::default(), None));
        assert!(preview.reminder_message.is_none());
        assert!(preview.auto_closed_message.is_none());
        assert!(preview.summary.auto_close_timeline.is_none());
        assert!(preview.warnings.is_empty());
    }

    #[test]
    fn test_preview_localizes_messages() {
        let template = ScheduleTemplate { auto_close_enabled: true, ..ScheduleTemplate::default() };
        let preview = build_preview(&input(template, Some(Language::Es)));

        let reminder = preview.reminder_message.unwrap();
        assert!(reminder.starts_with("Hola Maria"));
        assert!(reminder.contains("17:00"));
        assert!(reminder.contains("19:00"));
        assert!(preview.auto_closed_message.unwrap().contains("Sunset Motors"));
    }

    #[test]
    fn test_preview_reports_invalid_template_as_warning() {
        let template = ScheduleTemplate {
            auto_close_enabled: true,
            auto_close_first_reminder: 120,
            auto_close_window_minutes: 60,
            ..ScheduleTemplate::default()
        };
        let preview = build_preview(&input(template, None));
        assert_eq!(preview.warnings.len(), 1);
        assert_eq!(preview.summary.auto_close_timeline.map(|t| t.reminder_precedes_close), Some(false));
    }

    #[test]
    fn test_preview_warns_when_close_wraps_midnight() {
        let template = ScheduleTemplate {
            shift_start_time: ShiftTime::parse("15:00").unwrap(),
            shift_end_time: ShiftTime::parse("23:45").unwrap(),
            auto_close_enabled: true,
            auto_close_first_reminder: 10,
            auto_close_window_minutes: 30,
            ..ScheduleTemplate::default()
        };
        let preview = build_preview(&input(template, None));
        assert!(preview.auto_closed_message.unwrap().contains("00:15"));
        assert!(preview.warnings.iter().any(|w| w.contains("day after")));
    }
}
