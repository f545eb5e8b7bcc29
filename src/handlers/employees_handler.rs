use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    domain::{employee, face},
    extractors::{permissions, AuthenticatedUser, Permission},
    handlers::audit_handler::{insert_audit, AuditRecord},
    models::{
        employee::EMPLOYEE_STATUSES, AuditAction, CreateEmployeeInput, Employee, FaceEnrollmentInput,
        GeneratedPinResponse, NextEmployeeNumberResponse, UpdateEmployeeInput,
    },
    notify::Language,
    AppError, AppResult, AppState,
};

const PIN_GENERATION_ATTEMPTS: usize = 10;

fn validate_pin(pin: &str) -> AppResult<()> {
    if employee::is_valid_pin(pin) {
        Ok(())
    } else {
        Err(AppError::Validation("PIN must be 4 to 6 digits".to_string()))
    }
}

fn validate_name(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn normalize_language(tag: Option<&str>) -> &'static str {
    Language::from_tag(tag).as_tag()
}

async fn fetch_employee(db: &sqlx::PgPool, employee_id: Uuid) -> AppResult<Employee> {
    sqlx::query_as::<_, Employee>(r#"SELECT * FROM "Employees" WHERE id = $1"#)
        .bind(employee_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Employee {} not found", employee_id)))
}

async fn pin_in_use(
    db: &sqlx::PgPool,
    dealership_id: i32,
    pin: &str,
    excluding: Option<Uuid>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM "Employees"
            WHERE dealership_id = $1 AND pin = $2 AND status <> 'terminated'
              AND ($3::uuid IS NULL OR id <> $3)
        )
        "#,
    )
    .bind(dealership_id)
    .bind(pin)
    .bind(excluding)
    .fetch_one(db)
    .await
}

/// Highest EMP### number in use, compared numerically. The digit bound
/// keeps the cast within bigint.
async fn last_employee_number<'e, E>(executor: E) -> Result<Option<String>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT employee_number
        FROM "Employees"
        WHERE employee_number ~ '^EMP[0-9]{1,18}$'
        ORDER BY substring(employee_number FROM 4)::bigint DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(executor)
    .await
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GetEmployeesQuery {
    #[serde(rename = "dealershipId")]
    pub dealership_id: i32,
    pub status: Option<String>,
    pub search: Option<String>,
}

/// GET /api/employees?dealershipId=&status=&search=
#[utoipa::path(
    get,
    path = "/api/employees",
    params(GetEmployeesQuery),
    responses(
        (status = 200, description = "Employees of the dealership", body = Vec<Employee>),
        (status = 403, description = "Not a member of the dealership")
    ),
    tag = "employees",
    security(("cookie_auth" = []))
)]
pub async fn get_employees(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Query(query): Query<GetEmployeesQuery>,
) -> AppResult<Json<Vec<Employee>>> {
    permissions::require_member(&state.db, &auth, query.dealership_id).await?;

    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s));

    let employees = sqlx::query_as::<_, Employee>(
        r#"
        SELECT * FROM "Employees"
        WHERE dealership_id = $1
          AND ($2::text IS NULL OR status = $2)
          AND ($3::text IS NULL
               OR first_name ILIKE $3
               OR last_name ILIKE $3
               OR employee_number ILIKE $3
               OR email ILIKE $3)
        ORDER BY last_name, first_name
        "#,
    )
    .bind(query.dealership_id)
    .bind(&query.status)
    .bind(search)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(employees))
}

/// GET /api/employees/{id}
#[utoipa::path(
    get,
    path = "/api/employees/{id}",
    params(("id" = Uuid, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee", body = Employee),
        (status = 404, description = "Employee not found")
    ),
    tag = "employees",
    security(("cookie_auth" = []))
)]
pub async fn get_employee(
    State(state): State<Arc<AppState>>,
    Path(employee_id): Path<Uuid>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Employee>> {
    let employee = fetch_employee(&state.db, employee_id).await?;
    permissions::require_member(&state.db, &auth, employee.dealership_id).await?;
    Ok(Json(employee))
}

/// GET /api/employees/next-number - Preview the next generated employee number
#[utoipa::path(
    get,
    path = "/api/employees/next-number",
    responses(
        (status = 200, description = "Next employee number", body = NextEmployeeNumberResponse)
    ),
    tag = "employees",
    security(("cookie_auth" = []))
)]
pub async fn get_next_employee_number(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
) -> AppResult<Json<NextEmployeeNumberResponse>> {
    let last = last_employee_number(&state.db).await?;
    Ok(Json(NextEmployeeNumberResponse {
        employee_number: employee::next_employee_number(last.as_deref()),
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GeneratePinQuery {
    #[serde(rename = "dealershipId")]
    pub dealership_id: i32,
}

/// POST /api/employees/generate-pin?dealershipId= - Random PIN unused at the dealership
#[utoipa::path(
    post,
    path = "/api/employees/generate-pin",
    params(GeneratePinQuery),
    responses(
        (status = 200, description = "Unused PIN", body = GeneratedPinResponse),
        (status = 409, description = "No unused PIN found")
    ),
    tag = "employees",
    security(("cookie_auth" = []))
)]
pub async fn generate_pin(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Query(query): Query<GeneratePinQuery>,
) -> AppResult<Json<GeneratedPinResponse>> {
    permissions::require_permission(&state.db, &auth, query.dealership_id, Permission::ManageEmployees).await?;

    for attempt in 1..=PIN_GENERATION_ATTEMPTS {
        let candidate = {
            let mut rng = rand::thread_rng();
            employee::generate_pin_candidate(&mut rng)
        };
        if !pin_in_use(&state.db, query.dealership_id, &candidate, None).await? {
            return Ok(Json(GeneratedPinResponse { pin: candidate }));
        }
        tracing::debug!(attempt, dealership_id = query.dealership_id, "Generated PIN already in use");
    }

    tracing::warn!(dealership_id = query.dealership_id, "PIN generation exhausted attempts");
    Err(AppError::Conflict(
        "Could not find an unused PIN, please enter one manually".to_string(),
    ))
}

/// POST /api/employees - Create an employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployeeInput,
    responses(
        (status = 200, description = "Employee created", body = Employee),
        (status = 403, description = "Missing can_manage_employees permission"),
        (status = 409, description = "PIN or employee number already in use"),
        (status = 422, description = "Invalid PIN, employee number or fields")
    ),
    tag = "employees",
    security(("cookie_auth" = []))
)]
pub async fn create_employee(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(input): Json<CreateEmployeeInput>,
) -> AppResult<Json<Employee>> {
    // Input checks run before any database access
    validate_pin(&input.pin)?;
    validate_name("first_name", &input.first_name)?;
    validate_name("last_name", &input.last_name)?;
    let manual_number = input.employee_number.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if let Some(number) = manual_number {
        if !employee::is_valid_employee_number(number) {
            return Err(AppError::Validation(format!("Invalid employee number: {}", number)));
        }
    }

    permissions::require_permission(&state.db, &auth, input.dealership_id, Permission::ManageEmployees).await?;

    if pin_in_use(&state.db, input.dealership_id, &input.pin, None).await? {
        return Err(AppError::Conflict("PIN is already used at this dealership".to_string()));
    }

    let mut tx = state.db.begin().await?;

    let employee_number = match manual_number {
        Some(number) => number.to_string(),
        None => {
            // Serializes concurrent number generation
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext('employee_number'))")
                .execute(&mut *tx)
                .await?;
            let last = last_employee_number(&mut *tx).await?;
            employee::next_employee_number(last.as_deref())
        }
    };

    let employee = sqlx::query_as::<_, Employee>(
        r#"
        INSERT INTO "Employees" (
            id, dealership_id, employee_number, first_name, last_name, email, phone,
            position, status, preferred_language, pin
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', $9, $10)
        ON CONFLICT (employee_number) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(input.dealership_id)
    .bind(&employee_number)
    .bind(input.first_name.trim())
    .bind(input.last_name.trim())
    .bind(&input.email)
    .bind(&input.phone)
    .bind(&input.position)
    .bind(normalize_language(input.preferred_language.as_deref()))
    .bind(&input.pin)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::Conflict(format!("Employee number {} is already in use", employee_number)))?;

    tx.commit().await?;

    tracing::info!(employee_id = %employee.id, employee_number, dealership_id = employee.dealership_id, "Employee created");
    Ok(Json(employee))
}

/// PUT /api/employees/{id} - Partially update an employee
#[utoipa::path(
    put,
    path = "/api/employees/{id}",
    params(("id" = Uuid, Path, description = "Employee ID")),
    request_body = UpdateEmployeeInput,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "No fields to update"),
        (status = 403, description = "Missing can_manage_employees permission"),
        (status = 404, description = "Employee not found"),
        (status = 422, description = "Invalid PIN or status")
    ),
    tag = "employees",
    security(("cookie_auth" = []))
)]
pub async fn update_employee(
    State(state): State<Arc<AppState>>,
    Path(employee_id): Path<Uuid>,
    auth: AuthenticatedUser,
    Json(input): Json<UpdateEmployeeInput>,
) -> AppResult<Json<Employee>> {
    if let Some(pin) = &input.pin {
        validate_pin(pin)?;
    }
    if let Some(status) = &input.status {
        if !EMPLOYEE_STATUSES.contains(&status.as_str()) {
            return Err(AppError::Validation(format!("Invalid status: {}", status)));
        }
    }
    if let Some(first_name) = &input.first_name {
        validate_name("first_name", first_name)?;
    }
    if let Some(last_name) = &input.last_name {
        validate_name("last_name", last_name)?;
    }

    let existing = fetch_employee(&state.db, employee_id).await?;
    permissions::require_permission(&state.db, &auth, existing.dealership_id, Permission::ManageEmployees).await?;

    if let Some(pin) = &input.pin {
        if pin_in_use(&state.db, existing.dealership_id, pin, Some(employee_id)).await? {
            return Err(AppError::Conflict("PIN is already used at this dealership".to_string()));
        }
    }

    // Build dynamic UPDATE query
    let mut updates = vec![];
    let mut bind_count = 1;

    for (present, column) in [
        (input.first_name.is_some(), "first_name"),
        (input.last_name.is_some(), "last_name"),
        (input.email.is_some(), "email"),
        (input.phone.is_some(), "phone"),
        (input.position.is_some(), "position"),
        (input.status.is_some(), "status"),
        (input.preferred_language.is_some(), "preferred_language"),
        (input.pin.is_some(), "pin"),
    ] {
        if present {
            updates.push(format!("{} = ${}", column, bind_count));
            bind_count += 1;
        }
    }

    if updates.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let sql = format!(
        r#"UPDATE "Employees" SET {} WHERE id = ${} RETURNING *"#,
        updates.join(", "),
        bind_count
    );

    let mut query = sqlx::query_as::<_, Employee>(&sql);

    if let Some(first_name) = &input.first_name {
        query = query.bind(first_name.trim());
    }
    if let Some(last_name) = &input.last_name {
        query = query.bind(last_name.trim());
    }
    if let Some(email) = &input.email {
        query = query.bind(email);
    }
    if let Some(phone) = &input.phone {
        query = query.bind(phone);
    }
    if let Some(position) = &input.position {
        query = query.bind(position);
    }
    if let Some(status) = &input.status {
        query = query.bind(status);
    }
    if let Some(language) = &input.preferred_language {
        query = query.bind(normalize_language(Some(language)));
    }
    if let Some(pin) = &input.pin {
        query = query.bind(pin);
    }

    let updated = query.bind(employee_id).fetch_one(&state.db).await?;

    Ok(Json(updated))
}

/// POST /api/employees/{id}/face-enrollment - Store the face descriptor used for kiosk verification
#[utoipa::path(
    post,
    path = "/api/employees/{id}/face-enrollment",
    params(("id" = Uuid, Path, description = "Employee ID")),
    request_body = FaceEnrollmentInput,
    responses(
        (status = 200, description = "Face enrolled", body = Employee),
        (status = 403, description = "Missing can_manage_employees permission"),
        (status = 404, description = "Employee not found"),
        (status = 422, description = "Malformed descriptor")
    ),
    tag = "employees",
    security(("cookie_auth" = []))
)]
pub async fn enroll_face(
    State(state): State<Arc<AppState>>,
    Path(employee_id): Path<Uuid>,
    auth: AuthenticatedUser,
    Json(input): Json<FaceEnrollmentInput>,
) -> AppResult<Json<Employee>> {
    face::validate_descriptor(&input.descriptor)?;

    let existing = fetch_employee(&state.db, employee_id).await?;
    permissions::require_permission(&state.db, &auth, existing.dealership_id, Permission::ManageEmployees).await?;

    let now = Utc::now();
    let mut tx = state.db.begin().await?;

    let employee = sqlx::query_as::<_, Employee>(
        r#"
        UPDATE "Employees"
        SET face_descriptor = $1, face_enrolled_at = $2
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(&input.descriptor)
    .bind(now)
    .bind(employee_id)
    .fetch_one(&mut *tx)
    .await?;

    insert_audit(
        &mut *tx,
        AuditRecord {
            entry_id: None,
            employee_id,
            dealership_id: employee.dealership_id,
            action: AuditAction::FaceEnrolled,
            actor: Some(auth.profile_id),
            old: Some(json!({ "enrolled_at": existing.face_enrolled_at })),
            new: Some(json!({ "enrolled_at": now, "descriptor_len": input.descriptor.len() })),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(%employee_id, "Face enrolled");
    Ok(Json(employee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{lazy_state, manager};

    fn new_employee(pin: &str) -> CreateEmployeeInput {
        CreateEmployeeInput {
            dealership_id: 1,
            employee_number: None,
            first_name: "Ana".to_string(),
            last_name: "Lima".to_string(),
            email: None,
            phone: None,
            position: Some("Detailer".to_string()),
            preferred_language: Some("pt-BR".to_string()),
            pin: pin.to_string(),
        }
    }

    // The pool points at a closed port, so reaching the database would
    // surface as AppError::Database instead.
    #[tokio::test]
    async fn test_create_rejects_bad_pin_before_database() {
        let result = create_employee(State(lazy_state()), manager(), Json(new_employee("12a4"))).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_employee_number_before_database() {
        let input = CreateEmployeeInput {
            employee_number: Some("EMP99999999999999999999".to_string()),
            ..new_employee("1234")
        };
        let result = create_employee(State(lazy_state()), manager(), Json(input)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_rejects_bad_pin_before_database() {
        let input = UpdateEmployeeInput {
            pin: Some("12a4".to_string()),
            ..UpdateEmployeeInput::default()
        };
        let result = update_employee(State(lazy_state()), Path(Uuid::new_v4()), manager(), Json(input)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_language_is_normalized() {
        assert_eq!(normalize_language(Some("pt")), "pt-BR");
        assert_eq!(normalize_language(Some("fr")), "en");
        assert_eq!(normalize_language(None), "en");
    }
}
