use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    extractors::{permissions, AuthenticatedUser, Permission},
    models::{AuditAction, AuditEntry},
    AppResult, AppState,
};

/// One row for "TimeEntryAudit". `actor` is None for the auto-close worker
/// and kiosk punches.
pub struct AuditRecord {
    pub entry_id: Option<Uuid>,
    pub employee_id: Uuid,
    pub dealership_id: i32,
    pub action: AuditAction,
    pub actor: Option<Uuid>,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

pub async fn insert_audit(conn: &mut sqlx::PgConnection, record: AuditRecord) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO "TimeEntryAudit" (
            entry_id, employee_id, dealership_id, action, actor_profile_id, old, new
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.entry_id)
    .bind(record.employee_id)
    .bind(record.dealership_id)
    .bind(record.action.as_str())
    .bind(record.actor)
    .bind(record.old)
    .bind(record.new)
    .execute(conn)
    .await?;

    tracing::debug!(
        entry_id = ?record.entry_id,
        employee_id = %record.employee_id,
        action = record.action.as_str(),
        "Audit row written"
    );
    Ok(())
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GetAuditQuery {
    #[serde(rename = "dealershipId")]
    pub dealership_id: i32,
    #[serde(rename = "employeeId")]
    pub employee_id: Option<Uuid>,
    pub action: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/audit?dealershipId=&employeeId=&action=&limit=
#[utoipa::path(
    get,
    path = "/api/audit",
    params(GetAuditQuery),
    responses(
        (status = 200, description = "Time entry audit trail, newest first", body = Vec<AuditEntry>),
        (status = 403, description = "Missing can_review_timecards permission")
    ),
    tag = "audit",
    security(("cookie_auth" = []))
)]
pub async fn get_audit(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Query(query): Query<GetAuditQuery>,
) -> AppResult<Json<Vec<AuditEntry>>> {
    permissions::require_permission(&state.db, &auth, query.dealership_id, Permission::ReviewTimecards).await?;

    let limit = query.limit.unwrap_or(200).clamp(1, 1000);

    let entries = sqlx::query_as::<_, AuditEntry>(
        r#"
        SELECT
            a.id,
            a.entry_id,
            a.employee_id,
            a.dealership_id,
            a.action,
            a.actor_profile_id,
            p.full_name AS actor_name,
            a.old,
            a.new,
            a.created_at
        FROM "TimeEntryAudit" a
        LEFT JOIN "Profiles" p ON p.id = a.actor_profile_id
        WHERE a.dealership_id = $1
          AND ($2::uuid IS NULL OR a.employee_id = $2)
          AND ($3::text IS NULL OR a.action = $3)
        ORDER BY a.created_at DESC
        LIMIT $4
        "#,
    )
    .bind(query.dealership_id)
    .bind(query.employee_id)
    .bind(&query.action)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(entries))
}
