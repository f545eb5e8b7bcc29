use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::invitation::{generate_invitation_token, InvitationStatus},
    extractors::{
        permissions::{self, role_defaults},
        AuthenticatedUser, Permission,
    },
    models::{
        invitation::INVITATION_ROLES, CreateInvitationInput, CreatedInvitation, Dealership, DealershipMembership,
        Invitation, InvitationMutationResponse, InvitationVerifyResponse,
    },
    AppError, AppResult, AppState,
};

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::Validation(format!("Invalid email address: {}", email))),
    }
}

/// Accepting requires the signed-in profile's email to match the invitation.
pub fn email_matches(invited: &str, profile_email: &str) -> bool {
    invited.trim().eq_ignore_ascii_case(profile_email.trim())
}

async fn fetch_by_token(db: &sqlx::PgPool, token: &str) -> AppResult<Invitation> {
    sqlx::query_as::<_, Invitation>(r#"SELECT * FROM "Invitations" WHERE token = $1"#)
        .bind(token)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))
}

/// POST /api/invitations - Invite someone to a dealership
#[utoipa::path(
    post,
    path = "/api/invitations",
    request_body = CreateInvitationInput,
    responses(
        (status = 200, description = "Invitation created; the token is only returned here", body = CreatedInvitation),
        (status = 403, description = "Missing can_manage_employees permission"),
        (status = 409, description = "A pending invitation already exists for this email"),
        (status = 422, description = "Invalid email or role")
    ),
    tag = "invitations",
    security(("cookie_auth" = []))
)]
pub async fn create_invitation(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(input): Json<CreateInvitationInput>,
) -> AppResult<Json<CreatedInvitation>> {
    let email = normalize_email(&input.email)?;
    if !INVITATION_ROLES.contains(&input.role.as_str()) {
        return Err(AppError::Validation(format!("Invalid role: {}", input.role)));
    }

    permissions::require_permission(&state.db, &auth, input.dealership_id, Permission::ManageEmployees).await?;

    let pending_exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM "Invitations"
            WHERE dealership_id = $1 AND LOWER(email) = $2
              AND accepted_at IS NULL AND cancelled_at IS NULL AND expires_at > now()
        )
        "#,
    )
    .bind(input.dealership_id)
    .bind(&email)
    .fetch_one(&state.db)
    .await?;

    if pending_exists {
        return Err(AppError::Conflict(format!("{} already has a pending invitation", email)));
    }

    let token = generate_invitation_token();
    let expires_at = Utc::now() + Duration::hours(state.config.invitation_ttl_hours);

    let invitation = sqlx::query_as::<_, Invitation>(
        r#"
        INSERT INTO "Invitations" (id, dealership_id, email, role, token, invited_by, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(input.dealership_id)
    .bind(&email)
    .bind(&input.role)
    .bind(&token)
    .bind(auth.profile_id)
    .bind(expires_at)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(invitation_id = %invitation.id, dealership_id = invitation.dealership_id, role = %invitation.role, "Invitation created");
    Ok(Json(CreatedInvitation { invitation, token }))
}

/// GET /api/invitations/verify/{token} - Public status check for the invite link
#[utoipa::path(
    get,
    path = "/api/invitations/verify/{token}",
    params(("token" = String, Path, description = "Invitation token")),
    responses(
        (status = 200, description = "Invitation status", body = InvitationVerifyResponse),
        (status = 404, description = "Unknown token")
    ),
    tag = "invitations"
)]
pub async fn verify_invitation(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> AppResult<Json<InvitationVerifyResponse>> {
    let invitation = fetch_by_token(&state.db, &token).await?;

    let dealership = sqlx::query_as::<_, Dealership>(r#"SELECT id, name, timezone FROM "Dealerships" WHERE id = $1"#)
        .bind(invitation.dealership_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Dealership no longer exists".to_string()))?;

    Ok(Json(InvitationVerifyResponse {
        status: invitation.status(Utc::now()),
        email: invitation.email,
        dealership_id: dealership.id,
        dealership_name: dealership.name,
        role: invitation.role,
        expires_at: invitation.expires_at,
    }))
}

/// POST /api/invitations/accept/{token} - Join the dealership as the signed-in profile
#[utoipa::path(
    post,
    path = "/api/invitations/accept/{token}",
    params(("token" = String, Path, description = "Invitation token")),
    responses(
        (status = 200, description = "Membership created", body = DealershipMembership),
        (status = 403, description = "Invitation was sent to a different email"),
        (status = 404, description = "Unknown token"),
        (status = 409, description = "Invitation is not pending")
    ),
    tag = "invitations",
    security(("cookie_auth" = []))
)]
pub async fn accept_invitation(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    auth: AuthenticatedUser,
) -> AppResult<Json<DealershipMembership>> {
    let mut tx = state.db.begin().await?;

    let invitation = sqlx::query_as::<_, Invitation>(r#"SELECT * FROM "Invitations" WHERE token = $1 FOR UPDATE"#)
        .bind(&token)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;

    let status = invitation.status(Utc::now());
    if status != InvitationStatus::Pending {
        return Err(AppError::Conflict(format!("Invitation is {:?}", status).to_lowercase()));
    }

    if !email_matches(&invitation.email, &auth.email) {
        tracing::warn!(invitation_id = %invitation.id, profile_id = %auth.profile_id, "Invitation email mismatch");
        return Err(AppError::Forbidden("This invitation was sent to a different email address".to_string()));
    }

    let [employees, schedules, timecards, kiosks, reports] = role_defaults(&invitation.role);

    let membership = sqlx::query_as::<_, DealershipMembership>(
        r#"
        INSERT INTO "DealershipMemberships" (
            profile_id, dealership_id, role, can_manage_employees, can_manage_schedules,
            can_review_timecards, can_manage_kiosks, can_view_reports
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (profile_id, dealership_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(auth.profile_id)
    .bind(invitation.dealership_id)
    .bind(&invitation.role)
    .bind(employees)
    .bind(schedules)
    .bind(timecards)
    .bind(kiosks)
    .bind(reports)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::Conflict("You are already a member of this dealership".to_string()))?;

    sqlx::query(r#"UPDATE "Invitations" SET accepted_at = now(), accepted_by = $1 WHERE id = $2"#)
        .bind(auth.profile_id)
        .bind(invitation.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    permissions::invalidate_memberships(auth.profile_id).await;

    tracing::info!(
        invitation_id = %invitation.id,
        profile_id = %auth.profile_id,
        dealership_id = membership.dealership_id,
        role = %membership.role,
        "Invitation accepted"
    );
    Ok(Json(membership))
}

/// DELETE /api/invitations/{id} - Cancel a pending invitation
#[utoipa::path(
    delete,
    path = "/api/invitations/{id}",
    params(("id" = Uuid, Path, description = "Invitation ID")),
    responses(
        (status = 200, description = "Invitation cancelled", body = InvitationMutationResponse),
        (status = 404, description = "Invitation not found or no longer pending")
    ),
    tag = "invitations",
    security(("cookie_auth" = []))
)]
pub async fn cancel_invitation(
    State(state): State<Arc<AppState>>,
    Path(invitation_id): Path<Uuid>,
    auth: AuthenticatedUser,
) -> AppResult<Json<InvitationMutationResponse>> {
    let dealership_id = sqlx::query_scalar::<_, i32>(r#"SELECT dealership_id FROM "Invitations" WHERE id = $1"#)
        .bind(invitation_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invitation {} not found", invitation_id)))?;

    permissions::require_permission(&state.db, &auth, dealership_id, Permission::ManageEmployees).await?;

    let result = sqlx::query(
        r#"
        UPDATE "Invitations"
        SET cancelled_at = now()
        WHERE id = $1 AND accepted_at IS NULL AND cancelled_at IS NULL
        "#,
    )
    .bind(invitation_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Invitation {} is no longer pending", invitation_id)));
    }

    tracing::info!(%invitation_id, "Invitation cancelled");
    Ok(Json(InvitationMutationResponse {
        success: true,
        message: Some("Invitation cancelled".to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_match_is_case_insensitive() {
        assert!(email_matches("Jane.Doe@Dealer.com", "jane.doe@dealer.com"));
        assert!(email_matches(" jane@dealer.com", "JANE@DEALER.COM "));
        assert!(!email_matches("jane@dealer.com", "john@dealer.com"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Sam@Example.COM ").unwrap(), "sam@example.com");
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("@example.com").is_err());
    }
}
