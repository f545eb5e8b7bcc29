use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::invitation::{invitation_status, InvitationStatus};

pub const INVITATION_ROLES: [&str; 3] = ["dealer_admin", "manager", "viewer"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Invitation {
    pub id: Uuid,
    pub dealership_id: i32,
    pub email: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub invited_by: Uuid,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub accepted_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    pub fn status(&self, now: DateTime<Utc>) -> InvitationStatus {
        invitation_status(self.accepted_at, self.cancelled_at, self.expires_at, now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateInvitationInput {
    pub dealership_id: i32,
    pub email: String,
    pub role: String,
}

/// Returned once on creation; the token is not readable afterwards
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreatedInvitation {
    #[serde(flatten)]
    pub invitation: Invitation,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvitationVerifyResponse {
    pub status: InvitationStatus,
    pub email: String,
    pub dealership_id: i32,
    pub dealership_name: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvitationMutationResponse {
    pub success: bool,
    pub message: Option<String>,
}
