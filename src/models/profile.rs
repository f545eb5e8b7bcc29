use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Back-office login, linked to Clerk by `auth_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Profile {
    pub id: Uuid,
    pub auth_id: Option<String>,
    pub email: String,
    pub full_name: String,
    pub is_system_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DealershipMembership {
    pub id: i32,
    pub profile_id: Uuid,
    pub dealership_id: i32,
    pub role: String,
    pub can_manage_employees: bool,
    pub can_manage_schedules: bool,
    pub can_review_timecards: bool,
    pub can_manage_kiosks: bool,
    pub can_view_reports: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Dealership {
    pub id: i32,
    pub name: String,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MeResponse {
    #[serde(flatten)]
    pub profile: Profile,
    pub memberships: Vec<DealershipMembership>,
}
