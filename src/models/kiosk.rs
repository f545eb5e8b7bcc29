use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{PunchKind, PunchState, PunchWindowCheck};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Kiosk {
    pub id: Uuid,
    pub dealership_id: i32,
    pub name: String,
    pub location: Option<String>,
    pub face_recognition_enabled: bool,
    pub status: String,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateKioskInput {
    pub dealership_id: i32,
    pub name: String,
    pub location: Option<String>,
    #[serde(default)]
    pub face_recognition_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateKioskInput {
    pub name: Option<String>,
    pub location: Option<String>,
    pub face_recognition_enabled: Option<bool>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KioskUrlResponse {
    pub kiosk_id: Uuid,
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Persisted per device after setup; cleared when the kiosk is reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KioskDeviceConfig {
    pub kiosk_id: Uuid,
    pub device_fingerprint: String,
    pub configured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigureKioskInput {
    pub device_fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KioskPunchInput {
    pub pin: String,
    pub action: PunchKind,
    pub face_descriptor: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KioskPunchResponse {
    pub success: bool,
    pub employee_name: String,
    pub action: PunchKind,
    pub state: PunchState,
    pub entry_id: Uuid,
    pub punched_at: DateTime<Utc>,
    pub window: Option<PunchWindowCheck>,
    pub face_verified: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KioskStatusResponse {
    pub employee_name: String,
    pub state: PunchState,
    pub open_entry_id: Option<Uuid>,
    pub face_required: bool,
}
