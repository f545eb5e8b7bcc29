use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ClockIn,
    BreakStart,
    BreakEnd,
    ClockOut,
    AutoClosed,
    ReviewApproved,
    ReviewAdjusted,
    FaceEnrolled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ClockIn => "clock_in",
            AuditAction::BreakStart => "break_start",
            AuditAction::BreakEnd => "break_end",
            AuditAction::ClockOut => "clock_out",
            AuditAction::AutoClosed => "auto_closed",
            AuditAction::ReviewApproved => "review_approved",
            AuditAction::ReviewAdjusted => "review_adjusted",
            AuditAction::FaceEnrolled => "face_enrolled",
        }
    }
}

impl From<crate::domain::PunchKind> for AuditAction {
    fn from(kind: crate::domain::PunchKind) -> Self {
        use crate::domain::PunchKind;
        match kind {
            PunchKind::ClockIn => AuditAction::ClockIn,
            PunchKind::BreakStart => AuditAction::BreakStart,
            PunchKind::BreakEnd => AuditAction::BreakEnd,
            PunchKind::ClockOut => AuditAction::ClockOut,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditEntry {
    pub id: i64,
    pub entry_id: Option<Uuid>,
    pub employee_id: Uuid,
    pub dealership_id: i32,
    pub action: String,
    /// None for actions taken by the auto-close worker or a kiosk
    pub actor_profile_id: Option<Uuid>,
    pub actor_name: Option<String>,
    pub old: Option<serde_json::Value>,
    pub new: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
