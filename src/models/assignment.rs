use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{ScheduleSummary, ScheduleTemplate};
use crate::notify::Language;

/// One employee working at one dealership, with its own schedule template.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Assignment {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub dealership_id: i32,
    pub status: String,
    #[schema(value_type = ScheduleTemplate)]
    pub schedule_template: Json<ScheduleTemplate>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAssignmentInput {
    pub employee_id: Uuid,
    pub dealership_id: i32,
    #[serde(default)]
    pub schedule_template: ScheduleTemplate,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateAssignmentInput {
    pub schedule_template: ScheduleTemplate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    Inactive,
    Terminated,
}

impl TerminationKind {
    pub fn as_status(&self) -> &'static str {
        match self {
            TerminationKind::Inactive => "inactive",
            TerminationKind::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TerminateAssignmentInput {
    pub status: TerminationKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SchedulePreviewInput {
    pub schedule_template: ScheduleTemplate,
    pub language: Option<Language>,
    pub employee_first_name: Option<String>,
    pub dealership_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SchedulePreviewResponse {
    pub summary: ScheduleSummary,
    /// Both messages are absent when auto-close is disabled
    pub reminder_message: Option<String>,
    pub auto_closed_message: Option<String>,
    pub warnings: Vec<String>,
}
