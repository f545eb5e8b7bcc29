use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::EntryTimes;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TimeEntry {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub assignment_id: Uuid,
    pub dealership_id: i32,
    pub kiosk_id: Option<Uuid>,
    pub clock_in: DateTime<Utc>,
    pub break_start: Option<DateTime<Utc>>,
    pub break_end: Option<DateTime<Utc>>,
    pub clock_out: Option<DateTime<Utc>>,
    pub is_late: bool,
    pub face_verified: bool,
    pub notes: Option<String>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub auto_closed_at: Option<DateTime<Utc>>,
    pub requires_supervisor_review: bool,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TimeEntry {
    pub fn times(&self) -> EntryTimes {
        EntryTimes {
            clock_in: Some(self.clock_in),
            break_start: self.break_start,
            break_end: self.break_end,
            clock_out: self.clock_out,
        }
    }
}

/// Time entry joined with the employee name, for review lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TimeEntryWithEmployee {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub entry: TimeEntry,
    pub employee_name: String,
    pub employee_number: String,
}

/// Supervisor manual edit. Omitted fields keep their stored value.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdjustTimeEntryInput {
    pub clock_in: Option<DateTime<Utc>>,
    pub break_start: Option<DateTime<Utc>>,
    pub break_end: Option<DateTime<Utc>>,
    pub clock_out: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimeEntryMutationResponse {
    pub success: bool,
    pub entry: TimeEntry,
    pub message: Option<String>,
}

/// Row for the timecard rollup
#[derive(Debug, Clone, FromRow)]
pub struct TimecardRow {
    pub employee_id: Uuid,
    pub employee_name: String,
    pub clock_in: DateTime<Utc>,
    pub break_start: Option<DateTime<Utc>>,
    pub break_end: Option<DateTime<Utc>>,
    pub clock_out: Option<DateTime<Utc>>,
    pub is_late: bool,
    pub auto_closed: bool,
    pub break_is_paid: Option<bool>,
    pub required_break_minutes: Option<i32>,
}
