//! Background scan that reminds employees with open time entries to clock
//! out and force-closes entries past their auto-close deadline.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use metrics::counter;
use serde_json::json;
use sqlx::{types::Json, FromRow, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    domain::{AutoCloseAction, AutoCloseSchedule, ScheduleTemplate},
    handlers::{
        audit_handler::{insert_audit, AuditRecord},
        metrics::{AUTO_CLOSE_ENTRIES_CLOSED, AUTO_CLOSE_REMINDERS_SENT, AUTO_CLOSE_SCAN_FAILURES, SMS_SEND_FAILURES},
        time_entries_handler::timezone_or,
    },
    models::{AuditAction, TimeEntry},
    notify::{auto_closed_message, reminder_message, Language, MessageContext, SmsSender},
    AppResult,
};

/// Open entry whose active assignment has auto-close enabled.
#[derive(Debug, Clone, FromRow)]
pub struct OpenEntry {
    pub entry_id: Uuid,
    pub employee_id: Uuid,
    pub dealership_id: i32,
    pub clock_in: DateTime<Utc>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub schedule_template: Json<ScheduleTemplate>,
    pub first_name: String,
    pub phone: Option<String>,
    pub preferred_language: Option<String>,
    pub dealership_name: String,
    pub dealership_timezone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub action: AutoCloseAction,
    pub schedule: AutoCloseSchedule,
    pub tz: Tz,
}

/// What the worker should do with `entry` at `now`. None when auto-close is
/// off or the local shift end cannot be resolved.
pub fn plan_entry(entry: &OpenEntry, now: DateTime<Utc>, default_tz: Tz) -> Option<Plan> {
    let tz = timezone_or(entry.dealership_timezone.as_deref(), default_tz);
    let schedule = AutoCloseSchedule::for_entry(&entry.schedule_template, entry.clock_in, tz)?;
    Some(Plan {
        action: schedule.decide(now, entry.reminder_sent_at.is_some()),
        schedule,
        tz,
    })
}

pub fn message_context(entry: &OpenEntry, plan: &Plan) -> MessageContext {
    MessageContext {
        first_name: entry.first_name.clone(),
        dealership_name: entry.dealership_name.clone(),
        shift_end: plan.schedule.anchor.with_timezone(&plan.tz).format("%H:%M").to_string(),
        auto_close_at: plan.schedule.auto_close_at.with_timezone(&plan.tz).format("%H:%M").to_string(),
    }
}

/// Sends one SMS. Missing phone numbers and gateway failures are logged, never retried.
pub async fn deliver(sms: &dyn SmsSender, entry: &OpenEntry, body: &str) -> bool {
    let Some(phone) = entry.phone.as_deref().filter(|p| !p.trim().is_empty()) else {
        tracing::info!(entry_id = %entry.entry_id, employee_id = %entry.employee_id, "No phone on file, SMS skipped");
        return false;
    };

    match sms.send(phone, body).await {
        Ok(()) => true,
        Err(e) => {
            counter!(SMS_SEND_FAILURES).increment(1);
            tracing::warn!(error = %e, entry_id = %entry.entry_id, "SMS delivery failed");
            false
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub scanned: usize,
    pub reminded: usize,
    pub closed: usize,
}

pub struct AutoCloseWorker {
    db: PgPool,
    sms: Arc<dyn SmsSender>,
    default_tz: Tz,
    interval: Duration,
    shutdown: CancellationToken,
}

impl AutoCloseWorker {
    pub fn new(
        db: PgPool,
        sms: Arc<dyn SmsSender>,
        default_tz: Tz,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self { db, sms, default_tz, interval, shutdown }
    }

    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Auto-close worker started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // First tick fires immediately
                _ = ticker.tick() => {
                    match self.scan_once(Utc::now()).await {
                        Ok(report) if report.reminded + report.closed > 0 => {
                            tracing::info!(
                                scanned = report.scanned,
                                reminded = report.reminded,
                                closed = report.closed,
                                "Auto-close scan finished"
                            );
                        }
                        Ok(report) => tracing::debug!(scanned = report.scanned, "Auto-close scan finished"),
                        Err(e) => {
                            counter!(AUTO_CLOSE_SCAN_FAILURES).increment(1);
                            tracing::error!(error = %e, "Auto-close scan failed");
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Auto-close worker received shutdown signal");
                    return;
                }
            }
        }
    }

    pub async fn scan_once(&self, now: DateTime<Utc>) -> AppResult<ScanReport> {
        let candidates = sqlx::query_as::<_, OpenEntry>(
            r#"
            SELECT
                t.id AS entry_id,
                t.employee_id,
                t.dealership_id,
                t.clock_in,
                t.reminder_sent_at,
                a.schedule_template,
                e.first_name,
                e.phone,
                e.preferred_language,
                d.name AS dealership_name,
                d.timezone AS dealership_timezone
            FROM "TimeEntries" t
            JOIN "EmployeeAssignments" a ON a.id = t.assignment_id
            JOIN "Employees" e ON e.id = t.employee_id
            JOIN "Dealerships" d ON d.id = t.dealership_id
            WHERE t.clock_out IS NULL
              AND a.status = 'active'
              AND (a.schedule_template ->> 'auto_close_enabled')::boolean = true
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut report = ScanReport { scanned: candidates.len(), ..ScanReport::default() };

        for entry in &candidates {
            let Some(plan) = plan_entry(entry, now, self.default_tz) else {
                tracing::warn!(
                    entry_id = %entry.entry_id,
                    dealership_id = entry.dealership_id,
                    "Shift end could not be resolved, entry skipped"
                );
                continue;
            };

            // One bad entry must not stop the rest of the scan
            let outcome = match plan.action {
                AutoCloseAction::Wait => Ok(false),
                AutoCloseAction::SendReminder => self.send_reminder(entry, &plan, now).await,
                AutoCloseAction::ForceClose => self.force_close(entry, &plan, now).await,
            };

            match (plan.action, outcome) {
                (AutoCloseAction::SendReminder, Ok(true)) => report.reminded += 1,
                (AutoCloseAction::ForceClose, Ok(true)) => report.closed += 1,
                (_, Ok(_)) => {}
                (action, Err(e)) => {
                    tracing::error!(error = %e, entry_id = %entry.entry_id, ?action, "Auto-close action failed");
                }
            }
        }

        Ok(report)
    }

    /// Stamps `reminder_sent_at` before sending so a reminder goes out at most once.
    async fn send_reminder(&self, entry: &OpenEntry, plan: &Plan, now: DateTime<Utc>) -> AppResult<bool> {
        let claimed = sqlx::query(
            r#"
            UPDATE "TimeEntries"
            SET reminder_sent_at = $1
            WHERE id = $2 AND reminder_sent_at IS NULL AND clock_out IS NULL
            "#,
        )
        .bind(now)
        .bind(entry.entry_id)
        .execute(&self.db)
        .await?;

        if claimed.rows_affected() == 0 {
            return Ok(false);
        }

        let language = Language::from_tag(entry.preferred_language.as_deref());
        let body = reminder_message(language, &message_context(entry, plan));
        if deliver(self.sms.as_ref(), entry, &body).await {
            counter!(AUTO_CLOSE_REMINDERS_SENT).increment(1);
        }

        tracing::info!(
            entry_id = %entry.entry_id,
            employee_id = %entry.employee_id,
            dealership_id = entry.dealership_id,
            "Clock-out reminder issued"
        );
        Ok(true)
    }

    /// Closes the entry at the anchor (or its last punch, if later), flags
    /// it for review and writes the audit row in one transaction. An open
    /// break is ended at the same instant.
    async fn force_close(&self, entry: &OpenEntry, plan: &Plan, now: DateTime<Utc>) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        let closed = sqlx::query_as::<_, TimeEntry>(
            r#"
            UPDATE "TimeEntries"
            SET break_end = CASE
                    WHEN break_start IS NOT NULL AND break_end IS NULL THEN GREATEST($1, break_start)
                    ELSE break_end
                END,
                clock_out = GREATEST($1, clock_in, COALESCE(break_end, break_start, clock_in)),
                auto_closed_at = $2,
                requires_supervisor_review = true
            WHERE id = $3 AND clock_out IS NULL
            RETURNING *
            "#,
        )
        .bind(plan.schedule.anchor)
        .bind(now)
        .bind(entry.entry_id)
        .fetch_optional(&mut *tx)
        .await?;

        // Clocked out between the scan and this update
        let Some(closed) = closed else {
            return Ok(false);
        };

        insert_audit(
            &mut *tx,
            AuditRecord {
                entry_id: Some(closed.id),
                employee_id: closed.employee_id,
                dealership_id: closed.dealership_id,
                action: AuditAction::AutoClosed,
                actor: None,
                old: Some(json!({ "clock_out": null })),
                new: Some(json!({
                    "clock_out": closed.clock_out,
                    "break_end": closed.break_end,
                    "auto_closed_at": now,
                    "deadline": plan.schedule.auto_close_at,
                })),
            },
        )
        .await?;

        tx.commit().await?;
        counter!(AUTO_CLOSE_ENTRIES_CLOSED).increment(1);

        tracing::info!(
            entry_id = %closed.id,
            employee_id = %closed.employee_id,
            clock_out = ?closed.clock_out,
            "Time entry auto-closed"
        );

        let language = Language::from_tag(entry.preferred_language.as_deref());
        let body = auto_closed_message(language, &message_context(entry, plan));
        deliver(self.sms.as_ref(), entry, &body).await;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schedule::ShiftTime;
    use crate::notify::sms::testing::RecordingSmsSender;
    use chrono::TimeZone;

    fn template() -> ScheduleTemplate {
        ScheduleTemplate {
            shift_start_time: ShiftTime::parse("08:00").unwrap(),
            shift_end_time: ShiftTime::parse("17:00").unwrap(),
            auto_close_enabled: true,
            auto_close_first_reminder: 30,
            auto_close_window_minutes: 120,
            ..ScheduleTemplate::default()
        }
    }

    fn open_entry(phone: Option<&str>, language: Option<&str>) -> OpenEntry {
        OpenEntry {
            entry_id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            dealership_id: 7,
            // 08:00 in Chicago (CST, UTC-6)
            clock_in: Utc.with_ymd_and_hms(2026, 1, 12, 14, 0, 0).unwrap(),
            reminder_sent_at: None,
            schedule_template: Json(template()),
            first_name: "Luis".to_string(),
            phone: phone.map(str::to_string),
            preferred_language: language.map(str::to_string),
            dealership_name: "Lakeside Auto".to_string(),
            dealership_timezone: Some("America/Chicago".to_string()),
        }
    }

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 12, h, m, 0).unwrap()
    }

    #[test]
    fn test_plan_follows_dealership_timezone() {
        let entry = open_entry(None, None);
        let default_tz = chrono_tz::America::New_York;

        // Shift ends 17:00 CST = 23:00 UTC
        assert_eq!(plan_entry(&entry, utc(23, 29), default_tz).unwrap().action, AutoCloseAction::Wait);
        let reminder = plan_entry(&entry, utc(23, 30), default_tz).unwrap();
        assert_eq!(reminder.action, AutoCloseAction::SendReminder);
        assert_eq!(reminder.schedule.anchor, utc(23, 0));

        let close_at = Utc.with_ymd_and_hms(2026, 1, 13, 1, 0, 0).unwrap();
        assert_eq!(plan_entry(&entry, close_at, default_tz).unwrap().action, AutoCloseAction::ForceClose);
    }

    #[test]
    fn test_reminder_not_repeated() {
        let mut entry = open_entry(None, None);
        entry.reminder_sent_at = Some(utc(23, 30));
        let plan = plan_entry(&entry, utc(23, 45), chrono_tz::UTC).unwrap();
        assert_eq!(plan.action, AutoCloseAction::Wait);
    }

    #[test]
    fn test_disabled_template_is_skipped() {
        let mut entry = open_entry(None, None);
        entry.schedule_template.0.auto_close_enabled = false;
        assert!(plan_entry(&entry, utc(23, 59), chrono_tz::UTC).is_none());
    }

    #[test]
    fn test_message_context_uses_local_times() {
        let entry = open_entry(None, None);
        let plan = plan_entry(&entry, utc(23, 30), chrono_tz::UTC).unwrap();
        let ctx = message_context(&entry, &plan);
        assert_eq!(ctx.shift_end, "17:00");
        assert_eq!(ctx.auto_close_at, "19:00");
    }

    #[tokio::test]
    async fn test_deliver_sends_localized_reminder() {
        let sms = RecordingSmsSender::default();
        let entry = open_entry(Some("+15550100"), Some("pt-BR"));
        let plan = plan_entry(&entry, utc(23, 30), chrono_tz::UTC).unwrap();
        let body = reminder_message(Language::from_tag(entry.preferred_language.as_deref()), &message_context(&entry, &plan));

        assert!(deliver(&sms, &entry, &body).await);

        let sent = sms.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+15550100");
        assert!(sent[0].1.starts_with("Olá Luis"));
    }

    #[tokio::test]
    async fn test_deliver_without_phone_or_with_failure() {
        let sms = RecordingSmsSender {
            failing: vec!["+15550199".to_string()],
            ..RecordingSmsSender::default()
        };

        assert!(!deliver(&sms, &open_entry(None, None), "hello").await);
        assert!(!deliver(&sms, &open_entry(Some("  "), None), "hello").await);
        assert!(!deliver(&sms, &open_entry(Some("+15550199"), None), "hello").await);
        assert!(sms.sent.lock().unwrap().is_empty());
    }
}
