use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Detail Hub API",
        version = "1.0.0",
        description = "Time clock, schedules and supervisor review for dealership detail teams",
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    paths(
        // Health
        crate::handlers::health::health_check,

        // Auth
        crate::handlers::auth_handler::get_me,

        // Employees
        crate::handlers::employees_handler::get_employees,
        crate::handlers::employees_handler::get_employee,
        crate::handlers::employees_handler::get_next_employee_number,
        crate::handlers::employees_handler::generate_pin,
        crate::handlers::employees_handler::create_employee,
        crate::handlers::employees_handler::update_employee,
        crate::handlers::employees_handler::enroll_face,

        // Assignments and schedules
        crate::handlers::assignments_handler::get_assignments,
        crate::handlers::assignments_handler::create_assignment,
        crate::handlers::assignments_handler::update_assignment,
        crate::handlers::assignments_handler::terminate_assignment,
        crate::handlers::assignments_handler::get_assignment_summary,
        crate::handlers::assignments_handler::preview_schedule,

        // Time entries and review
        crate::handlers::time_entries_handler::get_time_entries,
        crate::handlers::time_entries_handler::get_pending_review,
        crate::handlers::time_entries_handler::approve_time_entry,
        crate::handlers::time_entries_handler::adjust_time_entry,

        // Kiosks
        crate::handlers::kiosks_handler::get_kiosks,
        crate::handlers::kiosks_handler::create_kiosk,
        crate::handlers::kiosks_handler::update_kiosk,
        crate::handlers::kiosks_handler::delete_kiosk,
        crate::handlers::kiosks_handler::create_kiosk_url_token,
        crate::handlers::kiosks_handler::get_kiosk_configuration,
        crate::handlers::kiosks_handler::configure_kiosk,
        crate::handlers::kiosks_handler::clear_kiosk_configuration,
        crate::handlers::kiosk_punch_handler::get_kiosk_status,
        crate::handlers::kiosk_punch_handler::kiosk_punch,

        // Invitations
        crate::handlers::invitations_handler::create_invitation,
        crate::handlers::invitations_handler::verify_invitation,
        crate::handlers::invitations_handler::accept_invitation,
        crate::handlers::invitations_handler::cancel_invitation,

        // Audit
        crate::handlers::audit_handler::get_audit,

        // Reports
        crate::handlers::reports_handler::get_timecard_report,

        // Preferences
        crate::handlers::preferences_handler::get_preference,
        crate::handlers::preferences_handler::put_preference,
        crate::handlers::preferences_handler::delete_preference,
    ),
    components(
        schemas(
            // Domain
            crate::domain::ScheduleTemplate,
            crate::domain::ScheduleSummary,
            crate::domain::AutoCloseTimeline,
            crate::domain::auto_close::TimelinePoint,
            crate::domain::PunchKind,
            crate::domain::PunchState,
            crate::domain::PunchWindowCheck,
            crate::domain::TimecardSummary,
            crate::domain::invitation::InvitationStatus,
            crate::notify::Language,

            // Core models
            crate::models::Profile,
            crate::models::DealershipMembership,
            crate::models::MeResponse,
            crate::models::Employee,
            crate::models::Assignment,
            crate::models::TimeEntry,
            crate::models::TimeEntryWithEmployee,
            crate::models::Kiosk,
            crate::models::KioskDeviceConfig,
            crate::models::Invitation,
            crate::models::AuditEntry,

            // Input models
            crate::models::CreateEmployeeInput,
            crate::models::UpdateEmployeeInput,
            crate::models::FaceEnrollmentInput,
            crate::models::CreateAssignmentInput,
            crate::models::UpdateAssignmentInput,
            crate::models::TerminateAssignmentInput,
            crate::models::TerminationKind,
            crate::models::SchedulePreviewInput,
            crate::models::AdjustTimeEntryInput,
            crate::models::CreateKioskInput,
            crate::models::UpdateKioskInput,
            crate::models::ConfigureKioskInput,
            crate::models::KioskPunchInput,
            crate::models::CreateInvitationInput,

            // Responses
            crate::models::GeneratedPinResponse,
            crate::models::NextEmployeeNumberResponse,
            crate::models::SchedulePreviewResponse,
            crate::models::TimeEntryMutationResponse,
            crate::models::KioskUrlResponse,
            crate::models::KioskPunchResponse,
            crate::models::KioskStatusResponse,
            crate::models::CreatedInvitation,
            crate::models::InvitationVerifyResponse,
            crate::models::InvitationMutationResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "employees", description = "Employee management, PINs and face enrollment"),
        (name = "assignments", description = "Employee assignments and schedule templates"),
        (name = "time-entries", description = "Time entries and supervisor review"),
        (name = "kiosks", description = "Kiosk management"),
        (name = "kiosk", description = "Kiosk device endpoints (kiosk token)"),
        (name = "invitations", description = "Dealership invitations"),
        (name = "audit", description = "Time entry audit trail"),
        (name = "reports", description = "Timecard reports"),
        (name = "preferences", description = "Per-user saved preferences"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "cookie_auth",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("__session"))),
            );
            components.add_security_scheme(
                "kiosk_token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Kiosk-Token"))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_kiosk_and_review_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/kiosk/punch",
            "/api/time-entries/{id}/approve",
            "/api/schedules/preview",
            "/api/invitations/accept/{token}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
        let schemes = doc.components.unwrap().security_schemes;
        assert!(schemes.contains_key("cookie_auth"));
        assert!(schemes.contains_key("kiosk_token"));
    }
}
