use moka::future::Cache;
use once_cell::sync::Lazy;
use std::time::Duration;
use uuid::Uuid;

use crate::{extractors::AuthenticatedUser, models::DealershipMembership, AppError, AppResult};

// Memberships per profile (30-second TTL)
static MEMBERSHIP_CACHE: Lazy<Cache<Uuid, Vec<DealershipMembership>>> = Lazy::new(|| {
    Cache::builder()
        .time_to_live(Duration::from_secs(30))
        .max_capacity(1_000)
        .build()
});

pub async fn get_cached_memberships(db: &sqlx::PgPool, profile_id: Uuid) -> Result<Vec<DealershipMembership>, sqlx::Error> {
    if let Some(cached) = MEMBERSHIP_CACHE.get(&profile_id).await {
        return Ok(cached);
    }

    let memberships = sqlx::query_as::<_, DealershipMembership>(
        r#"SELECT * FROM "DealershipMemberships" WHERE profile_id = $1"#,
    )
    .bind(profile_id)
    .fetch_all(db)
    .await?;

    MEMBERSHIP_CACHE.insert(profile_id, memberships.clone()).await;
    Ok(memberships)
}

pub async fn invalidate_memberships(profile_id: Uuid) {
    MEMBERSHIP_CACHE.invalidate(&profile_id).await;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ManageEmployees,
    ManageSchedules,
    ReviewTimecards,
    ManageKiosks,
    ViewReports,
}

impl Permission {
    pub fn name(&self) -> &'static str {
        match self {
            Permission::ManageEmployees => "can_manage_employees",
            Permission::ManageSchedules => "can_manage_schedules",
            Permission::ReviewTimecards => "can_review_timecards",
            Permission::ManageKiosks => "can_manage_kiosks",
            Permission::ViewReports => "can_view_reports",
        }
    }

    pub fn granted_by(&self, membership: &DealershipMembership) -> bool {
        match self {
            Permission::ManageEmployees => membership.can_manage_employees,
            Permission::ManageSchedules => membership.can_manage_schedules,
            Permission::ReviewTimecards => membership.can_review_timecards,
            Permission::ManageKiosks => membership.can_manage_kiosks,
            Permission::ViewReports => membership.can_view_reports,
        }
    }
}

/// Default flags for a membership role granted through an invitation.
/// Order: employees, schedules, timecards, kiosks, reports.
pub fn role_defaults(role: &str) -> [bool; 5] {
    match role {
        "dealer_admin" => [true, true, true, true, true],
        "manager" => [true, true, true, false, true],
        _ => [false, false, false, false, true],
    }
}

pub fn membership_grants(memberships: &[DealershipMembership], dealership_id: i32, permission: Permission) -> bool {
    memberships
        .iter()
        .any(|m| m.dealership_id == dealership_id && permission.granted_by(m))
}

/// Check if the user holds `permission` at the dealership. System admins pass.
pub async fn has_permission(
    db: &sqlx::PgPool,
    auth: &AuthenticatedUser,
    dealership_id: i32,
    permission: Permission,
) -> Result<bool, sqlx::Error> {
    if auth.is_system_admin {
        return Ok(true);
    }

    let memberships = get_cached_memberships(db, auth.profile_id).await?;
    Ok(membership_grants(&memberships, dealership_id, permission))
}

pub async fn require_permission(
    db: &sqlx::PgPool,
    auth: &AuthenticatedUser,
    dealership_id: i32,
    permission: Permission,
) -> AppResult<()> {
    if has_permission(db, auth, dealership_id, permission).await? {
        return Ok(());
    }

    tracing::warn!(profile_id = %auth.profile_id, dealership_id, permission = permission.name(), "Permission denied");
    Err(AppError::Forbidden(format!("Missing {} permission", permission.name())))
}

/// Any membership at the dealership, regardless of flags.
pub async fn require_member(db: &sqlx::PgPool, auth: &AuthenticatedUser, dealership_id: i32) -> AppResult<()> {
    if auth.is_system_admin {
        return Ok(());
    }

    let memberships = get_cached_memberships(db, auth.profile_id).await?;
    if memberships.iter().any(|m| m.dealership_id == dealership_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("Not a member of dealership {}", dealership_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn membership(dealership_id: i32, role: &str) -> DealershipMembership {
        let [employees, schedules, timecards, kiosks, reports] = role_defaults(role);
        DealershipMembership {
            id: 1,
            profile_id: Uuid::new_v4(),
            dealership_id,
            role: role.to_string(),
            can_manage_employees: employees,
            can_manage_schedules: schedules,
            can_review_timecards: timecards,
            can_manage_kiosks: kiosks,
            can_view_reports: reports,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_grants_are_scoped_to_dealership() {
        let memberships = vec![membership(1, "manager"), membership(2, "viewer")];
        assert!(membership_grants(&memberships, 1, Permission::ReviewTimecards));
        assert!(!membership_grants(&memberships, 2, Permission::ReviewTimecards));
        assert!(membership_grants(&memberships, 2, Permission::ViewReports));
        assert!(!membership_grants(&memberships, 3, Permission::ViewReports));
    }

    #[test]
    fn test_manager_cannot_manage_kiosks() {
        let memberships = vec![membership(1, "manager")];
        assert!(!membership_grants(&memberships, 1, Permission::ManageKiosks));
        let admins = vec![membership(1, "dealer_admin")];
        assert!(membership_grants(&admins, 1, Permission::ManageKiosks));
    }
}
