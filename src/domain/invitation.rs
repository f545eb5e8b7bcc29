use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
    Cancelled,
}

/// Acceptance and cancellation are terminal; expiry only applies to
/// invitations still pending.
pub fn invitation_status(
    accepted_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> InvitationStatus {
    if accepted_at.is_some() {
        InvitationStatus::Accepted
    } else if cancelled_at.is_some() {
        InvitationStatus::Cancelled
    } else if now >= expires_at {
        InvitationStatus::Expired
    } else {
        InvitationStatus::Pending
    }
}

/// 32 random bytes, hex-encoded.
pub fn generate_invitation_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_precedence() {
        let now = Utc::now();
        let past = now - Duration::hours(1);
        let future = now + Duration::hours(1);

        assert_eq!(invitation_status(None, None, future, now), InvitationStatus::Pending);
        assert_eq!(invitation_status(None, None, past, now), InvitationStatus::Expired);
        assert_eq!(invitation_status(Some(past), None, past, now), InvitationStatus::Accepted);
        assert_eq!(invitation_status(None, Some(past), future, now), InvitationStatus::Cancelled);
    }

    #[test]
    fn test_token_shape() {
        let token = generate_invitation_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_invitation_token());
    }
}
