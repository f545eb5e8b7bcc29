use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::{auth, models::{Kiosk, Profile}, AppError, AppResult, AppState};

type Rejection = (StatusCode, axum::Json<serde_json::Value>);

fn reject(status: StatusCode, message: impl Into<String>) -> Rejection {
    (status, axum::Json(json!({ "error": message.into() })))
}

impl From<AppError> for Rejection {
    fn from(e: AppError) -> Self {
        let status = match &e {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        reject(status, e.to_string())
    }
}

/// Extracts JWT token from either __session cookie (frontend) or Authorization header (testing)
fn extract_token_from_request(parts: &Parts) -> Option<String> {
    let from_cookie = parts
        .headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .find_map(|c| c.trim().strip_prefix("__session=").map(str::to_string))
        });

    from_cookie.or_else(|| {
        parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    })
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub clerk_user_id: String,
    pub email: String,
    pub profile_id: Uuid,
    pub is_system_admin: bool,
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = Rejection;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let token = extract_token_from_request(parts);
        let state = state.clone();

        async move {
            let token = token.ok_or_else(|| {
                reject(
                    StatusCode::UNAUTHORIZED,
                    "Missing authentication: no __session cookie or Authorization header",
                )
            })?;

            let expected_issuer = format!("https://{}", state.config.clerk_domain);
            let claims = auth::validate_jwt(&token, &state.jwks_cache, &expected_issuer).await?;
            let clerk_user_id = claims.sub.clone();

            // Linked profiles are the common case; email is only needed to auto-link
            let linked = sqlx::query_as::<_, Profile>(r#"SELECT * FROM "Profiles" WHERE auth_id = $1"#)
                .bind(&clerk_user_id)
                .fetch_optional(&state.db)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, clerk_user_id, "Profile lookup failed");
                    reject(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
                })?;

            if let Some(profile) = linked {
                tracing::debug!(clerk_user_id, profile_id = %profile.id, "Profile found by auth_id");
                return Ok(AuthenticatedUser {
                    clerk_user_id,
                    email: profile.email,
                    profile_id: profile.id,
                    is_system_admin: profile.is_system_admin,
                });
            }

            let email = match claims.email {
                Some(email) => email,
                None => resolve_email(&state, &clerk_user_id).await?,
            };

            let profile = link_profile_by_email(&state.db, &clerk_user_id, &email).await?;

            Ok(AuthenticatedUser {
                clerk_user_id,
                email: profile.email,
                profile_id: profile.id,
                is_system_admin: profile.is_system_admin,
            })
        }
    }
}

async fn resolve_email(state: &AppState, clerk_user_id: &str) -> AppResult<String> {
    if let Some(cached) = state.user_cache.get(clerk_user_id).await {
        tracing::debug!(clerk_user_id, "Email resolved from cache");
        return Ok(cached);
    }

    let email = auth::fetch_primary_email(clerk_user_id, &state.config.clerk_secret_key).await?;
    state.user_cache.insert(clerk_user_id.to_string(), email.clone()).await;
    Ok(email)
}

async fn link_profile_by_email(db: &sqlx::PgPool, clerk_user_id: &str, email: &str) -> AppResult<Profile> {
    let profile = sqlx::query_as::<_, Profile>(
        r#"
        UPDATE "Profiles"
        SET auth_id = $1
        WHERE LOWER(email) = LOWER($2) AND auth_id IS NULL
        RETURNING *
        "#,
    )
    .bind(clerk_user_id)
    .bind(email)
    .fetch_optional(db)
    .await?;

    match profile {
        Some(profile) => {
            tracing::info!(clerk_user_id, profile_id = %profile.id, email, "Profile auto-linked by email");
            Ok(profile)
        }
        None => {
            tracing::warn!(clerk_user_id, email, "No profile available for auto-linking");
            Err(AppError::Unauthorized(format!("Profile not found for email: {}", email)))
        }
    }
}

/// A kiosk authenticated by the signed token in `X-Kiosk-Token`.
#[derive(Debug, Clone)]
pub struct KioskDevice {
    pub kiosk: Kiosk,
}

impl FromRequestParts<Arc<AppState>> for KioskDevice {
    type Rejection = Rejection;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let token = parts
            .headers
            .get("X-Kiosk-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let state = state.clone();

        async move {
            let token = token.ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Missing X-Kiosk-Token header"))?;
            let kiosk_id = auth::validate_kiosk_token(&token, &state.config.token_signing_secret)?;

            let kiosk = sqlx::query_as::<_, Kiosk>(
                r#"UPDATE "Kiosks" SET last_seen_at = now() WHERE id = $1 RETURNING *"#,
            )
            .bind(kiosk_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %kiosk_id, "Kiosk lookup failed");
                reject(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
            })?
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Kiosk no longer exists"))?;

            if kiosk.status != "active" {
                tracing::warn!(%kiosk_id, status = %kiosk.status, "Inactive kiosk attempted access");
                return Err(reject(StatusCode::FORBIDDEN, "Kiosk is not active"));
            }

            Ok(KioskDevice { kiosk })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/employees");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_token_from_session_cookie() {
        let p = parts(&[("cookie", "theme=dark; __session=abc.def.ghi; other=1")]);
        assert_eq!(extract_token_from_request(&p).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_token_from_bearer_header() {
        let p = parts(&[("authorization", "Bearer xyz")]);
        assert_eq!(extract_token_from_request(&p).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_cookie_wins_over_header() {
        let p = parts(&[("cookie", "__session=from-cookie"), ("authorization", "Bearer from-header")]);
        assert_eq!(extract_token_from_request(&p).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_no_token() {
        assert!(extract_token_from_request(&parts(&[])).is_none());
    }
}
