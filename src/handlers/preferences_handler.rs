use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use crate::{extractors::AuthenticatedUser, AppError, AppResult, AppState};

const MAX_KEY_LEN: usize = 64;

fn profile_scope(auth: &AuthenticatedUser) -> String {
    format!("profile:{}", auth.profile_id)
}

fn validate_key(key: &str) -> AppResult<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Invalid preference key: {}", key)))
    }
}

/// GET /api/preferences/{key}
#[utoipa::path(
    get,
    path = "/api/preferences/{key}",
    params(("key" = String, Path, description = "Preference key, e.g. employee-filters")),
    responses(
        (status = 200, description = "Stored value, null when unset")
    ),
    tag = "preferences",
    security(("cookie_auth" = []))
)]
pub async fn get_preference(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Value>> {
    validate_key(&key)?;
    let value = state.config_store.load(&profile_scope(&auth), &key).await?;
    Ok(Json(value.unwrap_or(Value::Null)))
}

/// PUT /api/preferences/{key}
#[utoipa::path(
    put,
    path = "/api/preferences/{key}",
    params(("key" = String, Path, description = "Preference key")),
    responses(
        (status = 200, description = "Preference saved")
    ),
    tag = "preferences",
    security(("cookie_auth" = []))
)]
pub async fn put_preference(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    auth: AuthenticatedUser,
    Json(value): Json<Value>,
) -> AppResult<Json<Value>> {
    validate_key(&key)?;
    state.config_store.save(&profile_scope(&auth), &key, value.clone()).await?;
    Ok(Json(value))
}

/// DELETE /api/preferences/{key}
#[utoipa::path(
    delete,
    path = "/api/preferences/{key}",
    params(("key" = String, Path, description = "Preference key")),
    responses(
        (status = 200, description = "Preference cleared")
    ),
    tag = "preferences",
    security(("cookie_auth" = []))
)]
pub async fn delete_preference(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Value>> {
    validate_key(&key)?;
    let existed = state.config_store.clear(&profile_scope(&auth), &key).await?;
    Ok(Json(serde_json::json!({ "success": true, "existed": existed })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_keys() {
        assert!(validate_key("employee-filters").is_ok());
        assert!(validate_key("review.sort_order").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc").is_err());
        assert!(validate_key(&"k".repeat(65)).is_err());
    }
}
