use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth,
    db::config_store::{load_typed, save_typed},
    extractors::{permissions, AuthenticatedUser, KioskDevice, Permission},
    models::{ConfigureKioskInput, CreateKioskInput, Kiosk, KioskDeviceConfig, KioskUrlResponse, UpdateKioskInput},
    AppError, AppResult, AppState,
};

const KIOSK_STATUSES: [&str; 2] = ["active", "inactive"];
const DEVICE_CONFIG_KEY: &str = "device";

pub fn kiosk_scope(kiosk_id: Uuid) -> String {
    format!("kiosk:{}", kiosk_id)
}

async fn fetch_kiosk(db: &sqlx::PgPool, kiosk_id: Uuid) -> AppResult<Kiosk> {
    sqlx::query_as::<_, Kiosk>(r#"SELECT * FROM "Kiosks" WHERE id = $1"#)
        .bind(kiosk_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Kiosk {} not found", kiosk_id)))
}

/// The kiosk token only grants access to its own kiosk.
fn ensure_same_kiosk(device: &KioskDevice, kiosk_id: Uuid) -> AppResult<()> {
    if device.kiosk.id != kiosk_id {
        tracing::warn!(token_kiosk = %device.kiosk.id, path_kiosk = %kiosk_id, "Kiosk token used for another kiosk");
        return Err(AppError::Forbidden("Kiosk token does not match this kiosk".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GetKiosksQuery {
    #[serde(rename = "dealershipId")]
    pub dealership_id: i32,
}

/// GET /api/kiosks?dealershipId=
#[utoipa::path(
    get,
    path = "/api/kiosks",
    params(GetKiosksQuery),
    responses(
        (status = 200, description = "Kiosks of the dealership", body = Vec<Kiosk>)
    ),
    tag = "kiosks",
    security(("cookie_auth" = []))
)]
pub async fn get_kiosks(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Query(query): Query<GetKiosksQuery>,
) -> AppResult<Json<Vec<Kiosk>>> {
    permissions::require_member(&state.db, &auth, query.dealership_id).await?;

    let kiosks = sqlx::query_as::<_, Kiosk>(
        r#"SELECT * FROM "Kiosks" WHERE dealership_id = $1 ORDER BY name"#,
    )
    .bind(query.dealership_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(kiosks))
}

/// POST /api/kiosks
#[utoipa::path(
    post,
    path = "/api/kiosks",
    request_body = CreateKioskInput,
    responses(
        (status = 200, description = "Kiosk created", body = Kiosk),
        (status = 403, description = "Missing can_manage_kiosks permission")
    ),
    tag = "kiosks",
    security(("cookie_auth" = []))
)]
pub async fn create_kiosk(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(input): Json<CreateKioskInput>,
) -> AppResult<Json<Kiosk>> {
    if input.name.trim().is_empty() {
        return Err(AppError::Validation("Kiosk name must not be empty".to_string()));
    }

    permissions::require_permission(&state.db, &auth, input.dealership_id, Permission::ManageKiosks).await?;

    let kiosk = sqlx::query_as::<_, Kiosk>(
        r#"
        INSERT INTO "Kiosks" (id, dealership_id, name, location, face_recognition_enabled, status)
        VALUES ($1, $2, $3, $4, $5, 'active')
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(input.dealership_id)
    .bind(input.name.trim())
    .bind(&input.location)
    .bind(input.face_recognition_enabled)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(kiosk_id = %kiosk.id, dealership_id = kiosk.dealership_id, "Kiosk created");
    Ok(Json(kiosk))
}

/// PUT /api/kiosks/{id}
#[utoipa::path(
    put,
    path = "/api/kiosks/{id}",
    params(("id" = Uuid, Path, description = "Kiosk ID")),
    request_body = UpdateKioskInput,
    responses(
        (status = 200, description = "Kiosk updated", body = Kiosk),
        (status = 400, description = "No fields to update"),
        (status = 404, description = "Kiosk not found")
    ),
    tag = "kiosks",
    security(("cookie_auth" = []))
)]
pub async fn update_kiosk(
    State(state): State<Arc<AppState>>,
    Path(kiosk_id): Path<Uuid>,
    auth: AuthenticatedUser,
    Json(input): Json<UpdateKioskInput>,
) -> AppResult<Json<Kiosk>> {
    if let Some(status) = &input.status {
        if !KIOSK_STATUSES.contains(&status.as_str()) {
            return Err(AppError::Validation(format!("Invalid kiosk status: {}", status)));
        }
    }

    let existing = fetch_kiosk(&state.db, kiosk_id).await?;
    permissions::require_permission(&state.db, &auth, existing.dealership_id, Permission::ManageKiosks).await?;

    let mut updates = vec![];
    let mut bind_count = 1;

    if input.name.is_some() {
        updates.push(format!("name = ${}", bind_count));
        bind_count += 1;
    }
    if input.location.is_some() {
        updates.push(format!("location = ${}", bind_count));
        bind_count += 1;
    }
    if input.face_recognition_enabled.is_some() {
        updates.push(format!("face_recognition_enabled = ${}", bind_count));
        bind_count += 1;
    }
    if input.status.is_some() {
        updates.push(format!("status = ${}", bind_count));
        bind_count += 1;
    }

    if updates.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let sql = format!(
        r#"UPDATE "Kiosks" SET {} WHERE id = ${} RETURNING *"#,
        updates.join(", "),
        bind_count
    );

    let mut query = sqlx::query_as::<_, Kiosk>(&sql);
    if let Some(name) = &input.name {
        query = query.bind(name.trim());
    }
    if let Some(location) = &input.location {
        query = query.bind(location);
    }
    if let Some(enabled) = input.face_recognition_enabled {
        query = query.bind(enabled);
    }
    if let Some(status) = &input.status {
        query = query.bind(status);
    }

    let kiosk = query.bind(kiosk_id).fetch_one(&state.db).await?;
    Ok(Json(kiosk))
}

/// DELETE /api/kiosks/{id} - Deactivate a kiosk; its tokens stop working
#[utoipa::path(
    delete,
    path = "/api/kiosks/{id}",
    params(("id" = Uuid, Path, description = "Kiosk ID")),
    responses(
        (status = 200, description = "Kiosk deactivated", body = Kiosk),
        (status = 404, description = "Kiosk not found")
    ),
    tag = "kiosks",
    security(("cookie_auth" = []))
)]
pub async fn delete_kiosk(
    State(state): State<Arc<AppState>>,
    Path(kiosk_id): Path<Uuid>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Kiosk>> {
    let existing = fetch_kiosk(&state.db, kiosk_id).await?;
    permissions::require_permission(&state.db, &auth, existing.dealership_id, Permission::ManageKiosks).await?;

    let kiosk = sqlx::query_as::<_, Kiosk>(
        r#"UPDATE "Kiosks" SET status = 'inactive' WHERE id = $1 RETURNING *"#,
    )
    .bind(kiosk_id)
    .fetch_one(&state.db)
    .await?;

    state.config_store.clear(&kiosk_scope(kiosk_id), DEVICE_CONFIG_KEY).await?;

    tracing::info!(%kiosk_id, "Kiosk deactivated");
    Ok(Json(kiosk))
}

/// POST /api/kiosks/{id}/url-token - Issue a signed kiosk URL
#[utoipa::path(
    post,
    path = "/api/kiosks/{id}/url-token",
    params(("id" = Uuid, Path, description = "Kiosk ID")),
    responses(
        (status = 200, description = "Signed kiosk URL", body = KioskUrlResponse),
        (status = 403, description = "Missing can_manage_kiosks permission"),
        (status = 409, description = "Kiosk is inactive")
    ),
    tag = "kiosks",
    security(("cookie_auth" = []))
)]
pub async fn create_kiosk_url_token(
    State(state): State<Arc<AppState>>,
    Path(kiosk_id): Path<Uuid>,
    auth: AuthenticatedUser,
) -> AppResult<Json<KioskUrlResponse>> {
    let kiosk = fetch_kiosk(&state.db, kiosk_id).await?;
    permissions::require_permission(&state.db, &auth, kiosk.dealership_id, Permission::ManageKiosks).await?;

    if kiosk.status != "active" {
        return Err(AppError::Conflict("Cannot issue a token for an inactive kiosk".to_string()));
    }

    let ttl = chrono::Duration::hours(state.config.kiosk_token_ttl_hours);
    let (token, expires_at) = auth::generate_kiosk_token(kiosk_id, ttl, &state.config.token_signing_secret)?;
    let url = format!("{}?token={}", state.config.kiosk_base_url.trim_end_matches('/'), token);

    tracing::info!(%kiosk_id, %expires_at, "Kiosk token issued");
    Ok(Json(KioskUrlResponse { kiosk_id, token, url, expires_at }))
}

/// GET /api/kiosks/{id}/configure - Stored device configuration
#[utoipa::path(
    get,
    path = "/api/kiosks/{id}/configure",
    params(("id" = Uuid, Path, description = "Kiosk ID")),
    responses(
        (status = 200, description = "Device configuration, null when unconfigured", body = KioskDeviceConfig),
        (status = 403, description = "Token belongs to another kiosk")
    ),
    tag = "kiosk",
    security(("kiosk_token" = []))
)]
pub async fn get_kiosk_configuration(
    State(state): State<Arc<AppState>>,
    Path(kiosk_id): Path<Uuid>,
    device: KioskDevice,
) -> AppResult<Json<Option<KioskDeviceConfig>>> {
    ensure_same_kiosk(&device, kiosk_id)?;
    let config = load_typed(state.config_store.as_ref(), &kiosk_scope(kiosk_id), DEVICE_CONFIG_KEY).await?;
    Ok(Json(config))
}

/// POST /api/kiosks/{id}/configure - Bind this device to the kiosk
#[utoipa::path(
    post,
    path = "/api/kiosks/{id}/configure",
    params(("id" = Uuid, Path, description = "Kiosk ID")),
    request_body = ConfigureKioskInput,
    responses(
        (status = 200, description = "Device configuration saved", body = KioskDeviceConfig),
        (status = 403, description = "Token belongs to another kiosk")
    ),
    tag = "kiosk",
    security(("kiosk_token" = []))
)]
pub async fn configure_kiosk(
    State(state): State<Arc<AppState>>,
    Path(kiosk_id): Path<Uuid>,
    device: KioskDevice,
    Json(input): Json<ConfigureKioskInput>,
) -> AppResult<Json<KioskDeviceConfig>> {
    ensure_same_kiosk(&device, kiosk_id)?;

    let fingerprint = input.device_fingerprint.trim();
    if fingerprint.is_empty() {
        return Err(AppError::Validation("device_fingerprint must not be empty".to_string()));
    }

    let config = KioskDeviceConfig {
        kiosk_id,
        device_fingerprint: fingerprint.to_string(),
        configured_at: Utc::now(),
    };
    save_typed(state.config_store.as_ref(), &kiosk_scope(kiosk_id), DEVICE_CONFIG_KEY, &config).await?;

    tracing::info!(%kiosk_id, "Kiosk device configured");
    Ok(Json(config))
}

/// DELETE /api/kiosks/{id}/configure - Reset the device binding
#[utoipa::path(
    delete,
    path = "/api/kiosks/{id}/configure",
    params(("id" = Uuid, Path, description = "Kiosk ID")),
    responses(
        (status = 200, description = "Device configuration cleared"),
        (status = 404, description = "Kiosk was not configured")
    ),
    tag = "kiosk",
    security(("kiosk_token" = []))
)]
pub async fn clear_kiosk_configuration(
    State(state): State<Arc<AppState>>,
    Path(kiosk_id): Path<Uuid>,
    device: KioskDevice,
) -> AppResult<Json<serde_json::Value>> {
    ensure_same_kiosk(&device, kiosk_id)?;

    if !state.config_store.clear(&kiosk_scope(kiosk_id), DEVICE_CONFIG_KEY).await? {
        return Err(AppError::NotFound("Kiosk is not configured".to_string()));
    }

    tracing::info!(%kiosk_id, "Kiosk device configuration cleared");
    Ok(Json(serde_json::json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::config_store::testing::MemoryConfigStore;
    use crate::db::ConfigStore;

    fn device(kiosk_id: Uuid) -> KioskDevice {
        KioskDevice {
            kiosk: Kiosk {
                id: kiosk_id,
                dealership_id: 1,
                name: "Front desk".to_string(),
                location: None,
                face_recognition_enabled: false,
                status: "active".to_string(),
                last_seen_at: None,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_token_restricted_to_own_kiosk() {
        let id = Uuid::new_v4();
        assert!(ensure_same_kiosk(&device(id), id).is_ok());
        assert!(matches!(
            ensure_same_kiosk(&device(id), Uuid::new_v4()),
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_device_config_scoped_per_kiosk() {
        let store = MemoryConfigStore::default();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let config = KioskDeviceConfig {
            kiosk_id: first,
            device_fingerprint: "tablet-7".to_string(),
            configured_at: Utc::now(),
        };

        save_typed(&store, &kiosk_scope(first), DEVICE_CONFIG_KEY, &config).await.unwrap();

        let other: Option<KioskDeviceConfig> = load_typed(&store, &kiosk_scope(second), DEVICE_CONFIG_KEY).await.unwrap();
        assert!(other.is_none());
        assert!(!store.clear(&kiosk_scope(second), DEVICE_CONFIG_KEY).await.unwrap());
        assert!(store.clear(&kiosk_scope(first), DEVICE_CONFIG_KEY).await.unwrap());
    }
}
