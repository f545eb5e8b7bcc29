use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    extractors::{permissions, AuthenticatedUser},
    models::{MeResponse, Profile},
    AppResult, AppState,
};

/// GET /api/auth/me
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current profile and its dealership memberships", body = MeResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(
        ("cookie_auth" = [])
    )
)]
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> AppResult<Json<MeResponse>> {
    let profile = sqlx::query_as::<_, Profile>(r#"SELECT * FROM "Profiles" WHERE id = $1"#)
        .bind(auth.profile_id)
        .fetch_one(&state.db)
        .await?;

    let memberships = permissions::get_cached_memberships(&state.db, auth.profile_id).await?;

    Ok(Json(MeResponse { profile, memberships }))
}
