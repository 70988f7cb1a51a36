use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use quad_shared::clients::db::checkout;
use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::types::auth::AuthUser;
use quad_shared::types::ApiResponse;

use crate::models::{Profile, User};
use crate::services::profile_service::{self, Capabilities, ProfileChanges, UserSummary};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub profile: Profile,
    pub capabilities: Capabilities,
}

// --- GET /me ---

pub async fn get_me(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<MeResponse>>> {
    let mut conn = checkout(&state.db)?;

    let account = profile_service::require_user(&mut conn, user.id)?;
    let profile = profile_service::get_or_create_profile(&mut conn, user.id)?;
    let capabilities = Capabilities::resolve(Some(&profile), user.is_admin())?;

    Ok(Json(ApiResponse::ok(MeResponse { user: account, profile, capabilities })))
}

// --- PATCH /me ---

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 150))]
    pub display_name: Option<String>,
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
    pub role: Option<String>,
}

pub async fn update_me(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = checkout(&state.db)?;
    let profile = profile_service::update_profile(
        &mut conn,
        user.id,
        ProfileChanges {
            display_name: req.display_name,
            bio: req.bio,
            role: req.role,
        },
    )?;

    Ok(Json(ApiResponse::ok(profile)))
}

// --- DELETE /me ---

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

pub async fn delete_me(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<DeletedResponse>>> {
    let image_keys = {
        let mut conn = checkout(&state.db)?;
        profile_service::delete_account(&mut conn, user.id)?
    };

    let failed = state.storage.delete_all(&image_keys).await;
    if failed > 0 {
        tracing::warn!(user_id = %user.id, failed, "some post images were not removed from storage");
    }

    Ok(Json(ApiResponse::ok(DeletedResponse { deleted: true })))
}

// --- GET /users/search?q= ---

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn search_users(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<ApiResponse<Vec<UserSummary>>>> {
    let mut conn = checkout(&state.db)?;
    let results = profile_service::search_users(&mut conn, user.id, &params.q, state.config.search_limit)?;
    Ok(Json(ApiResponse::ok(results)))
}

// --- GET /users/:id ---

pub async fn get_user(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<UserSummary>>> {
    let mut conn = checkout(&state.db)?;
    profile_service::get_or_create_profile(&mut conn, user_id)?;
    let summary = profile_service::summaries(&mut conn, &[user_id])?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;
    Ok(Json(ApiResponse::ok(summary)))
}

// --- GET /cios ---

pub async fn list_cios(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<UserSummary>>>> {
    let mut conn = checkout(&state.db)?;
    Ok(Json(ApiResponse::ok(profile_service::list_cios(&mut conn)?)))
}
