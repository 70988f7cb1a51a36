use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use quad_shared::clients::db::checkout;
use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::middleware::AdminUser;
use quad_shared::types::auth::AuthUser;
use quad_shared::types::ApiResponse;

use crate::models::{Comment, Post, Profile};
use crate::services::{moderation_service, profile_service};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct HideRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SuspendRequest {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

// --- POST /moderation/posts/:id/hide ---

pub async fn hide_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
    body: Option<Json<HideRequest>>,
) -> AppResult<Json<ApiResponse<Post>>> {
    let Json(req) = body.unwrap_or_default();
    let mut conn = checkout(&state.db)?;
    let caps = profile_service::capabilities(&mut conn, &user)?;
    let post = moderation_service::hide_post(&mut conn, user.id, &caps, post_id, req.reason)?;
    Ok(Json(ApiResponse::ok(post)))
}

// --- POST /moderation/posts/:id/unhide ---

pub async fn unhide_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Post>>> {
    let mut conn = checkout(&state.db)?;
    let caps = profile_service::capabilities(&mut conn, &user)?;
    let post = moderation_service::unhide_post(&mut conn, user.id, &caps, post_id)?;
    Ok(Json(ApiResponse::ok(post)))
}

// --- POST /moderation/comments/:id/hide ---

pub async fn hide_comment(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Comment>>> {
    let mut conn = checkout(&state.db)?;
    let caps = profile_service::capabilities(&mut conn, &user)?;
    let comment = moderation_service::set_comment_hidden(&mut conn, user.id, &caps, comment_id, true)?;
    Ok(Json(ApiResponse::ok(comment)))
}

// --- POST /moderation/comments/:id/unhide ---

pub async fn unhide_comment(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Comment>>> {
    let mut conn = checkout(&state.db)?;
    let caps = profile_service::capabilities(&mut conn, &user)?;
    let comment = moderation_service::set_comment_hidden(&mut conn, user.id, &caps, comment_id, false)?;
    Ok(Json(ApiResponse::ok(comment)))
}

// --- POST /moderation/users/:id/suspend ---

pub async fn suspend_user(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
    Json(req): Json<SuspendRequest>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = checkout(&state.db)?;
    let caps = profile_service::capabilities(&mut conn, &user)?;
    let profile = moderation_service::suspend_user(&mut conn, user.id, &caps, target_id, &req.reason)?;
    Ok(Json(ApiResponse::ok(profile)))
}

// --- POST /moderation/users/:id/reinstate ---

pub async fn reinstate_user(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let mut conn = checkout(&state.db)?;
    let caps = profile_service::capabilities(&mut conn, &user)?;
    let profile = moderation_service::reinstate_user(&mut conn, user.id, &caps, target_id)?;
    Ok(Json(ApiResponse::ok(profile)))
}

// --- POST /admin/moderators/:id ---

pub async fn promote_moderator(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let mut conn = checkout(&state.db)?;
    let profile = moderation_service::set_moderator(&mut conn, admin.id, target_id, true)?;
    Ok(Json(ApiResponse::ok(profile)))
}

// --- DELETE /admin/moderators/:id ---

pub async fn demote_moderator(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let mut conn = checkout(&state.db)?;
    let profile = moderation_service::set_moderator(&mut conn, admin.id, target_id, false)?;
    Ok(Json(ApiResponse::ok(profile)))
}
