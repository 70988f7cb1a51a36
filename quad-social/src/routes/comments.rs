use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use quad_shared::clients::db::checkout;
use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::middleware::OptionalAuthUser;
use quad_shared::types::auth::AuthUser;
use quad_shared::types::ApiResponse;

use crate::services::comment_service::{self, CommentView};
use crate::services::profile_service;
use crate::AppState;

use super::posts::viewer_of;

// --- GET /posts/:id/comments ---

pub async fn list_comments(
    user: OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<CommentView>>>> {
    let mut conn = checkout(&state.db)?;
    let (viewer, is_moderator) = viewer_of(&mut conn, &user)?;

    let thread = comment_service::list_comments(&mut conn, viewer, is_moderator, post_id)?;
    Ok(Json(ApiResponse::ok(thread)))
}

// --- POST /posts/:id/comments ---

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(max = 5000))]
    pub body: String,
    pub parent_id: Option<Uuid>,
}

pub async fn create_comment(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<Json<ApiResponse<CommentView>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = checkout(&state.db)?;
    let caps = profile_service::active_capabilities(&mut conn, &user)?;
    let comment = comment_service::create_comment(
        &mut conn,
        user.id,
        &caps,
        post_id,
        &req.body,
        req.parent_id,
        state.config.comment_max_depth,
    )?;
    Ok(Json(ApiResponse::ok(comment)))
}

// --- DELETE /comments/:id ---

pub async fn delete_comment(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let mut conn = checkout(&state.db)?;
    let caps = profile_service::capabilities(&mut conn, &user)?;
    comment_service::delete_comment(&mut conn, user.id, &caps, comment_id)?;
    Ok(Json(ApiResponse::ok_with_message((), "comment deleted")))
}
