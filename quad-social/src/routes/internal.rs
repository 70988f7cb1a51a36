//! Service-to-service endpoints. They sit behind the private network and
//! carry no end-user auth.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use quad_shared::clients::db::checkout;
use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::types::ApiResponse;

use crate::models::{Profile, User};
use crate::services::friend_service::{self, CioCircle};
use crate::services::profile_service::{self, UserSummary};
use crate::AppState;

/// Upper bound on ids accepted by the batch lookup.
const MAX_BATCH: usize = 500;

// --- POST /internal/users ---

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterUserRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 150))]
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub user: User,
    pub profile: Profile,
}

pub async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterUserRequest>,
) -> AppResult<Json<ApiResponse<RegisteredUser>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = checkout(&state.db)?;
    let (user, profile) = profile_service::register_user(&mut conn, req.user_id, &req.username)?;
    Ok(Json(ApiResponse::ok(RegisteredUser { user, profile })))
}

// --- GET /internal/friend-ids/:id ---

pub async fn friend_ids(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<Uuid>>>> {
    let mut conn = checkout(&state.db)?;
    let ids = friend_service::friend_ids(&mut conn, user_id)?;
    tracing::debug!(user_id = %user_id, count = ids.len(), "friend ids served");
    Ok(Json(ApiResponse::ok(ids)))
}

// --- POST /internal/profiles/batch ---

#[derive(Debug, Deserialize)]
pub struct BatchProfilesRequest {
    pub user_ids: Vec<Uuid>,
}

pub async fn batch_profiles(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchProfilesRequest>,
) -> AppResult<Json<ApiResponse<Vec<UserSummary>>>> {
    if req.user_ids.len() > MAX_BATCH {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("at most {MAX_BATCH} ids per batch"),
        ));
    }
    if req.user_ids.is_empty() {
        return Ok(Json(ApiResponse::ok(Vec::new())));
    }

    let mut conn = checkout(&state.db)?;
    Ok(Json(ApiResponse::ok(profile_service::summaries(&mut conn, &req.user_ids)?)))
}

// --- GET /internal/cio-circles ---

pub async fn cio_circles(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<CioCircle>>>> {
    let mut conn = checkout(&state.db)?;
    Ok(Json(ApiResponse::ok(friend_service::cio_circles(&mut conn)?)))
}
