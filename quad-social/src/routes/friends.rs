use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use quad_shared::clients::db::checkout;
use quad_shared::errors::AppResult;
use quad_shared::types::auth::AuthUser;
use quad_shared::types::ApiResponse;

use crate::models::FriendRequest;
use crate::services::friend_service::{self, Resolution};
use crate::services::profile_service::{self, UserSummary};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ResolutionResponse {
    #[serde(flatten)]
    pub request: FriendRequest,
    /// False when the call found the request already resolved.
    pub changed: bool,
}

impl From<(FriendRequest, Resolution)> for ResolutionResponse {
    fn from((request, resolution): (FriendRequest, Resolution)) -> Self {
        Self { request, changed: resolution == Resolution::Applied }
    }
}

// --- GET /friends ---

pub async fn list_friends(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<UserSummary>>>> {
    let mut conn = checkout(&state.db)?;
    Ok(Json(ApiResponse::ok(friend_service::friends_of(&mut conn, user.id)?)))
}

// --- DELETE /friends/:id ---

pub async fn remove_friend(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(other_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let mut conn = checkout(&state.db)?;
    friend_service::remove_friend(&mut conn, user.id, other_id)?;
    Ok(Json(ApiResponse::ok_with_message((), "friend removed")))
}

// --- POST /friends/requests ---

#[derive(Debug, Deserialize)]
pub struct SendRequestBody {
    pub to_user_id: Uuid,
}

pub async fn send_request(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendRequestBody>,
) -> AppResult<Json<ApiResponse<FriendRequest>>> {
    let mut conn = checkout(&state.db)?;
    profile_service::active_capabilities(&mut conn, &user)?;
    let request = friend_service::send_request(&mut conn, user.id, req.to_user_id)?;
    Ok(Json(ApiResponse::ok(request)))
}

// --- GET /friends/requests/incoming ---

pub async fn incoming_requests(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<FriendRequest>>>> {
    let mut conn = checkout(&state.db)?;
    Ok(Json(ApiResponse::ok(friend_service::incoming_requests(&mut conn, user.id)?)))
}

// --- GET /friends/requests/outgoing ---

pub async fn outgoing_requests(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<FriendRequest>>>> {
    let mut conn = checkout(&state.db)?;
    Ok(Json(ApiResponse::ok(friend_service::outgoing_requests(&mut conn, user.id)?)))
}

// --- POST /friends/requests/:id/accept ---

pub async fn accept_request(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ResolutionResponse>>> {
    let mut conn = checkout(&state.db)?;
    let outcome = friend_service::accept(&mut conn, request_id, user.id)?;
    Ok(Json(ApiResponse::ok(outcome.into())))
}

// --- POST /friends/requests/:id/decline ---

pub async fn decline_request(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ResolutionResponse>>> {
    let mut conn = checkout(&state.db)?;
    let outcome = friend_service::decline(&mut conn, request_id, user.id)?;
    Ok(Json(ApiResponse::ok(outcome.into())))
}

// --- POST /friends/requests/:id/cancel ---

pub async fn cancel_request(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ResolutionResponse>>> {
    let mut conn = checkout(&state.db)?;
    let outcome = friend_service::cancel(&mut conn, request_id, user.id)?;
    Ok(Json(ApiResponse::ok(outcome.into())))
}
