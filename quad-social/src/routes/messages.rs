use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use quad_shared::clients::db::checkout;
use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::types::auth::AuthUser;
use quad_shared::types::ApiResponse;

use crate::models::Message;
use crate::services::{message_service, profile_service};
use crate::AppState;

// --- POST /conversations/:id/messages ---

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(max = 5000))]
    pub body: String,
}

pub async fn send_message(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = checkout(&state.db)?;
    profile_service::active_capabilities(&mut conn, &user)?;
    let message = message_service::send(&mut conn, conversation_id, user.id, &req.body)?;
    Ok(Json(ApiResponse::ok(message)))
}

// --- GET /conversations/:id/messages?after= ---

#[derive(Debug, Deserialize)]
pub struct ListMessagesParams {
    /// Only messages with a larger id. Omit for the latest page.
    pub after: Option<i64>,
}

pub async fn list_messages(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<ListMessagesParams>,
) -> AppResult<Json<ApiResponse<Vec<Message>>>> {
    let mut conn = checkout(&state.db)?;
    let messages = message_service::list_since(
        &mut conn,
        conversation_id,
        user.id,
        params.after,
        state.config.message_page_size,
    )?;
    Ok(Json(ApiResponse::ok(messages)))
}
