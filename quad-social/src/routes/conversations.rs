use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use quad_shared::clients::db::checkout;
use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::types::auth::AuthUser;
use quad_shared::types::ApiResponse;

use crate::models::{Conversation, Message};
use crate::services::conversation_service::{self, ConversationDetail, ConversationSummary};
use crate::services::{message_service, profile_service};
use crate::AppState;

// --- GET /conversations ---

pub async fn list_conversations(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<ConversationSummary>>>> {
    let mut conn = checkout(&state.db)?;
    Ok(Json(ApiResponse::ok(conversation_service::list_conversations(&mut conn, user.id)?)))
}

// --- POST /conversations/direct ---

#[derive(Debug, Deserialize)]
pub struct OpenDirectRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DirectConversationResponse {
    pub conversation: Conversation,
    pub created: bool,
    pub messages: Vec<Message>,
}

/// Open (or start) the direct conversation with another user and return its
/// latest messages.
pub async fn open_direct(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenDirectRequest>,
) -> AppResult<Json<ApiResponse<DirectConversationResponse>>> {
    let mut conn = checkout(&state.db)?;

    let (conversation, created) = conversation_service::get_or_create_direct(&mut conn, user.id, req.user_id)?;
    let messages = message_service::list_since(
        &mut conn,
        conversation.id,
        user.id,
        None,
        state.config.message_page_size,
    )?;

    Ok(Json(ApiResponse::ok(DirectConversationResponse { conversation, created, messages })))
}

// --- POST /conversations/group ---

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(max = 100))]
    pub name: String,
    pub member_ids: Vec<Uuid>,
}

pub async fn create_group(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGroupRequest>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = checkout(&state.db)?;
    profile_service::active_capabilities(&mut conn, &user)?;
    let conversation = conversation_service::create_group(&mut conn, user.id, &req.member_ids, &req.name)?;
    Ok(Json(ApiResponse::ok(conversation)))
}

// --- GET /conversations/:id ---

pub async fn get_conversation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ConversationDetail>>> {
    let mut conn = checkout(&state.db)?;
    let detail = conversation_service::conversation_detail(&mut conn, user.id, conversation_id)?;
    Ok(Json(ApiResponse::ok(detail)))
}

// --- POST /conversations/:id/members ---

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

pub async fn add_member(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    let mut conn = checkout(&state.db)?;
    profile_service::active_capabilities(&mut conn, &user)?;
    let conversation = conversation_service::add_member(&mut conn, user.id, conversation_id, req.user_id)?;
    Ok(Json(ApiResponse::ok(conversation)))
}
