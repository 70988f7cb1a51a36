use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use quad_shared::clients::db::checkout;
use quad_shared::errors::AppResult;
use quad_shared::types::auth::AuthUser;
use quad_shared::types::{ApiResponse, Paginated, PaginationParams};

use crate::models::Notification;
use crate::services::notification_service;
use crate::AppState;

// --- GET /notifications ---

/// Listing leaves read state untouched.
pub async fn list_notifications(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Notification>>>> {
    let mut conn = checkout(&state.db)?;
    let (items, total) = notification_service::list(&mut conn, user.id, &params)?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

// --- GET /notifications/unread-count ---

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

pub async fn unread_count(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UnreadCount>>> {
    let mut conn = checkout(&state.db)?;
    let unread = notification_service::unread_count(&mut conn, user.id)?;
    Ok(Json(ApiResponse::ok(UnreadCount { unread })))
}

// --- POST /notifications/:id/read ---

pub async fn mark_read(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let mut conn = checkout(&state.db)?;
    let notification = notification_service::mark_read(&mut conn, user.id, notification_id)?;
    Ok(Json(ApiResponse::ok(notification)))
}

// --- POST /notifications/read-all ---

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub marked: usize,
}

pub async fn mark_all_read(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<MarkedRead>>> {
    let mut conn = checkout(&state.db)?;
    let marked = notification_service::mark_all_read(&mut conn, user.id)?;
    Ok(Json(ApiResponse::ok(MarkedRead { marked })))
}
