use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use quad_shared::clients::db::checkout;
use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::middleware::OptionalAuthUser;
use quad_shared::types::auth::AuthUser;
use quad_shared::types::{ApiResponse, Paginated, PaginationParams};

use crate::models::Event;
use crate::services::event_service::{self, EventInput};
use crate::services::profile_service;
use crate::AppState;

// --- GET /events ---

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Event>>>> {
    let mut conn = checkout(&state.db)?;
    let (items, total) = event_service::list_events(&mut conn, Utc::now(), &params)?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

// --- POST /events ---

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub location: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
}

pub async fn create_event(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEventRequest>,
) -> AppResult<Json<ApiResponse<Event>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = checkout(&state.db)?;
    let caps = profile_service::active_capabilities(&mut conn, &user)?;
    let event = event_service::create_event(
        &mut conn,
        user.id,
        &caps,
        EventInput {
            title: req.title,
            description: req.description,
            location: req.location,
            start_at: req.start_at,
            end_at: req.end_at,
        },
    )?;
    Ok(Json(ApiResponse::ok(event)))
}

// --- GET /events/:id ---

pub async fn get_event(
    user: OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Event>>> {
    let mut conn = checkout(&state.db)?;
    let viewer = user.0.map(|u| u.id);
    Ok(Json(ApiResponse::ok(event_service::event_detail(&mut conn, viewer, event_id)?)))
}
