use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use quad_shared::clients::db::checkout;
use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::types::auth::AuthUser;
use quad_shared::types::ApiResponse;

use crate::models::{Cadence, Points};
use crate::services::task_service::{self, TaskBoard, ToggleOutcome};
use crate::services::windows;
use crate::AppState;

fn parse_cadence(raw: &str) -> AppResult<Cadence> {
    raw.parse::<Cadence>()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e))
}

// --- GET /tasks/:cadence ---

pub async fn list_tasks(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(cadence): Path<String>,
) -> AppResult<Json<ApiResponse<TaskBoard>>> {
    let cadence = parse_cadence(&cadence)?;
    let window = windows::for_cadence(cadence, Utc::now(), state.config.utc_offset_minutes);

    let mut conn = checkout(&state.db)?;
    let board = task_service::list_tasks(
        &mut conn,
        user.id,
        cadence,
        state.catalog.for_cadence(cadence),
        window,
    )?;
    Ok(Json(ApiResponse::ok(board)))
}

// --- POST /tasks/:cadence/:idx/toggle ---

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ToggleRequest {
    /// Storage URL of the uploaded photo; weekly challenges need one.
    #[validate(length(max = 2048))]
    pub proof_url: Option<String>,
}

pub async fn toggle_task(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((cadence, idx)): Path<(String, usize)>,
    body: Option<Json<ToggleRequest>>,
) -> AppResult<Json<ApiResponse<ToggleOutcome>>> {
    let Json(req) = body.unwrap_or_default();
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let cadence = parse_cadence(&cadence)?;
    let now = Utc::now();
    let window = windows::for_cadence(cadence, now, state.config.utc_offset_minutes);

    let mut conn = checkout(&state.db)?;
    let outcome = task_service::toggle_task(
        &mut conn,
        user.id,
        cadence,
        state.catalog.for_cadence(cadence),
        window,
        now,
        idx,
        req.proof_url.as_deref(),
    )?;
    Ok(Json(ApiResponse::ok(outcome)))
}

// --- GET /points/me ---

pub async fn my_points(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Points>>> {
    let mut conn = checkout(&state.db)?;
    let points = task_service::points_of(&mut conn, user.id)?;
    Ok(Json(ApiResponse::ok(points)))
}
