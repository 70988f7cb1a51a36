use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use quad_shared::clients::db::checkout;
use quad_shared::errors::AppResult;
use quad_shared::types::auth::AuthUser;
use quad_shared::types::ApiResponse;

use crate::clients::social::ProfileSummary;
use crate::services::ranking::{self, Standing};
use crate::services::task_service;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    #[serde(flatten)]
    pub standing: Standing,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

/// Attach names to standings. A failed profile lookup only costs the names.
async fn with_names(state: &AppState, standings: Vec<Standing>) -> Vec<LeaderboardEntry> {
    let ids: Vec<Uuid> = standings.iter().map(|s| s.user_id).collect();
    let profiles: HashMap<Uuid, ProfileSummary> = match state.social.profiles(&ids).await {
        Ok(profiles) => profiles.into_iter().map(|p| (p.user_id, p)).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "leaderboard served without names");
            HashMap::new()
        }
    };

    standings
        .into_iter()
        .map(|standing| {
            let profile = profiles.get(&standing.user_id);
            LeaderboardEntry {
                username: profile.map(|p| p.username.clone()),
                display_name: profile.and_then(|p| p.display_name.clone()),
                standing,
            }
        })
        .collect()
}

// --- GET /leaderboard/friends ---

pub async fn friends_leaderboard(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<LeaderboardEntry>>>> {
    let friend_ids = state.social.friend_ids(user.id).await?;

    let standings = {
        let mut conn = checkout(&state.db)?;
        let mut members = friend_ids.clone();
        members.push(user.id);
        let scores = task_service::scores_for(&mut conn, &members)?;
        ranking::friends_board(user.id, &friend_ids, &scores)
    };

    Ok(Json(ApiResponse::ok(with_names(&state, standings).await)))
}

// --- GET /leaderboard/cio ---

pub async fn cio_leaderboard(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<LeaderboardEntry>>>> {
    let circles = state.social.cio_circles().await?;

    let standings = {
        let mut conn = checkout(&state.db)?;
        let scores = task_service::scores_for(&mut conn, &ranking::circle_members(&circles))?;
        ranking::cio_board(&circles, &scores)
    };

    Ok(Json(ApiResponse::ok(with_names(&state, standings).await)))
}

// --- GET /leaderboard/global ---

pub async fn global_leaderboard(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<LeaderboardEntry>>>> {
    let standings = {
        let mut conn = checkout(&state.db)?;
        ranking::rank(task_service::top_scores(&mut conn, state.config.leaderboard_size)?)
    };

    Ok(Json(ApiResponse::ok(with_names(&state, standings).await)))
}
