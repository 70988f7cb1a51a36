use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use quad_shared::clients::db::checkout;
use quad_shared::clients::storage::ObjectStorage;
use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::middleware::OptionalAuthUser;
use quad_shared::types::auth::AuthUser;
use quad_shared::types::{ApiResponse, Paginated, PaginationParams};

use crate::models::Post;
use crate::services::post_service::{self, PostChanges, PostInput, PostWithImages};
use crate::services::profile_service::{self, Capabilities};
use crate::services::visibility::Viewer;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ImageView {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    #[serde(flatten)]
    pub post: Post,
    pub images: Vec<ImageView>,
}

impl PostResponse {
    fn build(item: PostWithImages, storage: &ObjectStorage) -> Self {
        let images = item
            .images
            .into_iter()
            .map(|image| ImageView {
                url: storage.public_url(&image.image_key),
                key: image.image_key,
            })
            .collect();
        Self { post: item.post, images }
    }
}

/// Resolve the viewer and whether they moderate. Anonymous viewers never do.
pub(crate) fn viewer_of(
    conn: &mut diesel::PgConnection,
    user: &OptionalAuthUser,
) -> AppResult<(Viewer, bool)> {
    match &user.0 {
        None => Ok((Viewer::Anonymous, false)),
        Some(user) => {
            let caps = profile_service::capabilities(conn, user)?;
            Ok((Viewer::User(user.id), caps.is_moderator))
        }
    }
}

// --- GET /posts ---

#[derive(Debug, Deserialize)]
pub struct ListPostsParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub tag: Option<String>,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

pub async fn list_posts(
    user: OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListPostsParams>,
) -> AppResult<Json<ApiResponse<Paginated<PostResponse>>>> {
    let mut conn = checkout(&state.db)?;
    let (viewer, is_moderator) = viewer_of(&mut conn, &user)?;

    let pagination = PaginationParams::new(params.page, params.per_page);
    let (items, total) = post_service::list_posts(
        &mut conn,
        viewer,
        is_moderator,
        params.tag.as_deref(),
        &pagination,
    )?;

    let items = items
        .into_iter()
        .map(|item| PostResponse::build(item, &state.storage))
        .collect();
    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &pagination))))
}

// --- POST /posts ---

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 10000))]
    pub caption: String,
    pub tag: Option<String>,
    pub privacy: Option<String>,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub image_keys: Vec<String>,
}

pub async fn create_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<Json<ApiResponse<PostResponse>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = checkout(&state.db)?;
    profile_service::active_capabilities(&mut conn, &user)?;

    let created = post_service::create_post(
        &mut conn,
        user.id,
        PostInput {
            title: req.title,
            caption: req.caption,
            tag: req.tag,
            privacy: req.privacy,
            image_keys: req.image_keys,
        },
    )?;

    Ok(Json(ApiResponse::ok(PostResponse::build(created, &state.storage))))
}

// --- GET /posts/:id ---

pub async fn get_post(
    user: OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PostResponse>>> {
    let mut conn = checkout(&state.db)?;
    let (viewer, is_moderator) = viewer_of(&mut conn, &user)?;
    let post = post_service::get_post(&mut conn, viewer, is_moderator, post_id)?;
    Ok(Json(ApiResponse::ok(PostResponse::build(post, &state.storage))))
}

// --- PATCH /posts/:id ---

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 10000))]
    pub caption: Option<String>,
    pub tag: Option<String>,
    pub privacy: Option<String>,
}

pub async fn update_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<UpdatePostRequest>,
) -> AppResult<Json<ApiResponse<PostResponse>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = checkout(&state.db)?;
    let caps: Capabilities = profile_service::active_capabilities(&mut conn, &user)?;
    let updated = post_service::update_post(
        &mut conn,
        user.id,
        &caps,
        post_id,
        PostChanges {
            title: req.title,
            caption: req.caption,
            tag: req.tag,
            privacy: req.privacy,
        },
    )?;
    Ok(Json(ApiResponse::ok(PostResponse::build(updated, &state.storage))))
}

// --- DELETE /posts/:id ---

pub async fn delete_post(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let image_keys = {
        let mut conn = checkout(&state.db)?;
        let caps = profile_service::capabilities(&mut conn, &user)?;
        post_service::delete_post(&mut conn, user.id, &caps, post_id)?
    };

    let failed = state.storage.delete_all(&image_keys).await;
    if failed > 0 {
        tracing::warn!(post_id = %post_id, failed, "some post images were not removed from storage");
    }

    Ok(Json(ApiResponse::ok_with_message((), "post deleted")))
}
