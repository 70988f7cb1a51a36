use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Comment, Post, Profile};
use crate::schema::{comments, posts, profiles};
use crate::services::profile_service::{self, Capabilities};

pub fn hide_post(
    conn: &mut PgConnection,
    moderator: Uuid,
    caps: &Capabilities,
    post_id: Uuid,
    reason: Option<String>,
) -> AppResult<Post> {
    caps.ensure_moderator()?;
    let post = diesel::update(posts::table.find(post_id))
        .set((
            posts::is_hidden.eq(true),
            posts::hidden_reason.eq(reason),
            posts::hidden_by.eq(Some(moderator)),
            posts::hidden_at.eq(Some(Utc::now())),
        ))
        .get_result::<Post>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "post not found"))?;

    tracing::info!(post_id = %post_id, moderator = %moderator, "post hidden");
    Ok(post)
}

pub fn unhide_post(conn: &mut PgConnection, moderator: Uuid, caps: &Capabilities, post_id: Uuid) -> AppResult<Post> {
    caps.ensure_moderator()?;
    let post = diesel::update(posts::table.find(post_id))
        .set((
            posts::is_hidden.eq(false),
            posts::hidden_reason.eq(None::<String>),
            posts::hidden_by.eq(None::<Uuid>),
            posts::hidden_at.eq(None::<chrono::DateTime<Utc>>),
        ))
        .get_result::<Post>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "post not found"))?;

    tracing::info!(post_id = %post_id, moderator = %moderator, "post unhidden");
    Ok(post)
}

pub fn set_comment_hidden(
    conn: &mut PgConnection,
    moderator: Uuid,
    caps: &Capabilities,
    comment_id: Uuid,
    hidden: bool,
) -> AppResult<Comment> {
    caps.ensure_moderator()?;
    let (hidden_by, hidden_at) = if hidden {
        (Some(moderator), Some(Utc::now()))
    } else {
        (None, None)
    };

    let comment = diesel::update(comments::table.find(comment_id))
        .set((
            comments::is_hidden.eq(hidden),
            comments::hidden_by.eq(hidden_by),
            comments::hidden_at.eq(hidden_at),
        ))
        .get_result::<Comment>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::CommentNotFound, "comment not found"))?;

    tracing::info!(comment_id = %comment_id, moderator = %moderator, hidden, "comment visibility changed");
    Ok(comment)
}

pub fn suspend_user(
    conn: &mut PgConnection,
    moderator: Uuid,
    caps: &Capabilities,
    target: Uuid,
    reason: &str,
) -> AppResult<Profile> {
    caps.ensure_moderator()?;
    if moderator == target {
        return Err(AppError::bad_request("moderators cannot suspend themselves"));
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "a suspension reason is required"));
    }

    let profile = profile_service::get_or_create_profile(conn, target)?;
    let updated = diesel::update(profiles::table.find(profile.id))
        .set((
            profiles::is_suspended.eq(true),
            profiles::suspension_reason.eq(Some(reason)),
            profiles::suspended_at.eq(Some(Utc::now())),
            profiles::suspended_by.eq(Some(moderator)),
            profiles::updated_at.eq(Utc::now()),
        ))
        .get_result::<Profile>(conn)?;

    tracing::warn!(user_id = %target, moderator = %moderator, reason = %reason, "user suspended");
    Ok(updated)
}

pub fn reinstate_user(conn: &mut PgConnection, moderator: Uuid, caps: &Capabilities, target: Uuid) -> AppResult<Profile> {
    caps.ensure_moderator()?;
    let profile = profile_service::get_or_create_profile(conn, target)?;
    let updated = diesel::update(profiles::table.find(profile.id))
        .set((
            profiles::is_suspended.eq(false),
            profiles::suspension_reason.eq(None::<String>),
            profiles::suspended_at.eq(None::<chrono::DateTime<Utc>>),
            profiles::suspended_by.eq(None::<Uuid>),
            profiles::updated_at.eq(Utc::now()),
        ))
        .get_result::<Profile>(conn)?;

    tracing::info!(user_id = %target, moderator = %moderator, "user reinstated");
    Ok(updated)
}

/// Grant or revoke the moderator flag. Callers must hold the admin role.
pub fn set_moderator(conn: &mut PgConnection, admin: Uuid, target: Uuid, is_moderator: bool) -> AppResult<Profile> {
    let profile = profile_service::get_or_create_profile(conn, target)?;
    let updated = diesel::update(profiles::table.find(profile.id))
        .set((profiles::is_moderator.eq(is_moderator), profiles::updated_at.eq(Utc::now())))
        .get_result::<Profile>(conn)?;

    tracing::info!(user_id = %target, admin = %admin, is_moderator, "moderator flag changed");
    Ok(updated)
}
