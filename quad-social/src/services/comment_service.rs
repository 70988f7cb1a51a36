use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Comment, NewComment, Post};
use crate::schema::{comments, posts};
use crate::services::comment_tree::{CommentTree, WalkError};
use crate::services::post_service;
use crate::services::profile_service::Capabilities;
use crate::services::visibility::{self, Viewer};

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
    pub depth: usize,
    pub is_deleted: bool,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
}

impl CommentView {
    pub fn new(comment: Comment, depth: usize) -> Self {
        // Soft-deleted comments keep their place in the thread but not their text.
        let body = if comment.is_deleted { String::new() } else { comment.body };
        Self {
            id: comment.id,
            post_id: comment.post_id,
            author_id: comment.author_id,
            parent_id: comment.parent_id,
            body,
            depth,
            is_deleted: comment.is_deleted,
            is_hidden: comment.is_hidden,
            created_at: comment.created_at,
        }
    }
}

fn load_post(conn: &mut PgConnection, post_id: Uuid) -> AppResult<Post> {
    posts::table
        .find(post_id)
        .first::<Post>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "post not found"))
}

fn find_comment(conn: &mut PgConnection, comment_id: Uuid) -> AppResult<Comment> {
    comments::table
        .find(comment_id)
        .first::<Comment>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::CommentNotFound, "comment not found"))
}

fn tree_for_post(conn: &mut PgConnection, post_id: Uuid) -> AppResult<CommentTree> {
    let rows: Vec<(Uuid, Option<Uuid>, DateTime<Utc>)> = comments::table
        .filter(comments::post_id.eq(post_id))
        .select((comments::id, comments::parent_id, comments::created_at))
        .load(conn)?;

    let mut tree = CommentTree::new();
    for (id, parent, created_at) in rows {
        tree.insert(id, parent, created_at);
    }
    Ok(tree)
}

pub fn create_comment(
    conn: &mut PgConnection,
    author: Uuid,
    caps: &Capabilities,
    post_id: Uuid,
    body: &str,
    parent_id: Option<Uuid>,
    max_depth: usize,
) -> AppResult<CommentView> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "comment body must not be empty"));
    }

    let post = load_post(conn, post_id)?;
    post_service::ensure_visible(conn, Viewer::User(author), caps.is_moderator, &post)?;

    let depth = match parent_id {
        None => 0,
        Some(parent_id) => {
            let parent = find_comment(conn, parent_id)?;
            if parent.post_id != post_id {
                return Err(AppError::new(
                    ErrorCode::CommentParentMismatch,
                    "parent comment belongs to a different post",
                ));
            }
            let tree = tree_for_post(conn, post_id)?;
            tree.reply_depth(parent_id, max_depth).map_err(|e| match e {
                WalkError::TooDeep(limit) => AppError::new(
                    ErrorCode::CommentTooDeep,
                    format!("replies cannot nest deeper than {limit} levels"),
                ),
                other => {
                    tracing::error!(post_id = %post_id, error = %other, "broken comment chain");
                    AppError::internal("broken comment thread")
                }
            })?
        }
    };

    let comment = diesel::insert_into(comments::table)
        .values(&NewComment { post_id, author_id: author, parent_id, body })
        .get_result::<Comment>(conn)?;

    tracing::info!(comment_id = %comment.id, post_id = %post_id, depth, "comment created");
    Ok(CommentView::new(comment, depth))
}

/// Soft delete by the author or a moderator.
pub fn delete_comment(conn: &mut PgConnection, actor: Uuid, caps: &Capabilities, comment_id: Uuid) -> AppResult<()> {
    let comment = find_comment(conn, comment_id)?;
    if comment.author_id != actor && !caps.is_moderator {
        return Err(AppError::forbidden("only the author or a moderator can delete this comment"));
    }
    if comment.is_deleted {
        return Ok(());
    }

    diesel::update(comments::table.find(comment.id))
        .set((comments::is_deleted.eq(true), comments::updated_at.eq(Utc::now())))
        .execute(conn)?;

    tracing::info!(comment_id = %comment.id, actor = %actor, "comment deleted");
    Ok(())
}

/// The post's thread in reading order. Hidden comments are left out for
/// everyone except their author and moderators.
pub fn list_comments(
    conn: &mut PgConnection,
    viewer: Viewer,
    is_moderator: bool,
    post_id: Uuid,
) -> AppResult<Vec<CommentView>> {
    let post = load_post(conn, post_id)?;
    post_service::ensure_visible(conn, viewer, is_moderator, &post)?;

    let rows = comments::table
        .filter(comments::post_id.eq(post_id))
        .load::<Comment>(conn)?;

    let mut tree = CommentTree::new();
    for c in &rows {
        tree.insert(c.id, c.parent_id, c.created_at);
    }
    let mut by_id: HashMap<Uuid, Comment> = rows.into_iter().map(|c| (c.id, c)).collect();

    Ok(tree
        .thread_order()
        .into_iter()
        .filter_map(|(id, depth)| by_id.remove(&id).map(|c| (c, depth)))
        .filter(|(c, _)| !c.is_hidden || visibility::can_view_hidden(viewer, c.author_id, is_moderator))
        .map(|(c, depth)| CommentView::new(c, depth))
        .collect())
}
