use std::collections::{HashMap, HashSet};

use chrono::Utc;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::types::PaginationParams;

use crate::models::{NewPost, NewPostImage, Post, PostImage, PostTag, Privacy, UpdatePost};
use crate::schema::{post_images, posts};
use crate::services::profile_service::Capabilities;
use crate::services::visibility::{self, Audience, PostFacts, Viewer};

pub const TITLE_MAX_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct PostWithImages {
    pub post: Post,
    pub images: Vec<PostImage>,
}

#[derive(Debug, Default)]
pub struct PostInput {
    pub title: String,
    pub caption: String,
    pub tag: Option<String>,
    pub privacy: Option<String>,
    pub image_keys: Vec<String>,
}

#[derive(Debug, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub caption: Option<String>,
    pub tag: Option<String>,
    pub privacy: Option<String>,
}

fn parse_privacy(raw: &str) -> AppResult<Privacy> {
    raw.parse::<Privacy>()
        .map_err(|e| AppError::new(ErrorCode::InvalidPrivacy, e))
}

fn parse_tag(raw: &str) -> AppResult<PostTag> {
    raw.parse::<PostTag>()
        .map_err(|e| AppError::new(ErrorCode::InvalidTag, e))
}

fn validate_title(raw: &str) -> AppResult<String> {
    let title = raw.trim();
    let len = title.chars().count();
    if len == 0 || len > TITLE_MAX_CHARS {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("title must be between 1 and {TITLE_MAX_CHARS} characters"),
        ));
    }
    Ok(title.to_string())
}

fn images_for(conn: &mut PgConnection, post_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Vec<PostImage>>> {
    let mut by_post: HashMap<Uuid, Vec<PostImage>> = HashMap::new();
    if post_ids.is_empty() {
        return Ok(by_post);
    }
    let rows = post_images::table
        .filter(post_images::post_id.eq_any(post_ids))
        .order((post_images::post_id, post_images::position.asc()))
        .load::<PostImage>(conn)?;
    for image in rows {
        by_post.entry(image.post_id).or_default().push(image);
    }
    Ok(by_post)
}

fn find_post(conn: &mut PgConnection, post_id: Uuid) -> AppResult<Post> {
    posts::table
        .find(post_id)
        .first::<Post>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "post not found"))
}

/// Privacy first, then the moderation hide. Anything the viewer may not see
/// is reported as missing.
pub fn ensure_visible(conn: &mut PgConnection, viewer: Viewer, is_moderator: bool, post: &Post) -> AppResult<()> {
    let facts = PostFacts::from_post(post)?;
    let graph = visibility::load_graph(conn, viewer, &[facts])?;
    let visible = visibility::can_view(&graph, viewer, &facts)
        && (!post.is_hidden || visibility::can_view_hidden(viewer, post.author_id, is_moderator));
    if !visible {
        return Err(AppError::new(ErrorCode::PostNotFound, "post not found"));
    }
    Ok(())
}

/// Load a post the actor may change: its author or a moderator.
fn require_editable(conn: &mut PgConnection, actor: Uuid, caps: &Capabilities, post_id: Uuid) -> AppResult<Post> {
    let post = find_post(conn, post_id)?;
    if post.author_id != actor && !caps.is_moderator {
        return Err(AppError::forbidden("only the author or a moderator can change this post"));
    }
    Ok(post)
}

pub fn create_post(conn: &mut PgConnection, author: Uuid, input: PostInput) -> AppResult<PostWithImages> {
    let title = validate_title(&input.title)?;
    let privacy = parse_privacy(input.privacy.as_deref().unwrap_or(Privacy::Public.as_str()))?;
    let tag = parse_tag(input.tag.as_deref().unwrap_or(PostTag::General.as_str()))?;

    conn.transaction::<_, AppError, _>(|conn| {
        let post = diesel::insert_into(posts::table)
            .values(&NewPost {
                author_id: author,
                title,
                caption: input.caption.trim().to_string(),
                tag: tag.as_str().to_string(),
                privacy: privacy.as_str().to_string(),
            })
            .get_result::<Post>(conn)?;

        let rows: Vec<NewPostImage> = input
            .image_keys
            .into_iter()
            .filter(|k| !k.trim().is_empty())
            .enumerate()
            .map(|(i, image_key)| NewPostImage { post_id: post.id, image_key, position: i as i32 })
            .collect();
        let images = if rows.is_empty() {
            vec![]
        } else {
            diesel::insert_into(post_images::table)
                .values(&rows)
                .get_results::<PostImage>(conn)?
        };

        tracing::info!(post_id = %post.id, author_id = %author, privacy = %privacy, "post created");
        Ok(PostWithImages { post, images })
    })
}

pub fn update_post(
    conn: &mut PgConnection,
    actor: Uuid,
    caps: &Capabilities,
    post_id: Uuid,
    changes: PostChanges,
) -> AppResult<PostWithImages> {
    let post = require_editable(conn, actor, caps, post_id)?;

    let update = UpdatePost {
        title: changes.title.as_deref().map(validate_title).transpose()?,
        caption: changes.caption.map(|c| c.trim().to_string()),
        tag: changes
            .tag
            .as_deref()
            .map(|t| parse_tag(t).map(|t| t.as_str().to_string()))
            .transpose()?,
        privacy: changes
            .privacy
            .as_deref()
            .map(|p| parse_privacy(p).map(|p| p.as_str().to_string()))
            .transpose()?,
        updated_at: Some(Utc::now()),
    };

    let updated = diesel::update(posts::table.find(post.id))
        .set(&update)
        .get_result::<Post>(conn)?;
    let images = images_for(conn, &[updated.id])?.remove(&updated.id).unwrap_or_default();

    tracing::info!(post_id = %post.id, actor = %actor, "post updated");
    Ok(PostWithImages { post: updated, images })
}

/// Delete the post; comments and image rows cascade. Returns the image keys
/// whose stored objects must be removed.
pub fn delete_post(conn: &mut PgConnection, actor: Uuid, caps: &Capabilities, post_id: Uuid) -> AppResult<Vec<String>> {
    conn.transaction::<_, AppError, _>(|conn| {
        let post = require_editable(conn, actor, caps, post_id)?;

        let keys: Vec<String> = post_images::table
            .filter(post_images::post_id.eq(post.id))
            .select(post_images::image_key)
            .load(conn)?;

        diesel::delete(posts::table.find(post.id)).execute(conn)?;

        tracing::info!(post_id = %post.id, actor = %actor, images = keys.len(), "post deleted");
        Ok(keys)
    })
}

pub fn get_post(conn: &mut PgConnection, viewer: Viewer, is_moderator: bool, post_id: Uuid) -> AppResult<PostWithImages> {
    let post = find_post(conn, post_id)?;
    ensure_visible(conn, viewer, is_moderator, &post)?;
    let images = images_for(conn, &[post.id])?.remove(&post.id).unwrap_or_default();
    Ok(PostWithImages { post, images })
}

/// Posts the viewer may read, as a query the database can count and page.
///
/// Restricted privacies are matched against the viewer's [`Audience`];
/// hidden posts stay in only for their author and moderators.
fn feed_query(
    viewer: Viewer,
    audience: &Audience,
    is_moderator: bool,
    tag: Option<PostTag>,
) -> posts::BoxedQuery<'static, Pg> {
    let mut query = posts::table.into_boxed();

    match viewer.user_id() {
        None => {
            query = query
                .filter(posts::privacy.eq(Privacy::Public.as_str()))
                .filter(posts::is_hidden.eq(false));
        }
        Some(viewer_id) => {
            query = query.filter(
                posts::author_id
                    .eq(viewer_id)
                    .or(posts::privacy.eq(Privacy::Public.as_str()))
                    .or(posts::privacy
                        .eq(Privacy::FriendsOnly.as_str())
                        .and(posts::author_id.eq_any(audience.friends_only.clone())))
                    .or(posts::privacy
                        .eq(Privacy::CioWide.as_str())
                        .and(posts::author_id.eq_any(audience.cio_wide.clone()))),
            );
            if !is_moderator {
                query = query.filter(posts::is_hidden.eq(false).or(posts::author_id.eq(viewer_id)));
            }
        }
    }

    if let Some(tag) = tag {
        query = query.filter(posts::tag.eq(tag.as_str()));
    }
    query
}

/// Newest-first feed page of posts the viewer may see.
pub fn list_posts(
    conn: &mut PgConnection,
    viewer: Viewer,
    is_moderator: bool,
    tag: Option<&str>,
    params: &PaginationParams,
) -> AppResult<(Vec<PostWithImages>, u64)> {
    let tag = tag.map(parse_tag).transpose()?;
    let audience = match viewer {
        Viewer::User(viewer_id) => {
            let neighbourhood = visibility::load_neighbourhood(conn, viewer_id)?;
            visibility::audience(&neighbourhood, viewer)
        }
        Viewer::Anonymous => Audience::default(),
    };

    let total: i64 = feed_query(viewer, &audience, is_moderator, tag)
        .count()
        .get_result(conn)?;
    let mut page: Vec<Post> = feed_query(viewer, &audience, is_moderator, tag)
        .order((posts::created_at.desc(), posts::id.desc()))
        .offset(params.sql_offset())
        .limit(params.sql_limit())
        .load(conn)?;

    // The page is small, so the bulk filter re-checks it against the full
    // rules before anything leaves the service.
    let facts = page.iter().map(PostFacts::from_post).collect::<AppResult<Vec<_>>>()?;
    let graph = visibility::load_graph(conn, viewer, &facts)?;
    let allowed: HashSet<Uuid> = visibility::filter_viewable(&graph, viewer, &facts)
        .into_iter()
        .map(|p| p.id)
        .collect();
    page.retain(|post| {
        let keep = allowed.contains(&post.id);
        if !keep {
            tracing::error!(post_id = %post.id, "feed query admitted a post the visibility filter rejects");
        }
        keep
    });

    let ids: Vec<Uuid> = page.iter().map(|p| p.id).collect();
    let mut images = images_for(conn, &ids)?;
    let items = page
        .into_iter()
        .map(|post| PostWithImages { images: images.remove(&post.id).unwrap_or_default(), post })
        .collect();

    Ok((items, total as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_bounds_are_enforced() {
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"t".repeat(TITLE_MAX_CHARS + 1)).is_err());
        assert_eq!(validate_title("  Beach cleanup ").unwrap(), "Beach cleanup");
    }

    #[test]
    fn bad_privacy_and_tag_map_to_their_codes() {
        assert_eq!(parse_privacy("secret").unwrap_err().code(), Some(ErrorCode::InvalidPrivacy));
        assert_eq!(parse_tag("memes").unwrap_err().code(), Some(ErrorCode::InvalidTag));
        assert_eq!(parse_privacy("friends_only").unwrap(), Privacy::FriendsOnly);
    }
}
