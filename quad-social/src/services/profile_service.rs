use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::upsert::excluded;
use serde::Serialize;
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::types::auth::AuthUser;

use crate::models::{NewProfile, NewUser, Profile, Role, UpdateProfile, User};
use crate::schema::{post_images, posts, profiles, users};

/// Everything a handler may ask about the acting user, resolved in one place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub is_moderator: bool,
    pub is_cio: bool,
    pub is_suspended: bool,
    pub is_admin: bool,
}

impl Capabilities {
    pub fn resolve(profile: Option<&Profile>, is_admin: bool) -> AppResult<Self> {
        let (is_moderator, is_cio, is_suspended) = match profile {
            Some(p) => (p.is_moderator, p.role()? == Role::Cio, p.is_suspended),
            None => (false, false, false),
        };
        Ok(Self {
            is_moderator: is_moderator || is_admin,
            is_cio,
            is_suspended,
            is_admin,
        })
    }

    /// Write actions are refused to suspended accounts.
    pub fn ensure_active(&self) -> AppResult<()> {
        if self.is_suspended {
            return Err(AppError::new(ErrorCode::AccountSuspended, "account is suspended"));
        }
        Ok(())
    }

    pub fn ensure_moderator(&self) -> AppResult<()> {
        if !self.is_moderator {
            return Err(AppError::forbidden("moderator access required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserSummary {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub role: Role,
}

type SummaryRow = (Uuid, String, Option<String>, Option<String>);

/// A user whose profile has not been created yet reads as a student.
fn summary_from_row((user_id, username, display_name, role): SummaryRow) -> AppResult<UserSummary> {
    let role = match role {
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|e| AppError::internal(format!("corrupted profile: {e}")))?,
        None => Role::Student,
    };
    Ok(UserSummary { user_id, username, display_name, role })
}

/// Upsert the identity mirror row and make sure a profile exists.
pub fn register_user(conn: &mut PgConnection, user_id: Uuid, username: &str) -> AppResult<(User, Profile)> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "username must not be empty"));
    }

    conn.transaction::<_, AppError, _>(|conn| {
        let user = diesel::insert_into(users::table)
            .values(&NewUser { id: user_id, username })
            .on_conflict(users::id)
            .do_update()
            .set(users::username.eq(excluded(users::username)))
            .get_result::<User>(conn)?;

        let profile = get_or_create_profile(conn, user_id)?;
        tracing::info!(user_id = %user_id, username = %user.username, "user registered");
        Ok((user, profile))
    })
}

pub fn find_user(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Option<User>> {
    Ok(users::table.find(user_id).first::<User>(conn).optional()?)
}

pub fn require_user(conn: &mut PgConnection, user_id: Uuid) -> AppResult<User> {
    find_user(conn, user_id)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))
}

pub fn find_profile(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Option<Profile>> {
    Ok(profiles::table
        .filter(profiles::user_id.eq(user_id))
        .first::<Profile>(conn)
        .optional()?)
}

/// Profiles are created lazily the first time anyone needs one.
pub fn get_or_create_profile(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Profile> {
    if let Some(profile) = find_profile(conn, user_id)? {
        return Ok(profile);
    }
    require_user(conn, user_id)?;

    diesel::insert_into(profiles::table)
        .values(&NewProfile { user_id })
        .on_conflict(profiles::user_id)
        .do_nothing()
        .execute(conn)?;

    tracing::debug!(user_id = %user_id, "default profile created");

    find_profile(conn, user_id)?
        .ok_or_else(|| AppError::new(ErrorCode::ProfileNotFound, "profile not found"))
}

pub fn capabilities(conn: &mut PgConnection, user: &AuthUser) -> AppResult<Capabilities> {
    let profile = find_profile(conn, user.id)?;
    Capabilities::resolve(profile.as_ref(), user.is_admin())
}

/// Capabilities of an actor about to write; suspended accounts are refused.
pub fn active_capabilities(conn: &mut PgConnection, user: &AuthUser) -> AppResult<Capabilities> {
    let caps = capabilities(conn, user)?;
    caps.ensure_active()?;
    Ok(caps)
}

#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub role: Option<String>,
}

pub fn update_profile(conn: &mut PgConnection, user_id: Uuid, changes: ProfileChanges) -> AppResult<Profile> {
    let role = changes
        .role
        .map(|r| {
            r.parse::<Role>()
                .map(|role| role.as_str().to_string())
                .map_err(|e| AppError::new(ErrorCode::InvalidRole, e))
        })
        .transpose()?;

    let profile = get_or_create_profile(conn, user_id)?;

    let update = UpdateProfile {
        display_name: changes.display_name.map(|s| s.trim().to_string()),
        bio: changes.bio,
        role,
        is_completed: Some(true),
    };

    let updated = diesel::update(profiles::table.find(profile.id))
        .set((&update, profiles::updated_at.eq(chrono::Utc::now())))
        .get_result::<Profile>(conn)?;

    tracing::info!(user_id = %user_id, role = %updated.role, "profile updated");
    Ok(updated)
}

pub fn summaries(conn: &mut PgConnection, user_ids: &[Uuid]) -> AppResult<Vec<UserSummary>> {
    if user_ids.is_empty() {
        return Ok(vec![]);
    }
    users::table
        .left_join(profiles::table)
        .filter(users::id.eq_any(user_ids))
        .order(users::username.asc())
        .select((
            users::id,
            users::username,
            profiles::display_name.nullable(),
            profiles::role.nullable(),
        ))
        .load::<SummaryRow>(conn)?
        .into_iter()
        .map(summary_from_row)
        .collect()
}

pub fn search_users(conn: &mut PgConnection, actor: Uuid, query: &str, limit: i64) -> AppResult<Vec<UserSummary>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(vec![]);
    }
    let pattern = format!("%{}%", escape_like(query));

    users::table
        .inner_join(profiles::table)
        .filter(users::id.ne(actor))
        .filter(
            users::username
                .ilike(&pattern)
                .nullable()
                .or(profiles::display_name.ilike(&pattern)),
        )
        .order(users::username.asc())
        .limit(limit)
        .select((users::id, users::username, profiles::display_name, profiles::role.nullable()))
        .load::<SummaryRow>(conn)?
        .into_iter()
        .map(summary_from_row)
        .collect()
}

pub fn list_cios(conn: &mut PgConnection) -> AppResult<Vec<UserSummary>> {
    users::table
        .inner_join(profiles::table)
        .filter(profiles::role.eq(Role::Cio.as_str()))
        .order(users::username.asc())
        .select((users::id, users::username, profiles::display_name, profiles::role.nullable()))
        .load::<SummaryRow>(conn)?
        .into_iter()
        .map(summary_from_row)
        .collect()
}

/// Remove the identity row and everything hanging off it. Returns the
/// storage keys of the deleted posts' images for the caller to purge.
pub fn delete_account(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<String>> {
    conn.transaction::<_, AppError, _>(|conn| {
        let image_keys: Vec<String> = post_images::table
            .inner_join(posts::table)
            .filter(posts::author_id.eq(user_id))
            .select(post_images::image_key)
            .load(conn)?;

        let deleted = diesel::delete(users::table.find(user_id)).execute(conn)?;
        if deleted == 0 {
            return Err(AppError::new(ErrorCode::UserNotFound, "user not found"));
        }

        tracing::info!(user_id = %user_id, images = image_keys.len(), "account deleted");
        Ok(image_keys)
    })
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile(role: &str, is_moderator: bool, is_suspended: bool) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            display_name: None,
            bio: None,
            role: role.into(),
            is_moderator,
            is_suspended,
            suspension_reason: None,
            suspended_at: None,
            suspended_by: None,
            is_completed: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn admin_claim_grants_moderation_without_profile_flag() {
        let caps = Capabilities::resolve(Some(&profile("student", false, false)), true).unwrap();
        assert!(caps.is_moderator);
        assert!(caps.is_admin);
        assert!(!caps.is_cio);
    }

    #[test]
    fn missing_profile_means_no_capabilities() {
        let caps = Capabilities::resolve(None, false).unwrap();
        assert_eq!(caps, Capabilities::default());
        assert!(caps.ensure_active().is_ok());
        assert_eq!(caps.ensure_moderator().unwrap_err().code(), Some(ErrorCode::Forbidden));
    }

    #[test]
    fn suspended_profile_cannot_write() {
        let caps = Capabilities::resolve(Some(&profile("cio", true, true)), false).unwrap();
        assert!(caps.is_cio);
        assert_eq!(caps.ensure_active().unwrap_err().code(), Some(ErrorCode::AccountSuspended));
    }

    #[test]
    fn corrupted_role_is_an_error_not_a_default() {
        assert!(Capabilities::resolve(Some(&profile("wizard", false, false)), false).is_err());
    }

    #[test]
    fn summary_without_profile_reads_as_student() {
        let summary = summary_from_row((Uuid::new_v4(), "dana".into(), None, None)).unwrap();
        assert_eq!(summary.role, Role::Student);
        assert!(summary_from_row((Uuid::new_v4(), "eve".into(), None, Some("wizard".into()))).is_err());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
