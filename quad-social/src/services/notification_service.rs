use std::collections::HashSet;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::types::PaginationParams;

use crate::models::{NewNotification, Notification, NotificationKind};
use crate::schema::notifications;

const TEXT_MAX_CHARS: usize = 255;

/// Deduplicate candidates and drop the actor, keeping first-seen order.
pub fn recipients_excluding(actor: Uuid, candidates: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|id| *id != actor && seen.insert(*id))
        .collect()
}

fn clip(text: &str) -> String {
    text.chars().take(TEXT_MAX_CHARS).collect()
}

/// One unread row per recipient.
pub fn notify(
    conn: &mut PgConnection,
    recipients: &[Uuid],
    kind: NotificationKind,
    text: &str,
    url: &str,
) -> AppResult<usize> {
    if recipients.is_empty() {
        return Ok(0);
    }

    let text = clip(text);
    let rows: Vec<NewNotification> = recipients
        .iter()
        .map(|user_id| NewNotification {
            user_id: *user_id,
            kind: kind.as_str(),
            text: &text,
            url,
        })
        .collect();

    let inserted = diesel::insert_into(notifications::table)
        .values(&rows)
        .execute(conn)?;

    tracing::debug!(kind = %kind, url = %url, recipients = inserted, "notifications fanned out");
    Ok(inserted)
}

/// Mark the user's unread notifications pointing at one target as read.
pub fn mark_read_for_target(
    conn: &mut PgConnection,
    user_id: Uuid,
    kind: NotificationKind,
    url: &str,
) -> AppResult<usize> {
    let updated = diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::kind.eq(kind.as_str()))
            .filter(notifications::url.eq(url))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(conn)?;
    Ok(updated)
}

pub fn list(conn: &mut PgConnection, user_id: Uuid, params: &PaginationParams) -> AppResult<(Vec<Notification>, i64)> {
    let total: i64 = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .count()
        .get_result(conn)?;

    let items = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .order((notifications::created_at.desc(), notifications::id.desc()))
        .offset(params.sql_offset())
        .limit(params.sql_limit())
        .load::<Notification>(conn)?;

    Ok((items, total))
}

pub fn unread_count(conn: &mut PgConnection, user_id: Uuid) -> AppResult<i64> {
    Ok(notifications::table
        .filter(notifications::user_id.eq(user_id))
        .filter(notifications::is_read.eq(false))
        .count()
        .get_result(conn)?)
}

pub fn mark_read(conn: &mut PgConnection, user_id: Uuid, notification_id: Uuid) -> AppResult<Notification> {
    diesel::update(
        notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::user_id.eq(user_id)),
    )
    .set(notifications::is_read.eq(true))
    .get_result::<Notification>(conn)
    .optional()?
    .ok_or_else(|| AppError::new(ErrorCode::NotificationNotFound, "notification not found"))
}

pub fn mark_all_read(conn: &mut PgConnection, user_id: Uuid) -> AppResult<usize> {
    let updated = diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(conn)?;

    tracing::debug!(user_id = %user_id, count = updated, "notifications marked read");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_is_never_a_recipient() {
        let (actor, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let out = recipients_excluding(actor, [a, actor, b, a]);
        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn only_the_actor_yields_nobody() {
        let actor = Uuid::new_v4();
        assert!(recipients_excluding(actor, [actor, actor]).is_empty());
    }

    #[test]
    fn long_text_is_clipped_on_char_boundary() {
        let text = "é".repeat(300);
        let clipped = clip(&text);
        assert_eq!(clipped.chars().count(), TEXT_MAX_CHARS);
    }
}
