use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Message, NewMessage, NotificationKind};
use crate::schema::{conversations, messages};
use crate::services::conversation_service::{self, conversation_url};
use crate::services::{notification_service, profile_service};

/// Upper bound on one incremental poll; clients poll again from the last id.
pub const MAX_POLL_BATCH: i64 = 500;

const PREVIEW_CHARS: usize = 80;

fn preview(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

pub fn send(conn: &mut PgConnection, conversation_id: Uuid, sender: Uuid, body: &str) -> AppResult<Message> {
    conn.transaction::<_, AppError, _>(|conn| {
        conversation_service::require_participant(conn, conversation_id, sender)?;

        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::new(ErrorCode::EmptyMessageBody, "message body must not be empty"));
        }

        let message = diesel::insert_into(messages::table)
            .values(&NewMessage { conversation_id, sender_id: sender, body })
            .get_result::<Message>(conn)?;

        diesel::update(conversations::table.find(conversation_id))
            .set(conversations::updated_at.eq(Utc::now()))
            .execute(conn)?;

        let sender_user = profile_service::require_user(conn, sender)?;
        let recipients = notification_service::recipients_excluding(
            sender,
            conversation_service::participant_ids(conn, conversation_id)?,
        );
        notification_service::notify(
            conn,
            &recipients,
            NotificationKind::Message,
            &format!("{}: {}", sender_user.username, preview(body)),
            &conversation_url(conversation_id),
        )?;

        tracing::info!(
            conversation_id = %conversation_id,
            message_id = message.id,
            recipients = recipients.len(),
            "message sent"
        );
        Ok(message)
    })
}

/// Messages after `after_id` in ascending order, or the newest `page_size`
/// (still ascending) when no cursor is given.
pub fn list_since(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    viewer: Uuid,
    after_id: Option<i64>,
    page_size: i64,
) -> AppResult<Vec<Message>> {
    conversation_service::require_participant(conn, conversation_id, viewer)?;

    match after_id {
        Some(after) => Ok(messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .filter(messages::id.gt(after))
            .order(messages::id.asc())
            .limit(MAX_POLL_BATCH)
            .load::<Message>(conn)?),
        None => {
            let mut newest = messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .order(messages::id.desc())
                .limit(page_size.max(1))
                .load::<Message>(conn)?;
            newest.reverse();
            Ok(newest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_previews_verbatim() {
        assert_eq!(preview("see you at 5"), "see you at 5");
    }

    #[test]
    fn long_body_preview_is_truncated() {
        let body = "x".repeat(200);
        let p = preview(&body);
        assert!(p.ends_with('…'));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 1);
    }
}
