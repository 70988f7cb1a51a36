use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult, ErrorCode};
use quad_shared::types::PaginationParams;

use crate::models::{Event, NewEvent, NotificationKind};
use crate::schema::events;
use crate::services::profile_service::{self, Capabilities};
use crate::services::{friend_service, notification_service};

pub fn event_url(event_id: Uuid) -> String {
    format!("/events/{event_id}")
}

#[derive(Debug)]
pub struct EventInput {
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
}

fn check_window(start_at: DateTime<Utc>, end_at: Option<DateTime<Utc>>) -> AppResult<()> {
    match end_at {
        Some(end) if end < start_at => Err(AppError::new(
            ErrorCode::InvalidEventWindow,
            "event cannot end before it starts",
        )),
        _ => Ok(()),
    }
}

/// CIO accounts announce events to their friends.
pub fn create_event(conn: &mut PgConnection, creator: Uuid, caps: &Capabilities, input: EventInput) -> AppResult<Event> {
    if !caps.is_cio {
        return Err(AppError::new(ErrorCode::NotCio, "only CIO accounts can create events"));
    }
    let title = input.title.trim();
    if title.is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "event title is required"));
    }
    check_window(input.start_at, input.end_at)?;

    conn.transaction::<_, AppError, _>(|conn| {
        let event = diesel::insert_into(events::table)
            .values(&NewEvent {
                creator_id: creator,
                title: title.to_string(),
                description: input.description.trim().to_string(),
                location: input.location.trim().to_string(),
                start_at: input.start_at,
                end_at: input.end_at,
            })
            .get_result::<Event>(conn)?;

        let creator_user = profile_service::require_user(conn, creator)?;
        let recipients = notification_service::recipients_excluding(
            creator,
            friend_service::friend_ids(conn, creator)?,
        );
        notification_service::notify(
            conn,
            &recipients,
            NotificationKind::Event,
            &format!("{} is hosting {}", creator_user.username, event.title),
            &event_url(event.id),
        )?;

        tracing::info!(event_id = %event.id, creator = %creator, notified = recipients.len(), "event created");
        Ok(event)
    })
}

/// Events that have not finished yet, soonest first.
pub fn list_events(conn: &mut PgConnection, now: DateTime<Utc>, params: &PaginationParams) -> AppResult<(Vec<Event>, i64)> {
    let total: i64 = events::table
        .filter(events::start_at.ge(now).nullable().or(events::end_at.ge(now)))
        .count()
        .get_result(conn)?;
    let items = events::table
        .filter(events::start_at.ge(now).nullable().or(events::end_at.ge(now)))
        .order((events::start_at.asc(), events::id.asc()))
        .offset(params.sql_offset())
        .limit(params.sql_limit())
        .load::<Event>(conn)?;

    Ok((items, total))
}

pub fn event_detail(conn: &mut PgConnection, viewer: Option<Uuid>, event_id: Uuid) -> AppResult<Event> {
    let event = events::table
        .find(event_id)
        .first::<Event>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::EventNotFound, "event not found"))?;

    if let Some(user_id) = viewer {
        notification_service::mark_read_for_target(conn, user_id, NotificationKind::Event, &event_url(event.id))?;
    }
    Ok(event)
}
