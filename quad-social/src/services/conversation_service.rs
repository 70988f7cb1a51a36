use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Conversation, Message, NewConversation, NewParticipant, NotificationKind};
use crate::schema::{conversation_participants, conversations, messages, users};
use crate::services::notification_service;
use crate::services::profile_service::{self, UserSummary};

pub fn conversation_url(conversation_id: Uuid) -> String {
    format!("/conversations/{conversation_id}")
}

/// Canonical key of an unordered pair, backing the unique index on direct
/// conversations.
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{low}:{high}")
}

/// Conversations whose member set is exactly the searched set: every
/// searched user is in it (`matching == size`) and nobody else is
/// (`total == size`).
fn exact_members(matching: &[(Uuid, i64)], totals: &[(Uuid, i64)], size: i64) -> Vec<Uuid> {
    let full: HashSet<Uuid> = matching
        .iter()
        .filter(|(_, n)| *n == size)
        .map(|(id, _)| *id)
        .collect();
    totals
        .iter()
        .filter(|(id, n)| *n == size && full.contains(id))
        .map(|(id, _)| *id)
        .collect()
}

pub fn find_direct(conn: &mut PgConnection, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>> {
    let matching: Vec<(Uuid, i64)> = conversation_participants::table
        .filter(conversation_participants::user_id.eq_any(vec![a, b]))
        .group_by(conversation_participants::conversation_id)
        .select((conversation_participants::conversation_id, count_star()))
        .load(conn)?;

    let candidates: Vec<Uuid> = matching
        .iter()
        .filter(|(_, n)| *n == 2)
        .map(|(id, _)| *id)
        .collect();
    if candidates.is_empty() {
        return Ok(None);
    }

    let totals: Vec<(Uuid, i64)> = conversation_participants::table
        .filter(conversation_participants::conversation_id.eq_any(&candidates))
        .group_by(conversation_participants::conversation_id)
        .select((conversation_participants::conversation_id, count_star()))
        .load(conn)?;

    let exact = exact_members(&matching, &totals, 2);
    if exact.is_empty() {
        return Ok(None);
    }

    Ok(conversations::table
        .filter(conversations::id.eq_any(&exact))
        .order((conversations::updated_at.desc(), conversations::id.asc()))
        .first::<Conversation>(conn)
        .optional()?)
}

/// Make both users members, skipping whoever already is. Returns the number
/// of rows added.
fn add_pair(conn: &mut PgConnection, conversation_id: Uuid, a: Uuid, b: Uuid) -> AppResult<usize> {
    Ok(diesel::insert_into(conversation_participants::table)
        .values(&vec![
            NewParticipant { conversation_id, user_id: a },
            NewParticipant { conversation_id, user_id: b },
        ])
        .on_conflict((conversation_participants::conversation_id, conversation_participants::user_id))
        .do_nothing()
        .execute(conn)?)
}

/// Find the one direct conversation for the pair, creating it on first
/// contact. Returns whether it was created.
pub fn get_or_create_direct(conn: &mut PgConnection, a: Uuid, b: Uuid) -> AppResult<(Conversation, bool)> {
    if a == b {
        return Err(AppError::new(ErrorCode::CannotMessageSelf, "cannot start a conversation with yourself"));
    }

    conn.transaction::<_, AppError, _>(|conn| {
        profile_service::require_user(conn, a)?;
        profile_service::require_user(conn, b)?;

        if let Some(existing) = find_direct(conn, a, b)? {
            return Ok((existing, false));
        }

        let key = direct_key(a, b);
        let inserted = diesel::insert_into(conversations::table)
            .values(&NewConversation {
                is_group: false,
                name: None,
                direct_key: Some(key.clone()),
                created_by: Some(a),
            })
            .on_conflict(conversations::direct_key)
            .do_nothing()
            .get_result::<Conversation>(conn)
            .optional()?;

        let Some(conversation) = inserted else {
            // The key is taken: either a concurrent first contact committed it,
            // or one side deleted their account and was registered again,
            // leaving the conversation with a single member.
            let existing = conversations::table
                .filter(conversations::direct_key.eq(&key))
                .first::<Conversation>(conn)?;
            let restored = add_pair(conn, existing.id, a, b)?;
            if restored > 0 {
                tracing::info!(conversation_id = %existing.id, restored, "direct conversation members restored");
            }
            return Ok((existing, false));
        };

        add_pair(conn, conversation.id, a, b)?;

        tracing::info!(conversation_id = %conversation.id, user_a = %a, user_b = %b, "direct conversation created");
        Ok((conversation, true))
    })
}

pub fn create_group(
    conn: &mut PgConnection,
    creator: Uuid,
    member_ids: &[Uuid],
    name: &str,
) -> AppResult<Conversation> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::new(ErrorCode::GroupNameRequired, "group name is required"));
    }
    let members = notification_service::recipients_excluding(creator, member_ids.iter().copied());
    if members.len() < 2 {
        return Err(AppError::new(
            ErrorCode::GroupTooSmall,
            "a group needs at least two members besides the creator",
        ));
    }

    conn.transaction::<_, AppError, _>(|conn| {
        let creator_user = profile_service::require_user(conn, creator)?;
        let known: i64 = users::table
            .filter(users::id.eq_any(&members))
            .count()
            .get_result(conn)?;
        if known != members.len() as i64 {
            return Err(AppError::new(ErrorCode::UserNotFound, "one or more members do not exist"));
        }

        let conversation = diesel::insert_into(conversations::table)
            .values(&NewConversation {
                is_group: true,
                name: Some(name.to_string()),
                direct_key: None,
                created_by: Some(creator),
            })
            .get_result::<Conversation>(conn)?;

        let rows: Vec<NewParticipant> = std::iter::once(creator)
            .chain(members.iter().copied())
            .map(|user_id| NewParticipant { conversation_id: conversation.id, user_id })
            .collect();
        diesel::insert_into(conversation_participants::table)
            .values(&rows)
            .execute(conn)?;

        notification_service::notify(
            conn,
            &members,
            NotificationKind::GroupInvite,
            &format!("{} added you to {}", creator_user.username, name),
            &conversation_url(conversation.id),
        )?;

        tracing::info!(conversation_id = %conversation.id, members = rows.len(), "group conversation created");
        Ok(conversation)
    })
}

pub fn is_participant(conn: &mut PgConnection, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let count: i64 = conversation_participants::table
        .filter(conversation_participants::conversation_id.eq(conversation_id))
        .filter(conversation_participants::user_id.eq(user_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Load the conversation, refusing users who are not in it.
pub fn require_participant(conn: &mut PgConnection, conversation_id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
    let conversation = conversations::table
        .find(conversation_id)
        .first::<Conversation>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ConversationNotFound, "conversation not found"))?;

    if !is_participant(conn, conversation_id, user_id)? {
        return Err(AppError::new(ErrorCode::NotConversationMember, "not a member of this conversation"));
    }
    Ok(conversation)
}

pub fn participant_ids(conn: &mut PgConnection, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
    Ok(conversation_participants::table
        .filter(conversation_participants::conversation_id.eq(conversation_id))
        .order(conversation_participants::joined_at.asc())
        .select(conversation_participants::user_id)
        .load::<Uuid>(conn)?)
}

pub fn add_member(conn: &mut PgConnection, actor: Uuid, conversation_id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
    conn.transaction::<_, AppError, _>(|conn| {
        let conversation = require_participant(conn, conversation_id, actor)?;
        if !conversation.is_group {
            return Err(AppError::bad_request("members can only be added to group conversations"));
        }
        let actor_user = profile_service::require_user(conn, actor)?;
        profile_service::require_user(conn, user_id)?;

        diesel::insert_into(conversation_participants::table)
            .values(&NewParticipant { conversation_id, user_id })
            .execute(conn)
            .map_err(|e| {
                AppError::from_unique_violation(
                    e,
                    ErrorCode::AlreadyConversationMember,
                    "user is already in this conversation",
                )
            })?;

        notification_service::notify(
            conn,
            &[user_id],
            NotificationKind::GroupInvite,
            &format!(
                "{} added you to {}",
                actor_user.username,
                conversation.name.as_deref().unwrap_or("a group")
            ),
            &conversation_url(conversation_id),
        )?;

        tracing::info!(conversation_id = %conversation_id, user_id = %user_id, "member added to group");
        Ok(conversation)
    })
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participant_count: usize,
    /// The other side of a direct conversation.
    pub other_participant: Option<UserSummary>,
    pub last_message: Option<Message>,
}

impl ConversationSummary {
    fn last_activity(&self) -> (Option<DateTime<Utc>>, DateTime<Utc>) {
        (self.last_message.as_ref().map(|m| m.created_at), self.conversation.updated_at)
    }
}

/// Most recent message first, then most recently touched.
fn sort_by_activity(items: &mut [ConversationSummary]) {
    items.sort_by(|x, y| {
        y.last_activity()
            .cmp(&x.last_activity())
            .then_with(|| x.conversation.id.cmp(&y.conversation.id))
    });
}

pub fn list_conversations(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
    let ids: Vec<Uuid> = conversation_participants::table
        .filter(conversation_participants::user_id.eq(user_id))
        .select(conversation_participants::conversation_id)
        .load(conn)?;
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let convs = conversations::table
        .filter(conversations::id.eq_any(&ids))
        .load::<Conversation>(conn)?;

    let memberships: Vec<(Uuid, Uuid)> = conversation_participants::table
        .filter(conversation_participants::conversation_id.eq_any(&ids))
        .select((conversation_participants::conversation_id, conversation_participants::user_id))
        .load(conn)?;
    let mut members: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (conversation_id, member) in memberships {
        members.entry(conversation_id).or_default().push(member);
    }

    let mut last_messages: HashMap<Uuid, Message> = messages::table
        .filter(messages::conversation_id.eq_any(&ids))
        .distinct_on(messages::conversation_id)
        .order((messages::conversation_id, messages::id.desc()))
        .load::<Message>(conn)?
        .into_iter()
        .map(|m| (m.conversation_id, m))
        .collect();

    let others: Vec<Uuid> = convs
        .iter()
        .filter(|c| !c.is_group)
        .filter_map(|c| members.get(&c.id)?.iter().copied().find(|m| *m != user_id))
        .collect();
    let mut other_summaries: HashMap<Uuid, UserSummary> = profile_service::summaries(conn, &others)?
        .into_iter()
        .map(|s| (s.user_id, s))
        .collect();

    let mut items: Vec<ConversationSummary> = convs
        .into_iter()
        .map(|conversation| {
            let member_ids = members.remove(&conversation.id).unwrap_or_default();
            let other_participant = if conversation.is_group {
                None
            } else {
                member_ids
                    .iter()
                    .find(|m| **m != user_id)
                    .and_then(|m| other_summaries.remove(m))
            };
            ConversationSummary {
                participant_count: member_ids.len(),
                other_participant,
                last_message: last_messages.remove(&conversation.id),
                conversation,
            }
        })
        .collect();

    sort_by_activity(&mut items);
    Ok(items)
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<UserSummary>,
}

/// Opening a conversation clears the viewer's message notifications for it.
pub fn conversation_detail(conn: &mut PgConnection, user_id: Uuid, conversation_id: Uuid) -> AppResult<ConversationDetail> {
    let conversation = require_participant(conn, conversation_id, user_id)?;
    let ids = participant_ids(conn, conversation_id)?;
    let participants = profile_service::summaries(conn, &ids)?;

    notification_service::mark_read_for_target(
        conn,
        user_id,
        NotificationKind::Message,
        &conversation_url(conversation_id),
    )?;

    Ok(ConversationDetail { conversation, participants })
}
