use std::collections::HashMap;

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{
    FriendRequest, FriendRequestStatus, NewFriendRequest, NewFriendship, NotificationKind, Role,
};
use crate::schema::{friend_requests, friendships, profiles};
use crate::services::notification_service;
use crate::services::profile_service::{self, UserSummary};

pub const REQUESTS_URL: &str = "/friends/requests";
pub const FRIENDS_URL: &str = "/friends";

/// What a resolution call did to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    AlreadyResolved,
}

pub fn are_friends(conn: &mut PgConnection, user_id: Uuid, other_id: Uuid) -> AppResult<bool> {
    let count: i64 = friendships::table
        .filter(friendships::user_id.eq(user_id))
        .filter(friendships::friend_id.eq(other_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Ids on the far side of the user's outgoing friendship rows.
pub fn friend_ids(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<Uuid>> {
    Ok(friendships::table
        .filter(friendships::user_id.eq(user_id))
        .order(friendships::created_at.asc())
        .select(friendships::friend_id)
        .load::<Uuid>(conn)?)
}

pub fn friends_of(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<UserSummary>> {
    let ids = friend_ids(conn, user_id)?;
    profile_service::summaries(conn, &ids)
}

/// A CIO account together with everyone it is friends with.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CioCircle {
    pub cio_id: Uuid,
    pub friend_ids: Vec<Uuid>,
}

fn group_circles(cio_ids: Vec<Uuid>, rows: Vec<(Uuid, Uuid)>) -> Vec<CioCircle> {
    let mut by_cio: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (cio_id, friend_id) in rows {
        by_cio.entry(cio_id).or_default().push(friend_id);
    }
    cio_ids
        .into_iter()
        .map(|cio_id| CioCircle { cio_id, friend_ids: by_cio.remove(&cio_id).unwrap_or_default() })
        .collect()
}

/// Every CIO with its friend ids, CIOs without friends included.
pub fn cio_circles(conn: &mut PgConnection) -> AppResult<Vec<CioCircle>> {
    let cio_ids = profiles::table
        .filter(profiles::role.eq(Role::Cio.as_str()))
        .order(profiles::user_id.asc())
        .select(profiles::user_id)
        .load::<Uuid>(conn)?;

    let rows = friendships::table
        .filter(friendships::user_id.eq_any(&cio_ids))
        .order((friendships::user_id.asc(), friendships::friend_id.asc()))
        .select((friendships::user_id, friendships::friend_id))
        .load::<(Uuid, Uuid)>(conn)?;

    Ok(group_circles(cio_ids, rows))
}

fn pending_between(conn: &mut PgConnection, a: Uuid, b: Uuid) -> AppResult<Option<FriendRequest>> {
    Ok(friend_requests::table
        .filter(friend_requests::status.eq(FriendRequestStatus::Pending.as_str()))
        .filter(
            friend_requests::from_user_id
                .eq(a)
                .and(friend_requests::to_user_id.eq(b))
                .or(friend_requests::from_user_id.eq(b).and(friend_requests::to_user_id.eq(a))),
        )
        .first::<FriendRequest>(conn)
        .optional()?)
}

pub fn send_request(conn: &mut PgConnection, from: Uuid, to: Uuid) -> AppResult<FriendRequest> {
    if from == to {
        return Err(AppError::new(ErrorCode::CannotFriendSelf, "cannot send a friend request to yourself"));
    }

    conn.transaction::<_, AppError, _>(|conn| {
        let sender = profile_service::require_user(conn, from)?;
        profile_service::require_user(conn, to)?;

        if are_friends(conn, from, to)? {
            return Err(AppError::new(ErrorCode::AlreadyFriends, "already friends"));
        }
        if pending_between(conn, from, to)?.is_some() {
            return Err(AppError::new(
                ErrorCode::DuplicatePendingRequest,
                "a pending friend request already exists between these users",
            ));
        }

        let request = diesel::insert_into(friend_requests::table)
            .values(&NewFriendRequest { from_user_id: from, to_user_id: to })
            .get_result::<FriendRequest>(conn)
            .map_err(|e| {
                AppError::from_unique_violation(
                    e,
                    ErrorCode::DuplicatePendingRequest,
                    "a pending friend request already exists between these users",
                )
            })?;

        notification_service::notify(
            conn,
            &[to],
            NotificationKind::FriendRequest,
            &format!("{} sent you a friend request", sender.username),
            REQUESTS_URL,
        )?;

        tracing::info!(request_id = %request.id, from = %from, to = %to, "friend request sent");
        Ok(request)
    })
}

fn lock_request(conn: &mut PgConnection, request_id: Uuid) -> AppResult<FriendRequest> {
    friend_requests::table
        .find(request_id)
        .for_update()
        .first::<FriendRequest>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::FriendRequestNotFound, "friend request not found"))
}

fn set_status(
    conn: &mut PgConnection,
    request_id: Uuid,
    status: FriendRequestStatus,
) -> AppResult<FriendRequest> {
    Ok(diesel::update(friend_requests::table.find(request_id))
        .set((
            friend_requests::status.eq(status.as_str()),
            friend_requests::responded_at.eq(Some(Utc::now())),
        ))
        .get_result::<FriendRequest>(conn)?)
}

/// Insert both directed rows. Existing rows are left alone so a retried
/// accept cannot produce duplicates.
fn make_friends(conn: &mut PgConnection, a: Uuid, b: Uuid) -> AppResult<()> {
    diesel::insert_into(friendships::table)
        .values(&vec![
            NewFriendship { user_id: a, friend_id: b },
            NewFriendship { user_id: b, friend_id: a },
        ])
        .on_conflict((friendships::user_id, friendships::friend_id))
        .do_nothing()
        .execute(conn)?;
    Ok(())
}

pub fn accept(conn: &mut PgConnection, request_id: Uuid, acting: Uuid) -> AppResult<(FriendRequest, Resolution)> {
    conn.transaction::<_, AppError, _>(|conn| {
        let request = lock_request(conn, request_id)?;
        if request.to_user_id != acting {
            return Err(AppError::forbidden("only the recipient can accept this request"));
        }

        match request.status()? {
            FriendRequestStatus::Accepted => return Ok((request, Resolution::AlreadyResolved)),
            FriendRequestStatus::Declined | FriendRequestStatus::Canceled => {
                return Err(AppError::new(
                    ErrorCode::FriendRequestResolved,
                    format!("friend request was already {}", request.status),
                ));
            }
            FriendRequestStatus::Pending => {}
        }

        let accepted = set_status(conn, request.id, FriendRequestStatus::Accepted)?;
        make_friends(conn, request.from_user_id, request.to_user_id)?;

        let accepter = profile_service::require_user(conn, acting)?;
        notification_service::notify(
            conn,
            &[request.from_user_id],
            NotificationKind::FriendAccepted,
            &format!("{} accepted your friend request", accepter.username),
            FRIENDS_URL,
        )?;

        tracing::info!(
            request_id = %request.id,
            user_a = %request.from_user_id,
            user_b = %request.to_user_id,
            "friendship created"
        );
        Ok((accepted, Resolution::Applied))
    })
}

pub fn decline(conn: &mut PgConnection, request_id: Uuid, acting: Uuid) -> AppResult<(FriendRequest, Resolution)> {
    conn.transaction::<_, AppError, _>(|conn| {
        let request = lock_request(conn, request_id)?;
        if request.to_user_id != acting {
            return Err(AppError::forbidden("only the recipient can decline this request"));
        }
        if request.status()? != FriendRequestStatus::Pending {
            return Ok((request, Resolution::AlreadyResolved));
        }

        let declined = set_status(conn, request.id, FriendRequestStatus::Declined)?;
        tracing::info!(request_id = %request.id, "friend request declined");
        Ok((declined, Resolution::Applied))
    })
}

pub fn cancel(conn: &mut PgConnection, request_id: Uuid, acting: Uuid) -> AppResult<(FriendRequest, Resolution)> {
    conn.transaction::<_, AppError, _>(|conn| {
        let request = lock_request(conn, request_id)?;
        if request.from_user_id != acting {
            return Err(AppError::forbidden("only the sender can cancel this request"));
        }
        if request.status()? != FriendRequestStatus::Pending {
            return Ok((request, Resolution::AlreadyResolved));
        }

        let canceled = set_status(conn, request.id, FriendRequestStatus::Canceled)?;
        tracing::info!(request_id = %request.id, "friend request canceled");
        Ok((canceled, Resolution::Applied))
    })
}

/// Pending requests addressed to the user, newest first. Viewing the inbox
/// clears the matching notifications.
pub fn incoming_requests(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<FriendRequest>> {
    let requests = friend_requests::table
        .filter(friend_requests::to_user_id.eq(user_id))
        .filter(friend_requests::status.eq(FriendRequestStatus::Pending.as_str()))
        .order(friend_requests::created_at.desc())
        .load::<FriendRequest>(conn)?;

    notification_service::mark_read_for_target(conn, user_id, NotificationKind::FriendRequest, REQUESTS_URL)?;
    Ok(requests)
}

pub fn outgoing_requests(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<FriendRequest>> {
    Ok(friend_requests::table
        .filter(friend_requests::from_user_id.eq(user_id))
        .filter(friend_requests::status.eq(FriendRequestStatus::Pending.as_str()))
        .order(friend_requests::created_at.desc())
        .load::<FriendRequest>(conn)?)
}

pub fn remove_friend(conn: &mut PgConnection, user_id: Uuid, other_id: Uuid) -> AppResult<()> {
    conn.transaction::<_, AppError, _>(|conn| {
        let removed = diesel::delete(
            friendships::table.filter(
                friendships::user_id
                    .eq(user_id)
                    .and(friendships::friend_id.eq(other_id))
                    .or(friendships::user_id.eq(other_id).and(friendships::friend_id.eq(user_id))),
            ),
        )
        .execute(conn)?;

        if removed == 0 {
            return Err(AppError::new(ErrorCode::NotFriends, "not friends"));
        }

        tracing::info!(user_a = %user_id, user_b = %other_id, "friendship removed");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circles_keep_friendless_cios() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (f1, f2) = (Uuid::new_v4(), Uuid::new_v4());
        let circles = group_circles(vec![a, b], vec![(a, f1), (a, f2)]);
        assert_eq!(circles[0], CioCircle { cio_id: a, friend_ids: vec![f1, f2] });
        assert_eq!(circles[1], CioCircle { cio_id: b, friend_ids: vec![] });
    }
}
