//! Races between sessions that commit for real. Set `QUAD_TEST_DATABASE_URL`
//! to run; each test works in its own schema and drops it afterwards.

mod common;

use std::sync::Barrier;
use std::thread;

use diesel::prelude::*;
use uuid::Uuid;

use quad_shared::errors::ErrorCode;
use quad_social::models::NotificationKind;
use quad_social::schema::{conversation_participants, conversations, friend_requests, friendships, notifications};
use quad_social::services::friend_service::{self, Resolution};
use quad_social::services::conversation_service;

/// Run both calls on their own session, released together.
fn race<T, F>(db: &common::ScratchDatabase, calls: [F; 2]) -> Vec<T>
where
    T: Send,
    F: FnOnce(&mut diesel::pg::PgConnection) -> T + Send,
{
    let barrier = Barrier::new(2);
    thread::scope(|scope| {
        let handles: Vec<_> = calls
            .into_iter()
            .map(|call| {
                let barrier = &barrier;
                scope.spawn(move || {
                    let mut conn = db.connect();
                    barrier.wait();
                    call(&mut conn)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("racing thread")).collect()
    })
}

#[test]
fn concurrent_first_contact_creates_one_direct_conversation() {
    let Some(db) = common::ScratchDatabase::create() else { return };
    let mut conn = db.connect();
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");

    let outcomes = race(&db, [(alice, bob), (bob, alice)].map(|(a, b)| {
        move |conn: &mut diesel::pg::PgConnection| {
            let (conversation, created) = conversation_service::get_or_create_direct(conn, a, b).unwrap();
            (conversation.id, created)
        }
    }));

    assert_eq!(outcomes[0].0, outcomes[1].0);
    assert_eq!(outcomes.iter().filter(|(_, created)| *created).count(), 1);

    let keyed: i64 = conversations::table
        .filter(conversations::direct_key.eq(conversation_service::direct_key(alice, bob)))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(keyed, 1);

    let members: i64 = conversation_participants::table
        .filter(conversation_participants::conversation_id.eq(outcomes[0].0))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(members, 2);
}

#[test]
fn concurrent_accepts_create_one_friendship_pair() {
    let Some(db) = common::ScratchDatabase::create() else { return };
    let mut conn = db.connect();
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");
    let request = friend_service::send_request(&mut conn, alice, bob).unwrap();

    let resolutions = race(&db, [request.id; 2].map(|id| {
        move |conn: &mut diesel::pg::PgConnection| friend_service::accept(conn, id, bob).unwrap().1
    }));

    assert!(resolutions.contains(&Resolution::Applied));
    assert!(resolutions.contains(&Resolution::AlreadyResolved));

    let rows: i64 = friendships::table.count().get_result(&mut conn).unwrap();
    assert_eq!(rows, 2);

    let accepted_notes: i64 = notifications::table
        .filter(notifications::user_id.eq(alice))
        .filter(notifications::kind.eq(NotificationKind::FriendAccepted.as_str()))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(accepted_notes, 1);
}

#[test]
fn crossing_requests_leave_one_pending() {
    let Some(db) = common::ScratchDatabase::create() else { return };
    let mut conn = db.connect();
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");

    let outcomes: Vec<Result<Uuid, Option<ErrorCode>>> = race(&db, [(alice, bob), (bob, alice)].map(|(from, to)| {
        move |conn: &mut diesel::pg::PgConnection| {
            friend_service::send_request(conn, from, to)
                .map(|request| request.id)
                .map_err(|e| e.code())
        }
    }));

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(outcomes.contains(&Err(Some(ErrorCode::DuplicatePendingRequest))));

    let pending: i64 = friend_requests::table
        .filter(friend_requests::status.eq("pending"))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(pending, 1);
}
