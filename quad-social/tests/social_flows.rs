//! End-to-end service flows against PostgreSQL. Set `QUAD_TEST_DATABASE_URL`
//! to run them; every test rolls back its own transaction.

mod common;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use quad_shared::errors::ErrorCode;
use quad_shared::types::PaginationParams;
use quad_social::models::{FriendRequestStatus, NotificationKind};
use quad_social::schema::{friendships, notifications, profiles};
use quad_social::services::friend_service::{self, Resolution};
use quad_social::services::post_service::{self, PostInput};
use quad_social::services::profile_service::{self, Capabilities};
use quad_social::services::visibility::Viewer;
use quad_social::services::{conversation_service, message_service, notification_service};

#[test]
fn accepting_creates_both_friendship_rows() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");

    let request = friend_service::send_request(&mut conn, alice, bob).unwrap();
    let (accepted, resolution) = friend_service::accept(&mut conn, request.id, bob).unwrap();

    assert_eq!(resolution, Resolution::Applied);
    assert_eq!(accepted.status().unwrap(), FriendRequestStatus::Accepted);
    assert!(friend_service::are_friends(&mut conn, alice, bob).unwrap());
    assert!(friend_service::are_friends(&mut conn, bob, alice).unwrap());

    let rows: i64 = friendships::table.count().get_result(&mut conn).unwrap();
    assert_eq!(rows, 2);
}

#[test]
fn accept_twice_is_a_no_op() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");

    let request = friend_service::send_request(&mut conn, alice, bob).unwrap();
    friend_service::accept(&mut conn, request.id, bob).unwrap();
    let (_, second) = friend_service::accept(&mut conn, request.id, bob).unwrap();

    assert_eq!(second, Resolution::AlreadyResolved);
    let rows: i64 = friendships::table.count().get_result(&mut conn).unwrap();
    assert_eq!(rows, 2);
}

#[test]
fn declined_request_cannot_be_accepted() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");

    let request = friend_service::send_request(&mut conn, alice, bob).unwrap();
    let (_, first) = friend_service::decline(&mut conn, request.id, bob).unwrap();
    let (_, again) = friend_service::decline(&mut conn, request.id, bob).unwrap();
    assert_eq!(first, Resolution::Applied);
    assert_eq!(again, Resolution::AlreadyResolved);

    let err = friend_service::accept(&mut conn, request.id, bob).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::FriendRequestResolved));
    assert!(!friend_service::are_friends(&mut conn, alice, bob).unwrap());
}

#[test]
fn only_the_recipient_may_accept() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");

    let request = friend_service::send_request(&mut conn, alice, bob).unwrap();
    let err = friend_service::accept(&mut conn, request.id, alice).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::Forbidden));
}

#[test]
fn one_pending_request_per_pair() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");

    friend_service::send_request(&mut conn, alice, bob).unwrap();

    let same_way = friend_service::send_request(&mut conn, alice, bob).unwrap_err();
    assert_eq!(same_way.code(), Some(ErrorCode::DuplicatePendingRequest));
    let reverse = friend_service::send_request(&mut conn, bob, alice).unwrap_err();
    assert_eq!(reverse.code(), Some(ErrorCode::DuplicatePendingRequest));
}

#[test]
fn self_and_existing_friends_are_rejected() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");

    let err = friend_service::send_request(&mut conn, alice, alice).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::CannotFriendSelf));

    common::befriend(&mut conn, alice, bob);
    let err = friend_service::send_request(&mut conn, bob, alice).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::AlreadyFriends));
}

#[test]
fn canceled_request_frees_the_pair() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");

    let request = friend_service::send_request(&mut conn, alice, bob).unwrap();
    let err = friend_service::cancel(&mut conn, request.id, bob).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::Forbidden));

    friend_service::cancel(&mut conn, request.id, alice).unwrap();
    assert!(friend_service::send_request(&mut conn, bob, alice).is_ok());
}

#[test]
fn direct_conversation_is_shared_by_the_pair() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");

    let (first, created) = conversation_service::get_or_create_direct(&mut conn, alice, bob).unwrap();
    let (second, created_again) = conversation_service::get_or_create_direct(&mut conn, bob, alice).unwrap();

    assert!(created);
    assert!(!created_again);
    assert_eq!(first.id, second.id);
    assert_eq!(conversation_service::participant_ids(&mut conn, first.id).unwrap().len(), 2);

    let err = conversation_service::get_or_create_direct(&mut conn, alice, alice).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::CannotMessageSelf));
}

#[test]
fn friend_without_profile_is_still_listed() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");
    common::befriend(&mut conn, alice, bob);

    diesel::delete(profiles::table.filter(profiles::user_id.eq(bob)))
        .execute(&mut conn)
        .unwrap();

    let friends = friend_service::friends_of(&mut conn, alice).unwrap();
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0].user_id, bob);
}

#[test]
fn returning_user_rejoins_their_direct_conversation() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");

    let (original, _) = conversation_service::get_or_create_direct(&mut conn, alice, bob).unwrap();
    profile_service::delete_account(&mut conn, bob).unwrap();
    assert_eq!(conversation_service::participant_ids(&mut conn, original.id).unwrap(), vec![alice]);

    profile_service::register_user(&mut conn, bob, "bob").unwrap();
    let (reopened, created) = conversation_service::get_or_create_direct(&mut conn, alice, bob).unwrap();

    assert!(!created);
    assert_eq!(reopened.id, original.id);
    let mut members = conversation_service::participant_ids(&mut conn, reopened.id).unwrap();
    members.sort();
    let mut expected = vec![alice, bob];
    expected.sort();
    assert_eq!(members, expected);

    message_service::send(&mut conn, reopened.id, bob, "back again").unwrap();
    let found = conversation_service::find_direct(&mut conn, bob, alice).unwrap().unwrap();
    assert_eq!(found.id, original.id);
}

#[test]
fn group_with_same_pair_does_not_count_as_direct() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");
    let carol = common::user(&mut conn, "carol");

    conversation_service::create_group(&mut conn, alice, &[bob, carol], "study group").unwrap();
    assert!(conversation_service::find_direct(&mut conn, alice, bob).unwrap().is_none());
}

#[test]
fn messages_come_back_in_send_order() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");
    let (conversation, _) = conversation_service::get_or_create_direct(&mut conn, alice, bob).unwrap();

    let first = message_service::send(&mut conn, conversation.id, alice, "one").unwrap();
    message_service::send(&mut conn, conversation.id, bob, "two").unwrap();
    message_service::send(&mut conn, conversation.id, alice, "three").unwrap();

    let all = message_service::list_since(&mut conn, conversation.id, bob, None, 50).unwrap();
    let bodies: Vec<&str> = all.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["one", "two", "three"]);

    let newer = message_service::list_since(&mut conn, conversation.id, alice, Some(first.id), 50).unwrap();
    let bodies: Vec<&str> = newer.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["two", "three"]);

    let latest = message_service::list_since(&mut conn, conversation.id, alice, None, 2).unwrap();
    let bodies: Vec<&str> = latest.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["two", "three"]);
}

#[test]
fn outsiders_cannot_read_or_post() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");
    let mallory = common::user(&mut conn, "mallory");
    let (conversation, _) = conversation_service::get_or_create_direct(&mut conn, alice, bob).unwrap();

    let err = message_service::send(&mut conn, conversation.id, mallory, "hi").unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotConversationMember));
    let err = message_service::list_since(&mut conn, conversation.id, mallory, None, 50).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotConversationMember));

    let err = message_service::send(&mut conn, conversation.id, alice, "   ").unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::EmptyMessageBody));
}

#[test]
fn group_message_notifies_everyone_but_the_sender() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");
    let carol = common::user(&mut conn, "carol");
    let group = conversation_service::create_group(&mut conn, alice, &[bob, carol], "trio").unwrap();

    message_service::send(&mut conn, group.id, alice, "hello both").unwrap();

    let message_kind = NotificationKind::Message.as_str();
    let count_for = |conn: &mut PgConnection, user_id: Uuid| -> i64 {
        notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::kind.eq(message_kind))
            .count()
            .get_result(conn)
            .unwrap()
    };
    assert_eq!(count_for(&mut conn, alice), 0);
    assert_eq!(count_for(&mut conn, bob), 1);
    assert_eq!(count_for(&mut conn, carol), 1);
}

#[test]
fn opening_the_conversation_clears_its_notifications() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");
    let (conversation, _) = conversation_service::get_or_create_direct(&mut conn, alice, bob).unwrap();
    message_service::send(&mut conn, conversation.id, alice, "ping").unwrap();

    assert_eq!(notification_service::unread_count(&mut conn, bob).unwrap(), 1);
    conversation_service::conversation_detail(&mut conn, bob, conversation.id).unwrap();
    assert_eq!(notification_service::unread_count(&mut conn, bob).unwrap(), 0);

    let (listed, total) = notification_service::list(&mut conn, bob, &PaginationParams::default()).unwrap();
    assert_eq!(total, 1);
    assert!(listed[0].is_read);
}

#[test]
fn friends_only_post_opens_up_after_accept() {
    let Some(mut conn) = common::test_connection() else { return };
    let author = common::user(&mut conn, "author");
    let reader = common::user(&mut conn, "reader");

    let post = post_service::create_post(
        &mut conn,
        author,
        PostInput {
            title: "weekend plans".into(),
            privacy: Some("friends_only".into()),
            ..Default::default()
        },
    )
    .unwrap();

    let err = post_service::get_post(&mut conn, Viewer::User(reader), false, post.post.id).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::PostNotFound));

    common::befriend(&mut conn, author, reader);
    assert!(post_service::get_post(&mut conn, Viewer::User(reader), false, post.post.id).is_ok());
    assert!(post_service::get_post(&mut conn, Viewer::Anonymous, false, post.post.id).is_err());
}

#[test]
fn cio_wide_post_reaches_members_of_a_shared_circle() {
    let Some(mut conn) = common::test_connection() else { return };
    let club = common::cio(&mut conn, "garden-club");
    let author = common::user(&mut conn, "author");
    let member = common::user(&mut conn, "member");
    let outsider = common::user(&mut conn, "outsider");
    common::befriend(&mut conn, author, club);
    common::befriend(&mut conn, member, club);

    let post = post_service::create_post(
        &mut conn,
        author,
        PostInput {
            title: "seed swap".into(),
            privacy: Some("cio_wide".into()),
            ..Default::default()
        },
    )
    .unwrap();

    let params = PaginationParams::default();
    let (member_feed, _) = post_service::list_posts(&mut conn, Viewer::User(member), false, None, &params).unwrap();
    let (outsider_feed, _) = post_service::list_posts(&mut conn, Viewer::User(outsider), false, None, &params).unwrap();

    assert!(member_feed.iter().any(|p| p.post.id == post.post.id));
    assert!(outsider_feed.is_empty());
    assert!(post_service::get_post(&mut conn, Viewer::User(member), false, post.post.id).is_ok());
}

fn post_as(conn: &mut PgConnection, author: Uuid, title: &str, privacy: &str) -> Uuid {
    post_service::create_post(
        conn,
        author,
        PostInput { title: title.into(), privacy: Some(privacy.into()), ..Default::default() },
    )
    .unwrap()
    .post
    .id
}

#[test]
fn feed_is_filtered_counted_and_paged_in_the_database() {
    let Some(mut conn) = common::test_connection() else { return };
    let alice = common::user(&mut conn, "alice");
    let bob = common::user(&mut conn, "bob");
    let carol = common::user(&mut conn, "carol");
    let moderator = common::user(&mut conn, "moderator");
    common::befriend(&mut conn, alice, bob);

    let public = post_as(&mut conn, alice, "open day", "public");
    let for_friends = post_as(&mut conn, alice, "dinner plans", "friends_only");
    let hidden = post_as(&mut conn, alice, "spam", "public");
    post_as(&mut conn, carol, "carol only", "friends_only");

    let mod_caps = Capabilities { is_moderator: true, ..Default::default() };
    quad_social::services::moderation_service::hide_post(&mut conn, moderator, &mod_caps, hidden, None).unwrap();

    let ids = |feed: &[post_service::PostWithImages]| feed.iter().map(|p| p.post.id).collect::<Vec<_>>();

    // Rows written in one transaction share `created_at`, so compare as sets.
    let first = PaginationParams::new(1, 1);
    let (page_one, total) = post_service::list_posts(&mut conn, Viewer::User(bob), false, None, &first).unwrap();
    assert_eq!(total, 2);
    let second = PaginationParams::new(2, 1);
    let (page_two, _) = post_service::list_posts(&mut conn, Viewer::User(bob), false, None, &second).unwrap();

    let mut seen = [ids(&page_one), ids(&page_two)].concat();
    seen.sort();
    let mut expected = vec![public, for_friends];
    expected.sort();
    assert_eq!(seen, expected);

    let beyond = PaginationParams::new(u64::MAX, 20);
    let (empty, total) = post_service::list_posts(&mut conn, Viewer::User(bob), false, None, &beyond).unwrap();
    assert!(empty.is_empty());
    assert_eq!(total, 2);

    let all = PaginationParams::default();
    let (anonymous, total) = post_service::list_posts(&mut conn, Viewer::Anonymous, false, None, &all).unwrap();
    assert_eq!((ids(&anonymous), total), (vec![public], 1));

    let (own, total) = post_service::list_posts(&mut conn, Viewer::User(alice), false, None, &all).unwrap();
    assert_eq!(total, 3);
    assert!(ids(&own).contains(&hidden));

    let (moderated, total) = post_service::list_posts(&mut conn, Viewer::User(moderator), true, None, &all).unwrap();
    assert_eq!(total, 2);
    let mut moderated = ids(&moderated);
    moderated.sort();
    let mut expected = vec![hidden, public];
    expected.sort();
    assert_eq!(moderated, expected);

    let (tagged, total) = post_service::list_posts(&mut conn, Viewer::User(bob), false, Some("event"), &all).unwrap();
    assert!(tagged.is_empty());
    assert_eq!(total, 0);
}

#[test]
fn suspension_removes_write_capability() {
    let Some(mut conn) = common::test_connection() else { return };
    let moderator = common::user(&mut conn, "moderator");
    let target = common::user(&mut conn, "target");

    let mod_caps = Capabilities { is_moderator: true, ..Default::default() };
    let profile = quad_social::services::moderation_service::suspend_user(
        &mut conn, moderator, &mod_caps, target, "spam",
    )
    .unwrap();
    assert!(profile.is_suspended);

    let caps = Capabilities::resolve(Some(&profile), false).unwrap();
    let err = caps.ensure_active().unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::AccountSuspended));
}
