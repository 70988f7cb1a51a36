use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult};

use crate::schema::{
    comments, conversation_participants, conversations, events, friend_requests, friendships,
    messages, notifications, post_images, posts, profiles, users,
};

// Row columns keep these as Varchar; CHECK constraints hold the allowed set.
macro_rules! string_enum {
    ($ty:ident, $what:literal) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| format!("unknown {}: {s}", $what))
            }
        }
    };
}

/// Parse a stored enum column, surfacing corrupted rows as internal errors
/// instead of silently picking a default.
fn parse_column<T: std::str::FromStr<Err = String>>(raw: &str) -> AppResult<T> {
    raw.parse::<T>().map_err(|e| {
        tracing::error!(value = %raw, error = %e, "unrecognized value in enum column");
        AppError::internal("corrupted record")
    })
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Cio,
    Other,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Cio, Role::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Cio => "cio",
            Role::Other => "other",
        }
    }
}

string_enum!(Role, "role");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Declined,
    Canceled,
}

impl FriendRequestStatus {
    pub const ALL: [FriendRequestStatus; 4] = [
        FriendRequestStatus::Pending,
        FriendRequestStatus::Accepted,
        FriendRequestStatus::Declined,
        FriendRequestStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FriendRequestStatus::Pending => "pending",
            FriendRequestStatus::Accepted => "accepted",
            FriendRequestStatus::Declined => "declined",
            FriendRequestStatus::Canceled => "canceled",
        }
    }
}

string_enum!(FriendRequestStatus, "friend request status");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    Public,
    CioWide,
    FriendsOnly,
}

impl Privacy {
    pub const ALL: [Privacy; 3] = [Privacy::Public, Privacy::CioWide, Privacy::FriendsOnly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::CioWide => "cio_wide",
            Privacy::FriendsOnly => "friends_only",
        }
    }
}

string_enum!(Privacy, "privacy");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostTag {
    General,
    Event,
    Sustainability,
    Question,
    Announcement,
}

impl PostTag {
    pub const ALL: [PostTag; 5] = [
        PostTag::General,
        PostTag::Event,
        PostTag::Sustainability,
        PostTag::Question,
        PostTag::Announcement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostTag::General => "general",
            PostTag::Event => "event",
            PostTag::Sustainability => "sustainability",
            PostTag::Question => "question",
            PostTag::Announcement => "announcement",
        }
    }
}

string_enum!(PostTag, "post tag");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    FriendAccepted,
    Message,
    GroupInvite,
    Event,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 5] = [
        NotificationKind::FriendRequest,
        NotificationKind::FriendAccepted,
        NotificationKind::Message,
        NotificationKind::GroupInvite,
        NotificationKind::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::FriendRequest => "friend_request",
            NotificationKind::FriendAccepted => "friend_accepted",
            NotificationKind::Message => "message",
            NotificationKind::GroupInvite => "group_invite",
            NotificationKind::Event => "event",
        }
    }
}

string_enum!(NotificationKind, "notification kind");

// --- User ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: Uuid,
    pub username: &'a str,
}

// --- Profile ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub role: String,
    pub is_moderator: bool,
    pub is_suspended: bool,
    pub suspension_reason: Option<String>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub suspended_by: Option<Uuid>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn role(&self) -> AppResult<Role> {
        parse_column(&self.role)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile {
    pub user_id: Uuid,
}

#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = profiles)]
pub struct UpdateProfile {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub role: Option<String>,
    pub is_completed: Option<bool>,
}

// --- Friend graph ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = friend_requests)]
pub struct FriendRequest {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl FriendRequest {
    pub fn status(&self) -> AppResult<FriendRequestStatus> {
        parse_column(&self.status)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = friend_requests)]
pub struct NewFriendRequest {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
}

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = friendships)]
pub struct Friendship {
    pub id: Uuid,
    pub user_id: Uuid,
    pub friend_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = friendships)]
pub struct NewFriendship {
    pub user_id: Uuid,
    pub friend_id: Uuid,
}

// --- Conversations ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: Uuid,
    pub is_group: bool,
    pub name: Option<String>,
    #[serde(skip)]
    pub direct_key: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversation {
    pub is_group: bool,
    pub name: Option<String>,
    pub direct_key: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = conversation_participants)]
pub struct ConversationParticipant {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversation_participants)]
pub struct NewParticipant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: i64,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage<'a> {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: &'a str,
}

// --- Forum ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = posts)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub caption: String,
    pub tag: String,
    pub privacy: String,
    pub is_hidden: bool,
    pub hidden_reason: Option<String>,
    pub hidden_by: Option<Uuid>,
    pub hidden_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn privacy(&self) -> AppResult<Privacy> {
        parse_column(&self.privacy)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost {
    pub author_id: Uuid,
    pub title: String,
    pub caption: String,
    pub tag: String,
    pub privacy: String,
}

#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = posts)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub caption: Option<String>,
    pub tag: Option<String>,
    pub privacy: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = post_images)]
pub struct PostImage {
    pub id: Uuid,
    pub post_id: Uuid,
    pub image_key: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = post_images)]
pub struct NewPostImage {
    pub post_id: Uuid,
    pub image_key: String,
    pub position: i32,
}

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = comments)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
    pub is_deleted: bool,
    pub is_hidden: bool,
    pub hidden_by: Option<Uuid>,
    pub hidden_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment<'a> {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: &'a str,
}

// --- Notifications ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub text: String,
    pub url: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification<'a> {
    pub user_id: Uuid,
    pub kind: &'a str,
    pub text: &'a str,
    pub url: &'a str,
}

// --- Events ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = events)]
pub struct Event {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = events)]
pub struct NewEvent {
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_their_column_strings() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        for privacy in Privacy::ALL {
            assert_eq!(privacy.to_string().parse::<Privacy>().unwrap(), privacy);
        }
        for kind in NotificationKind::ALL {
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_privacy_is_rejected() {
        let err = "everyone".parse::<Privacy>().unwrap_err();
        assert!(err.contains("privacy"));
        assert!("CIO_WIDE".parse::<Privacy>().is_err());
    }

    #[test]
    fn serde_names_match_column_strings() {
        assert_eq!(serde_json::to_string(&Privacy::CioWide).unwrap(), "\"cio_wide\"");
        assert_eq!(
            serde_json::to_string(&NotificationKind::FriendAccepted).unwrap(),
            "\"friend_accepted\""
        );
    }
}
