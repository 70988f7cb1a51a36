pub mod comment_service;
pub mod comment_tree;
pub mod conversation_service;
pub mod event_service;
pub mod friend_service;
pub mod message_service;
pub mod moderation_service;
pub mod notification_service;
pub mod post_service;
pub mod profile_service;
pub mod visibility;
