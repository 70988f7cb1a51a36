pub mod comments;
pub mod conversations;
pub mod events;
pub mod friends;
pub mod health;
pub mod internal;
pub mod messages;
pub mod moderation;
pub mod notifications;
pub mod posts;
pub mod profiles;
