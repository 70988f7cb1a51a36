pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;

use axum::routing::{get, post};
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use quad_shared::clients::db::DbPool;
use quad_shared::clients::storage::ObjectStorage;
use quad_shared::middleware::metrics_middleware;

use routes::{
    comments, conversations, events, friends, health, internal, messages, moderation, notifications, posts,
    profiles,
};

pub struct AppState {
    pub db: DbPool,
    pub config: config::AppConfig,
    pub storage: ObjectStorage,
    pub metrics_handle: Option<PrometheusHandle>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        // Profiles and identity
        .route("/me", get(profiles::get_me).patch(profiles::update_me).delete(profiles::delete_me))
        .route("/users/search", get(profiles::search_users))
        .route("/users/:id", get(profiles::get_user))
        .route("/cios", get(profiles::list_cios))
        // Friend graph
        .route("/friends", get(friends::list_friends))
        .route("/friends/:id", axum::routing::delete(friends::remove_friend))
        .route("/friends/requests", post(friends::send_request))
        .route("/friends/requests/incoming", get(friends::incoming_requests))
        .route("/friends/requests/outgoing", get(friends::outgoing_requests))
        .route("/friends/requests/:id/accept", post(friends::accept_request))
        .route("/friends/requests/:id/decline", post(friends::decline_request))
        .route("/friends/requests/:id/cancel", post(friends::cancel_request))
        // Conversations and messages
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/direct", post(conversations::open_direct))
        .route("/conversations/group", post(conversations::create_group))
        .route("/conversations/:id", get(conversations::get_conversation))
        .route("/conversations/:id/members", post(conversations::add_member))
        .route(
            "/conversations/:id/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        // Forum
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route(
            "/posts/:id",
            get(posts::get_post).patch(posts::update_post).delete(posts::delete_post),
        )
        .route(
            "/posts/:id/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route("/comments/:id", axum::routing::delete(comments::delete_comment))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/:id/read", post(notifications::mark_read))
        // Events
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/:id", get(events::get_event))
        // Moderation
        .route("/moderation/posts/:id/hide", post(moderation::hide_post))
        .route("/moderation/posts/:id/unhide", post(moderation::unhide_post))
        .route("/moderation/comments/:id/hide", post(moderation::hide_comment))
        .route("/moderation/comments/:id/unhide", post(moderation::unhide_comment))
        .route("/moderation/users/:id/suspend", post(moderation::suspend_user))
        .route("/moderation/users/:id/reinstate", post(moderation::reinstate_user))
        .route(
            "/admin/moderators/:id",
            post(moderation::promote_moderator).delete(moderation::demote_moderator),
        )
        // Internal service-to-service endpoints (no auth)
        .route("/internal/users", post(internal::register_user))
        .route("/internal/friend-ids/:id", get(internal::friend_ids))
        .route("/internal/profiles/batch", post(internal::batch_profiles))
        .route("/internal/cio-circles", get(internal::cio_circles))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use diesel::pg::PgConnection;
    use diesel::r2d2::{ConnectionManager, Pool};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let config = config::AppConfig::default();
        // Lazy pool: nothing connects until a handler checks a connection out.
        let db = Pool::builder()
            .max_size(1)
            .build_unchecked(ConnectionManager::<PgConnection>::new("postgres://unused@127.0.0.1:1/none"));
        let storage = ObjectStorage::new(
            &config.storage_endpoint,
            &config.storage_access_key,
            &config.storage_secret_key,
            &config.storage_bucket,
            &config.storage_public_url,
        )
        .await;

        router(Arc::new(AppState { db, config, storage, metrics_handle: None }))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn me_requires_a_bearer_token() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "E0004");
    }

    #[tokio::test]
    async fn broken_token_is_rejected_on_public_listing() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/posts")
                    .header("Authorization", "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn moderator_routes_are_authenticated() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/moderation/posts/{}/hide", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_empty() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
