pub mod clients;
pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod templates;

use axum::routing::{get, post};
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use quad_shared::clients::db::DbPool;
use quad_shared::middleware::metrics_middleware;

use clients::social::SocialClient;
use routes::{health, leaderboard, tasks};
use templates::TaskCatalog;

pub struct AppState {
    pub db: DbPool,
    pub config: config::AppConfig,
    pub catalog: TaskCatalog,
    pub social: SocialClient,
    pub metrics_handle: Option<PrometheusHandle>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/tasks/:cadence", get(tasks::list_tasks))
        .route("/tasks/:cadence/:idx/toggle", post(tasks::toggle_task))
        .route("/points/me", get(tasks::my_points))
        .route("/leaderboard/friends", get(leaderboard::friends_leaderboard))
        .route("/leaderboard/cio", get(leaderboard::cio_leaderboard))
        .route("/leaderboard/global", get(leaderboard::global_leaderboard))
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
    use tower::ServiceExt;

    fn test_app() -> Router {
        let config = config::AppConfig::default();
        let db = Pool::builder()
            .max_size(1)
            .build_unchecked(ConnectionManager::<PgConnection>::new("postgres://unused@127.0.0.1:1/none"));
        let social = SocialClient::new(&config.social_service_url).unwrap();

        router(Arc::new(AppState {
            db,
            config,
            catalog: TaskCatalog::default(),
            social,
            metrics_handle: None,
        }))
    }

    #[tokio::test]
    async fn task_board_requires_auth() {
        let response = test_app()
            .oneshot(Request::builder().uri("/tasks/daily").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn leaderboards_require_auth() {
        for uri in ["/leaderboard/friends", "/leaderboard/cio", "/leaderboard/global"] {
            let response = test_app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn toggle_is_post_only() {
        let response = test_app()
            .oneshot(Request::builder().uri("/tasks/daily/0/toggle").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
