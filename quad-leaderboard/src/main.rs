use std::sync::Arc;

use quad_shared::clients::db::create_pool;
use quad_shared::middleware::JWT_SECRET_ENV;

use quad_leaderboard::clients::social::SocialClient;
use quad_leaderboard::config::AppConfig;
use quad_leaderboard::templates::TaskCatalog;
use quad_leaderboard::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quad_shared::middleware::init_tracing("quad-leaderboard");

    let config = AppConfig::load()?;
    let port = config.port;

    // The auth extractors read the signing secret from the environment.
    if std::env::var(JWT_SECRET_ENV).is_err() {
        std::env::set_var(JWT_SECRET_ENV, &config.jwt_secret);
    }

    let db = create_pool(&config.database_url, config.db_pool_size)?;
    let catalog = TaskCatalog::load(&config.daily_tasks_path, &config.weekly_tasks_path);
    let social = SocialClient::new(&config.social_service_url)?;
    tracing::info!(url = %config.social_service_url, "social service client ready");

    let metrics_handle = match quad_shared::middleware::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder unavailable, /metrics will be empty");
            None
        }
    };

    let state = Arc::new(AppState { db, config, catalog, social, metrics_handle });
    let app = quad_leaderboard::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "quad-leaderboard starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
