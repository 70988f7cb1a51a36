use std::sync::Arc;

use quad_shared::clients::db::create_pool;
use quad_shared::clients::storage::ObjectStorage;
use quad_shared::middleware::JWT_SECRET_ENV;

use quad_social::config::AppConfig;
use quad_social::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quad_shared::middleware::init_tracing("quad-social");

    let config = AppConfig::load()?;
    let port = config.port;

    // The auth extractors read the signing secret from the environment.
    if std::env::var(JWT_SECRET_ENV).is_err() {
        std::env::set_var(JWT_SECRET_ENV, &config.jwt_secret);
    }

    let db = create_pool(&config.database_url, config.db_pool_size)?;

    let storage = ObjectStorage::new(
        &config.storage_endpoint,
        &config.storage_access_key,
        &config.storage_secret_key,
        &config.storage_bucket,
        &config.storage_public_url,
    )
    .await;

    let metrics_handle = match quad_shared::middleware::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder unavailable, /metrics will be empty");
            None
        }
    };

    let state = Arc::new(AppState { db, config, storage, metrics_handle });
    let app = quad_social::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "quad-social starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
