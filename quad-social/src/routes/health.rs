use axum::extract::State;
use quad_shared::{HealthCheck, HealthResponse};
use std::sync::Arc;
use std::time::Duration;

use crate::AppState;

/// Liveness plus a database check.
pub async fn health_check(State(state): State<Arc<AppState>>) -> HealthResponse {
    let database = match state.db.get_timeout(Duration::from_secs(2)) {
        Ok(_) => HealthCheck::healthy("database"),
        Err(e) => HealthCheck::unhealthy("database", e.to_string()),
    };

    HealthResponse::healthy("quad-social", env!("CARGO_PKG_VERSION")).with_checks(vec![database])
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}
