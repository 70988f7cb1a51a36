use axum::extract::State;
use quad_shared::{HealthCheck, HealthResponse};
use std::sync::Arc;
use std::time::Duration;

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> HealthResponse {
    let database = match state.db.get_timeout(Duration::from_secs(2)) {
        Ok(_) => HealthCheck::healthy("database"),
        Err(e) => HealthCheck::unhealthy("database", e.to_string()),
    };

    // Serving with no templates is possible but every task board is empty.
    let templates = if state.catalog.daily.is_empty() && state.catalog.weekly.is_empty() {
        HealthCheck::degraded("task_templates", "no task templates loaded")
    } else {
        HealthCheck::healthy("task_templates")
    };

    HealthResponse::healthy("quad-leaderboard", env!("CARGO_PKG_VERSION"))
        .with_checks(vec![database, templates])
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}
