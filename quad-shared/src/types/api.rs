use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// `{"success": true, "data": …}`, returned by every Quad handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data, message: None }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self { success: true, data, message: Some(message.into()) }
    }
}

/// `{"success": false, "error": {"code": "E…", …}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ApiErrorDetail { code: code.into(), message: message.into(), details: None },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

/// Ordered from best to worst so a report can take the maximum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Degraded still serves traffic; only unhealthy fails the check.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheck {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self { name: name.into(), status: HealthStatus::Healthy, message: None }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), status: HealthStatus::Degraded, message: Some(message.into()) }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), status: HealthStatus::Unhealthy, message: Some(message.into()) }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<HealthCheck>>,
}

impl HealthResponse {
    pub fn healthy(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            service: service.into(),
            version: version.into(),
            checks: None,
        }
    }

    pub fn with_checks(mut self, checks: Vec<HealthCheck>) -> Self {
        self.status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        self.checks = Some(checks);
        self
    }
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        (self.status.status_code(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_omits_empty_message() {
        let json = serde_json::to_value(ApiResponse::ok(3)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 3}));
    }

    #[test]
    fn health_rolls_up_worst_check() {
        let health = HealthResponse::healthy("quad-social", "0.1.0").with_checks(vec![
            HealthCheck::healthy("database"),
            HealthCheck::degraded("task_templates", "none loaded"),
        ]);
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.into_response().status(), StatusCode::OK);
    }

    #[test]
    fn unhealthy_check_returns_service_unavailable() {
        let health = HealthResponse::healthy("quad-leaderboard", "0.1.0").with_checks(vec![
            HealthCheck::unhealthy("database", "timed out"),
            HealthCheck::degraded("task_templates", "none loaded"),
        ]);
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
