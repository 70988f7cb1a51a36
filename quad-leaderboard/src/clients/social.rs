use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use quad_shared::errors::{AppError, AppResult, ErrorCode};

/// Reads the friend graph and profiles from quad-social's internal API.
#[derive(Clone)]
pub struct SocialClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CioCircle {
    pub cio_id: Uuid,
    pub friend_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub role: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    code: String,
    message: String,
}

fn unavailable(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCode::ServiceUnavailable, message)
}

fn open_envelope<T: DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    let envelope: Envelope<T> = serde_json::from_slice(body)
        .map_err(|e| unavailable(format!("unreadable social service response: {e}")))?;

    match envelope {
        Envelope { success: true, data: Some(data), .. } => Ok(data),
        Envelope { error: Some(err), .. } => {
            Err(unavailable(format!("social service error {}: {}", err.code, err.message)))
        }
        _ => Err(unavailable("social service returned an empty response")),
    }
}

impl SocialClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> AppResult<T> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, what, "social service unreachable");
            unavailable("social service unreachable")
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(error = %e, what, "social service response interrupted");
            unavailable("social service response interrupted")
        })?;

        open_envelope(&body).map_err(|e| {
            tracing::warn!(status = %status, error = %e, what, "social service call failed");
            e
        })
    }

    pub async fn friend_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let url = format!("{}/internal/friend-ids/{user_id}", self.base_url);
        self.fetch(self.client.get(url), "friend ids").await
    }

    pub async fn cio_circles(&self) -> AppResult<Vec<CioCircle>> {
        let url = format!("{}/internal/cio-circles", self.base_url);
        self.fetch(self.client.get(url), "cio circles").await
    }

    pub async fn profiles(&self, user_ids: &[Uuid]) -> AppResult<Vec<ProfileSummary>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/internal/profiles/batch", self.base_url);
        let request = self.client.post(url).json(&serde_json::json!({ "user_ids": user_ids }));
        self.fetch(request, "profiles").await
    }
}
