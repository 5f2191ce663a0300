//! Client for the external scanning service.
//!
//! A client performs exactly one request per call. Retries are composed by
//! the caller (see [`crate::retry`]).

use async_trait::async_trait;
use imagewatch_core::ScanRequest;
use reqwest::StatusCode;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors from a single scan submission.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Cancelled")]
    Cancelled,
}

impl ScanError {
    /// Whether the failure is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ScanError::Cancelled)
    }
}

/// Submits one image to the scanning service.
#[async_trait]
pub trait ScanClient: Send + Sync {
    /// Perform a single submission. No internal retry.
    async fn monitor_image(
        &self,
        request: &ScanRequest,
        shutdown: &CancellationToken,
    ) -> Result<(), ScanError>;
}

/// HTTP scan client for the Snyk monitoring API.
#[derive(Clone)]
pub struct SnykClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl SnykClient {
    /// Create a new client against the given base URL.
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Monitor endpoint for an organization.
    fn monitor_url(&self, org_id: &str) -> String {
        format!("{}/org/{}/monitor", self.api_url, org_id)
    }

    async fn send(&self, request: &ScanRequest) -> Result<(), ScanError> {
        let response = self
            .http
            .post(self.monitor_url(&request.org_id))
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
            .json(&json!({ "image": request.image }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            debug!(image = %request.image, status = status.as_u16(), "Image submitted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ScanError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ScanClient for SnykClient {
    async fn monitor_image(
        &self,
        request: &ScanRequest,
        shutdown: &CancellationToken,
    ) -> Result<(), ScanError> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(ScanError::Cancelled),
            result = self.send(request) => result,
        }
    }
}
