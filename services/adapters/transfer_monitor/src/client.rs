//! HTTP client for the transfers endpoint
//!
//! The monitor only depends on the [`TransferSource`] trait; [`ArkhamClient`]
//! is the production implementation.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::MonitorConfig;
use crate::error::{ApiError, MonitorError, Result};
use crate::params::QueryParams;

/// Maximum number of body characters kept in error values
const ERROR_BODY_LIMIT: usize = 500;

/// Source of raw transfer batches (`{"transfers": [...], "count": n}`)
#[async_trait]
pub trait TransferSource: Send + Sync {
    async fn fetch(&self, params: &QueryParams) -> std::result::Result<Value, ApiError>;
}

/// Client for `GET {base_url}/transfers`
pub struct ArkhamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ArkhamClient {
    /// Build a client from configuration; a missing or placeholder API key is
    /// a configuration error
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let api_key = config
            .usable_api_key()
            .ok_or_else(|| MonitorError::Config("API key is not configured (ARKHAM_API_KEY)".to_string()))?
            .to_string();

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(ApiError::Transport)?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, endpoint: &str, params: &QueryParams) -> std::result::Result<Value, ApiError> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        debug!("GET {} with {:?}", url, params);

        let response = self
            .http
            .get(&url)
            .header("API-Key", &self.api_key)
            .query(&params.to_pairs())
            .send()
            .await
            .map_err(|e| {
                error!("Connection error for {}: {}", url, e);
                ApiError::Transport(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(ApiError::Transport)?;

        if !status.is_success() {
            let err = classify_status(status, &body);
            error!("Request to {} failed: {}", url, err);
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| {
            error!("Failed to decode JSON from {}: {}", url, e);
            ApiError::Decode {
                status: status.as_u16(),
                message: e.to_string(),
            }
        })
    }
}

#[async_trait]
impl TransferSource for ArkhamClient {
    async fn fetch(&self, params: &QueryParams) -> std::result::Result<Value, ApiError> {
        self.get("transfers", params).await
    }
}

fn classify_status(status: StatusCode, body: &str) -> ApiError {
    let body = truncate(body);
    match status {
        StatusCode::UNAUTHORIZED => ApiError::Authentication,
        StatusCode::FORBIDDEN => {
            let lowered = body.to_lowercase();
            if lowered.contains("throttled") || lowered.contains("rate limit") {
                ApiError::RateLimited { body }
            } else {
                ApiError::Forbidden { body }
            }
        }
        other => ApiError::Http {
            status: other.as_u16(),
            body,
        },
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}
