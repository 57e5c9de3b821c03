//! Backend HTTP API: saving generated code into a project and pointing the
//! backend's app proxy at a dev server.
//!
//! Thin `reqwest` wrapper. Response parsing lives in pure functions so it is
//! testable without a server.

use std::time::Duration;

use frames::Stack;
use serde::{Deserialize, Serialize};

const SAVE_CODE_PATH: &str = "/save-code";
const APP_PROXY_PATH: &str = "/config/app-proxy";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
    #[error("API request failed: {0}")]
    Request(String),
    #[error("API response error: status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("API response parse failed: {0}")]
    Parse(String),
    #[error("backend refused: {0}")]
    Rejected(String),
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaveCodeRequest {
    pub code: String,
    pub project_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub stack: Stack,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SaveResult {
    pub file_path: String,
    pub rel_path: String,
    pub url_path: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize)]
struct AppProxyRequest<'a> {
    target_url: &'a str,
}

#[derive(Deserialize)]
struct SaveResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    rel_path: Option<String>,
    #[serde(default)]
    url_path: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

fn default_success() -> bool {
    true
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Write generated code into the project on the backend's disk.
    ///
    /// # Errors
    ///
    /// Transport failures, non-success statuses and refusals reported in the
    /// response body.
    pub async fn save_code(&self, request: &SaveCodeRequest) -> Result<SaveResult, ApiError> {
        tracing::info!(project = %request.project_path, file = ?request.file_path, "api: saving code");
        let text = self.post(SAVE_CODE_PATH, request).await?;
        let result = parse_save_response(&text)?;
        tracing::info!(file = %result.file_path, url = %result.url_path, "api: code saved");
        Ok(result)
    }

    /// Route the backend's app preview proxy to a dev server.
    ///
    /// # Errors
    ///
    /// Transport failures and non-success statuses.
    pub async fn configure_app_proxy(&self, target_url: &str) -> Result<(), ApiError> {
        tracing::info!(%target_url, "api: configuring app proxy");
        self.post(APP_PROXY_PATH, &AppProxyRequest { target_url }).await?;
        Ok(())
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<String, ApiError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError::Request(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), %path, "api: request failed");
            return Err(ApiError::Status { status: status.as_u16(), body: text });
        }
        Ok(text)
    }
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_save_response(json: &str) -> Result<SaveResult, ApiError> {
    let response: SaveResponse = serde_json::from_str(json).map_err(|e| ApiError::Parse(e.to_string()))?;

    if !response.success {
        let reason = response
            .detail
            .or(response.message)
            .unwrap_or_else(|| "save failed".to_owned());
        return Err(ApiError::Rejected(reason));
    }

    let Some(file_path) = response.file_path else {
        return Err(ApiError::Parse("missing file_path".to_owned()));
    };

    Ok(SaveResult {
        rel_path: response.rel_path.unwrap_or_else(|| file_path.clone()),
        url_path: response.url_path.unwrap_or_default(),
        message: response.message.unwrap_or_default(),
        file_path,
    })
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
