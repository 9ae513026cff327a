//! Client for a running gateway.

use crate::error::Violation;
use crate::payload::{InvokeRequest, InvokeResponse};
use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by [`Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Base URL was blank
    #[error("base URL is required")]
    MissingBaseUrl,

    /// Request failed local validation and was not sent
    #[error(transparent)]
    Invalid(#[from] Violation),

    /// Transport or decoding failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway answered with a non-success status
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

/// Non-success response from the gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("gateway returned {status}: {message}")]
pub struct InvokeError {
    pub status: StatusCode,
    /// The body's `error` field, or the trimmed body.
    pub message: String,
    pub body: String,
}

impl InvokeError {
    fn from_body(status: StatusCode, body: String) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error")?.as_str().map(str::to_string))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.trim().to_string());
        Self {
            status,
            message,
            body,
        }
    }
}

/// Posts [`InvokeRequest`]s to a gateway URL.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    /// Client for the gateway at `base_url` (requests go to the URL as given).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_http_client(base_url, reqwest::Client::new())
    }

    /// Like [`new`](Self::new) with a preconfigured `reqwest::Client`.
    pub fn with_http_client(base_url: &str, http: reqwest::Client) -> Result<Self, ClientError> {
        let base_url = base_url.trim();
        if base_url.is_empty() {
            return Err(ClientError::MissingBaseUrl);
        }
        Ok(Self {
            base_url: base_url.to_string(),
            http,
        })
    }

    /// Submit one request and decode the response.
    pub async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse, ClientError> {
        request.validate()?;

        let response = self.http.post(&self.base_url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvokeError::from_body(status, body).into());
        }
        Ok(response.json().await?)
    }
}
