//! Outbound requests to the leads API.
//!
//! Each call is a single POST with the client's default timeout; there is no
//! retry. Any answer from the server, whatever its status, is an `ApiResponse`.
//! Only transport failures are errors.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::config::ApiConfig;
use crate::error::{LeadFeedError, Result};

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// The request never produced a response
#[derive(Error, Debug)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    /// Wrap a transport-level failure message
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message, as logged and mailed
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// What the API answered, recorded verbatim in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: BTreeMap<String, String>,
    /// Response body, as JSON when it parses and as a string otherwise
    pub body: serde_json::Value,
}

impl ApiResponse {
    /// True for exactly HTTP 200
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// The leads API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeadsApi: Send + Sync {
    /// Post a serialized lead payload
    async fn post_lead(&self, body: &str, api_key: &str) -> std::result::Result<ApiResponse, TransportError>;

    /// Post `{username, site}` to the verification endpoint
    async fn verify_credentials(
        &self,
        body: &str,
        api_key: &str,
    ) -> std::result::Result<ApiResponse, TransportError>;
}

/// `LeadsApi` over HTTP
#[derive(Debug, Clone)]
pub struct HttpLeadsApi {
    client: reqwest::Client,
    lead_url: String,
    verify_url: String,
}

impl HttpLeadsApi {
    /// Build a client for the given endpoints
    pub fn new(lead_url: &str, verify_url: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("lead-feed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LeadFeedError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            lead_url: lead_url.to_string(),
            verify_url: verify_url.to_string(),
        })
    }

    /// Build a client for the configured endpoints
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Self::new(&config.lead_url, &config.verify_url)
    }

    async fn post(
        &self,
        url: &str,
        body: &str,
        api_key: &str,
    ) -> std::result::Result<ApiResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .body(body.to_owned())
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response_body(status, response.text().await);

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// Parse a response body as JSON, falling back to the raw text.
///
/// The server has already answered, so an unreadable body is kept as its
/// error message rather than reported as a transport failure.
fn response_body<E: std::fmt::Display>(status: u16, text: std::result::Result<String, E>) -> serde_json::Value {
    match text {
        Ok(text) => serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)),
        Err(err) => {
            warn!(status, error = %err, "Failed to read leads API response body");
            serde_json::Value::String(format!("unreadable response body: {err}"))
        }
    }
}

#[async_trait]
impl LeadsApi for HttpLeadsApi {
    async fn post_lead(&self, body: &str, api_key: &str) -> std::result::Result<ApiResponse, TransportError> {
        self.post(&self.lead_url, body, api_key).await
    }

    async fn verify_credentials(
        &self,
        body: &str,
        api_key: &str,
    ) -> std::result::Result<ApiResponse, TransportError> {
        self.post(&self.verify_url, body, api_key).await
    }
}
