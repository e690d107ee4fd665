// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HttpClient for the Mercury service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::AuthToken;
use crate::error::{ErrorEnvelope, HttpError, Result};

/// Header carrying the service token.
pub const AUTH_HEADER: &str = "X-Auth-Token";

/// URL query parameters.
pub type Params = [(String, String)];

/// Authenticated JSON request/response against the Mercury service.
///
/// Endpoints are relative to the transport's base URL. Implementations must
/// decode non-success responses into [`HttpError::Status`]. Successful bodies
/// are returned as-is, even when they look like an [`ErrorEnvelope`]; callers
/// whose endpoint reports failures in a 2xx body check with
/// [`ErrorEnvelope::from_value`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET and decode the JSON response.
    async fn get(&self, endpoint: &str, params: &Params) -> Result<Value>;

    /// Issue a POST with a JSON body and decode the JSON response.
    async fn post(&self, endpoint: &str, body: &Value, params: &Params) -> Result<Value>;
}

/// Configuration for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Service base URL, e.g. `http://mercury.local:9005`.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Token attached to every request.
    pub auth_token: Option<AuthToken>,
}

impl HttpClientConfig {
    /// Create a configuration for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(30),
            auth_token: None,
        }
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the auth token.
    pub fn with_auth_token(mut self, token: AuthToken) -> Self {
        self.auth_token = Some(token);
        self
    }
}

/// reqwest-backed [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpClient {
    /// Create a new client.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(HttpError::InvalidUrl(format!(
                "base url must start with http:// or https://: {}",
                config.base_url
            )));
        }

        if let Some(token) = &config.auth_token {
            if token.is_expired() {
                warn!(expires_at = %token.expires_at, "Auth token has expired");
            }
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let inner = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner,
            base_url,
            auth_token: config.auth_token.map(|t| t.token),
        })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let request = match &self.auth_token {
            Some(token) => request.header(AUTH_HEADER, token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(code = status.as_u16(), "Request rejected");
            return Err(HttpError::Status(ErrorEnvelope::from_body(
                status.as_u16(),
                &body,
            )));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn get(&self, endpoint: &str, params: &Params) -> Result<Value> {
        let url = join_endpoint(&self.base_url, endpoint);
        debug!(%url, "GET");
        self.execute(self.inner.get(url).query(params)).await
    }

    async fn post(&self, endpoint: &str, body: &Value, params: &Params) -> Result<Value> {
        let url = join_endpoint(&self.base_url, endpoint);
        debug!(%url, "POST");
        let request = self
            .inner
            .post(url)
            .query(params)
            .body(serde_json::to_vec(body).map_err(|e| HttpError::Decode(e.to_string()))?);
        self.execute(request).await
    }
}

/// Join an endpoint onto a base URL, ignoring surrounding slashes.
///
/// An empty endpoint addresses the base URL itself.
pub fn join_endpoint(base: &str, endpoint: &str) -> String {
    let base = base.trim_end_matches('/');
    let endpoint = endpoint.trim_matches('/');
    if endpoint.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, endpoint)
    }
}
