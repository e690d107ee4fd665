// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for mercury-http.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type using HttpError.
pub type Result<T> = std::result::Result<T, HttpError>;

/// Uniform record for a request the server rejected.
///
/// Serializes as `{"error": true, "code": <status>, "data": <server body>}`.
/// `data` is the decoded JSON body when the server sent JSON, otherwise the
/// raw body text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always `true`.
    pub error: bool,
    /// HTTP status code.
    pub code: u16,
    /// Server body.
    pub data: Value,
}

impl ErrorEnvelope {
    /// Create an envelope for the given status and body.
    pub fn new(code: u16, data: Value) -> Self {
        Self {
            error: true,
            code,
            data,
        }
    }

    /// Build an envelope from a raw response body.
    pub fn from_body(code: u16, body: &str) -> Self {
        let data = serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));
        Self::new(code, data)
    }

    /// Recognize an envelope embedded in an otherwise successful body.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.get("error").and_then(Value::as_bool) != Some(true) {
            return None;
        }
        let code = map.get("code")?.as_u64()?;
        Some(Self::new(
            u16::try_from(code).unwrap_or(u16::MAX),
            map.get("data").cloned().unwrap_or(Value::Null),
        ))
    }

    /// Human readable message, `data.message` when the server provided one.
    pub fn message(&self) -> String {
        match &self.data {
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.data.to_string()),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors returned by the transport.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Server answered with a non-success status.
    #[error("server error [{}]: {}", .0.code, .0.message())]
    Status(ErrorEnvelope),

    /// Connection could not be established or was dropped.
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Response body was not valid JSON.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// Base URL or endpoint could not form a valid request.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl HttpError {
    /// The error envelope, if the server answered at all.
    pub fn envelope(&self) -> Option<&ErrorEnvelope> {
        match self {
            HttpError::Status(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// Whether the request may be retried by the caller.
    ///
    /// Only failures where no response was received qualify. A retried
    /// submission can still create a duplicate job.
    pub fn is_transient(&self) -> bool {
        matches!(self, HttpError::Network(_) | HttpError::Timeout(_))
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout(err.to_string())
        } else if err.is_builder() {
            HttpError::InvalidUrl(err.to_string())
        } else if err.is_decode() {
            HttpError::Decode(err.to_string())
        } else {
            HttpError::Network(err.to_string())
        }
    }
}
