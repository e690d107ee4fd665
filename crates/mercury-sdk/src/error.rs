// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for mercury-sdk.

use mercury_http::{ErrorEnvelope, HttpError};
use thiserror::Error;

/// Result type using SdkError.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors that can occur when using the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Malformed caller input (empty method, query that is not a mapping, ...).
    #[error("invalid input: {0}")]
    Validation(String),

    /// Transport failure or server rejection.
    #[error("transport error: {0}")]
    Transport(#[from] HttpError),

    /// Server answered with a body that does not match the expected record.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The target query matched no devices before dispatch.
    #[error("no targets: {0}")]
    NoTargets(String),

    /// Asset backend missing, failed, or produced no artifact.
    #[error("asset backend failure: {0}")]
    Backend(String),

    /// Configuration or asset source could not be read or decoded.
    #[error("could not load configuration: {0}")]
    ConfigLoad(String),

    /// Template rendering failed.
    #[error("render error: {0}")]
    Render(String),

    /// Operation is not supported for this target mode.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// SDK or CLI configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Token acquisition failed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Local I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SdkError {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            SdkError::Backend(_) => 2,
            SdkError::NoTargets(_) => 3,
            SdkError::Transport(_) | SdkError::UnexpectedResponse(_) => 4,
            SdkError::Validation(_)
            | SdkError::ConfigLoad(_)
            | SdkError::Render(_)
            | SdkError::Unsupported(_)
            | SdkError::Config(_)
            | SdkError::Auth(_)
            | SdkError::Io(_)
            | SdkError::Serialization(_) => 1,
        }
    }

    /// The server's error envelope, when the failure came from a response.
    pub fn envelope(&self) -> Option<&ErrorEnvelope> {
        match self {
            SdkError::Transport(err) => err.envelope(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SdkError {
    fn from(err: serde_yaml::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

impl From<minijinja::Error> for SdkError {
    fn from(err: minijinja::Error) -> Self {
        SdkError::Render(err.to_string())
    }
}
