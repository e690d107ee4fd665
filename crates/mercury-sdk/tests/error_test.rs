// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error type tests for mercury-sdk.

use mercury_sdk::{ErrorEnvelope, HttpError, SdkError};
use serde_json::json;

#[test]
fn test_validation_error_display() {
    let err = SdkError::Validation("method must not be empty".to_string());
    assert!(err.to_string().contains("invalid input"));
    assert!(err.to_string().contains("method must not be empty"));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_backend_error_display() {
    let err = SdkError::Backend("./assets.sh exited with exit status: 1".to_string());
    assert!(err.to_string().contains("asset backend failure"));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_no_targets_error_display() {
    let err = SdkError::NoTargets("query matched no active devices".to_string());
    assert!(err.to_string().contains("no targets"));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_transport_error_keeps_envelope() {
    let envelope = ErrorEnvelope::new(404, json!({"message": "no such job"}));
    let err = SdkError::from(HttpError::Status(envelope.clone()));

    let display = err.to_string();
    assert!(display.contains("transport error"));
    assert!(display.contains("404"));
    assert!(display.contains("no such job"));
    assert_eq!(err.envelope(), Some(&envelope));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_network_error_has_no_envelope() {
    let err = SdkError::from(HttpError::Network("connection refused".to_string()));
    assert!(err.envelope().is_none());
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_unexpected_response_error_display() {
    let err = SdkError::UnexpectedResponse("invalid status record".to_string());
    assert!(err.to_string().contains("unexpected response"));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_user_error_exit_codes() {
    let errors = [
        SdkError::ConfigLoad("router.conf".to_string()),
        SdkError::Render("undefined value".to_string()),
        SdkError::Unsupported("multi-target rendering".to_string()),
        SdkError::Config("Mercury Service URL is undefined".to_string()),
        SdkError::Auth("no auth_handler".to_string()),
        SdkError::Serialization("eof".to_string()),
        SdkError::Io(std::io::Error::other("disk full")),
    ];
    for err in errors {
        assert_eq!(err.exit_code(), 1, "{}", err);
    }
}

#[test]
fn test_serde_json_error_conversion() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err = SdkError::from(json_err);
    assert!(matches!(err, SdkError::Serialization(_)));
}
