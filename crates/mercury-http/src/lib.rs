// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mercury HTTP transport.
//!
//! Thin, authenticated JSON request/response layer used by `mercury-sdk` to
//! talk to the Mercury fleet service. Every call returns an explicit
//! `Result<serde_json::Value, HttpError>`; non-2xx responses are decoded once,
//! here, into an [`ErrorEnvelope`] so that upper layers never have to look at
//! raw HTTP responses.
//!
//! # Example
//!
//! ```no_run
//! use mercury_http::{HttpClient, HttpClientConfig, HttpTransport};
//!
//! # async fn example() -> mercury_http::Result<()> {
//! let client = HttpClient::new(HttpClientConfig::new("http://localhost:9005"))?;
//! let page = client
//!     .post("api/inventory/computers/query", &serde_json::json!({"query": {}}), &[])
//!     .await?;
//! println!("{}", page);
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod error;

pub use auth::AuthToken;
pub use client::{AUTH_HEADER, HttpClient, HttpClientConfig, HttpTransport, Params, join_endpoint};
pub use error::{ErrorEnvelope, HttpError, Result};
