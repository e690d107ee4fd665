// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mercury SDK
//!
//! Client for the Mercury fleet service: query the device inventory, run RPC
//! jobs against dynamically resolved sets of devices, push rendered
//! configurations ("press") and drive devices from an interactive shell.
//!
//! # Architecture
//!
//! - [`JobEngine`] submits an instruction against a [`TargetDescriptor`],
//!   polls for completion and collects per-device [`Task`]s.
//! - [`Press`] composes a configuration from an [`AssetBundle`] and submits
//!   it as a `press` job.
//! - [`Shell`] turns each input line into a `run` job.
//! - [`InventoryClient`] resolves queries to device records.
//!
//! All of them share one [`mercury_http::HttpTransport`].
//!
//! # Example
//!
//! ```no_run
//! use mercury_sdk::{JoinOptions, MercuryClient, SdkConfig, TargetDescriptor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MercuryClient::new(SdkConfig::new("http://localhost:9005"), None)?;
//! let jobs = client.jobs();
//!
//! // Run a command on one device
//! let mut job = jobs
//!     .submit(
//!         TargetDescriptor::device("a1b2c3"),
//!         "run",
//!         vec!["uptime".into()],
//!         Default::default(),
//!     )
//!     .await?;
//!
//! // Wait for it and print the results
//! jobs.join(&mut job, JoinOptions::default()).await?;
//! for task in jobs.tasks(&job).await? {
//!     println!("{}: {:?}", task.device_id(), task.stdout());
//! }
//! # Ok(())
//! # }
//! ```

mod assets;
mod auth;
mod backend;
mod client;
mod config;
mod error;
mod inventory;
mod job;
mod press;
mod shell;
mod types;

pub use assets::AssetBundle;
pub use auth::{DEFAULT_TOKEN_TTL_HOURS, TokenCache, acquire_token, login};
pub use backend::{ASSETS_FILE, AssetBackend, MATCHES_FILE};
pub use client::MercuryClient;
pub use config::{ApiSection, CommandLine, FileConfig, SdkConfig, ServicePaths};
pub use error::{Result, SdkError};
pub use inventory::{DEFAULT_MAX_ITEMS, InventoryClient};
pub use job::{DEFAULT_POLL_INTERVAL, Job, JobEngine, JobRequest, JobState, JoinOptions, JoinOutcome};
pub use press::{ConfigurationSource, PRESS_METHOD, Press, PressRequest};
pub use shell::{
    LineSource, PROMPT, RUN_METHOD, SHELL_POLL_INTERVAL, Shell, ShellInput, ShellOptions,
    StdinLines,
};
pub use types::{
    DEVICE_ID_FIELD, Instruction, InventoryPage, Query, StatusRecord, SubmitReceipt,
    TargetDescriptor, Task,
};

pub use mercury_http::{AuthToken, ErrorEnvelope, HttpError};
pub use tokio_util::sync::CancellationToken;
