// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Press: push a rendered configuration to devices through an RPC job.
//!
//! Single-target presses may render the configuration against an asset
//! bundle built from, in increasing precedence, an asset file, the asset
//! backend and explicit overrides. Multi-target presses first resolve the
//! query on the active inventory channel; an empty match set fails before
//! any backend work or submission. Rendering for more than one device is
//! not supported because a flat bundle cannot carry per-device values.

use std::path::PathBuf;

use serde_json::{Map, Value};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument};

use crate::assets::AssetBundle;
use crate::backend::AssetBackend;
use crate::error::{Result, SdkError};
use crate::inventory::InventoryClient;
use crate::job::{Job, JobEngine, JobRequest};
use crate::types::TargetDescriptor;

/// RPC method used to push a configuration.
pub const PRESS_METHOD: &str = "press";

/// Where the configuration template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationSource {
    /// A file on disk.
    File(PathBuf),
    /// Standard input.
    Stdin,
    /// Literal text.
    Inline(String),
}

impl ConfigurationSource {
    /// Interpret a CLI argument: `-` is stdin, anything else a path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            ConfigurationSource::Stdin
        } else {
            ConfigurationSource::File(PathBuf::from(arg))
        }
    }

    /// Read the configuration text.
    pub async fn load(&self) -> Result<String> {
        match self {
            ConfigurationSource::File(path) => {
                tokio::fs::read_to_string(path).await.map_err(|e| {
                    SdkError::ConfigLoad(format!(
                        "could not read configuration {}: {}",
                        path.display(),
                        e
                    ))
                })
            }
            ConfigurationSource::Stdin => {
                let mut text = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut text)
                    .await
                    .map_err(|e| {
                        SdkError::ConfigLoad(format!("could not read configuration from stdin: {}", e))
                    })?;
                Ok(text)
            }
            ConfigurationSource::Inline(text) => Ok(text.clone()),
        }
    }
}

/// Everything a press needs.
#[derive(Debug, Clone)]
pub struct PressRequest {
    /// Devices to press.
    pub target: TargetDescriptor,
    /// Configuration template.
    pub configuration: ConfigurationSource,
    /// Asset file, lowest precedence.
    pub assets_file: Option<PathBuf>,
    /// Asset backend, overrides the asset file.
    pub backend: Option<AssetBackend>,
    /// Explicit assets, highest precedence. Single target only.
    pub overrides: AssetBundle,
}

impl PressRequest {
    /// Create a request without assets.
    pub fn new(target: TargetDescriptor, configuration: ConfigurationSource) -> Self {
        Self {
            target,
            configuration,
            assets_file: None,
            backend: None,
            overrides: AssetBundle::new(),
        }
    }

    /// Set the asset file.
    pub fn with_assets_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.assets_file = Some(path.into());
        self
    }

    /// Set the asset backend.
    pub fn with_backend(mut self, backend: AssetBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set one explicit asset.
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(key, value.into());
        self
    }

    /// Merge explicit assets.
    pub fn with_overrides(mut self, overrides: AssetBundle) -> Self {
        self.overrides.merge(overrides);
        self
    }

    /// Whether any asset source is configured.
    pub fn has_asset_source(&self) -> bool {
        self.assets_file.is_some() || self.backend.is_some() || !self.overrides.is_empty()
    }

    /// Merge the configured asset sources for `device_ids`.
    pub async fn build_bundle(&self, device_ids: &[String]) -> Result<AssetBundle> {
        let mut bundle = AssetBundle::new();
        if let Some(path) = &self.assets_file {
            bundle.merge(AssetBundle::load_file(path).await?);
        }
        if let Some(backend) = &self.backend {
            bundle.merge(backend.resolve(device_ids).await?);
        }
        bundle.merge(self.overrides.clone());
        Ok(bundle)
    }
}

/// Runs presses.
#[derive(Clone)]
pub struct Press {
    jobs: JobEngine,
    active: InventoryClient,
}

impl Press {
    /// Create a press over a job engine and the active inventory channel.
    pub fn new(jobs: JobEngine, active: InventoryClient) -> Self {
        Self { jobs, active }
    }

    /// Compose the configuration and submit it.
    ///
    /// Nothing is submitted when loading, resolution, the backend or
    /// rendering fails.
    #[instrument(skip(self, request), fields(target = %request.target))]
    pub async fn press(&self, request: PressRequest) -> Result<Job> {
        let configuration = self.compose(&request).await?;

        let mut kwargs = Map::new();
        kwargs.insert("configuration".to_string(), Value::String(configuration));

        let job = self
            .jobs
            .submit(request.target, PRESS_METHOD, Vec::new(), kwargs)
            .await?;
        info!(job_id = %job.job_id(), "Press submitted");
        Ok(job)
    }

    /// Produce the configuration text that would be pushed.
    pub async fn compose(&self, request: &PressRequest) -> Result<String> {
        JobRequest::new(request.target.clone(), PRESS_METHOD).validate()?;

        match &request.target {
            TargetDescriptor::Device(id) => {
                let template = request.configuration.load().await?;
                if !request.has_asset_source() {
                    return Ok(template);
                }

                let bundle = request.build_bundle(std::slice::from_ref(id)).await?;
                debug!(assets = bundle.len(), "Rendering configuration");
                bundle.render(&template)
            }
            TargetDescriptor::Query(query) => {
                if !request.overrides.is_empty() {
                    return Err(SdkError::Validation(
                        "explicit assets require a single target".to_string(),
                    ));
                }

                let template = request.configuration.load().await?;

                let ids = self
                    .active
                    .query_ids(query, Some(self.active.max_items()))
                    .await?;
                if ids.is_empty() {
                    return Err(SdkError::NoTargets(format!(
                        "query {} matched no active devices",
                        request.target
                    )));
                }
                debug!(devices = ids.len(), "Resolved press targets");

                if request.has_asset_source() {
                    return Err(SdkError::Unsupported(
                        "asset rendering is only supported for a single target".to_string(),
                    ));
                }
                Ok(template)
            }
        }
    }
}
