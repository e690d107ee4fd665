// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! MercuryClient: entry point tying the transport to the service clients.

use std::sync::Arc;

use mercury_http::{AuthToken, HttpClient, HttpClientConfig, HttpTransport};

use crate::config::SdkConfig;
use crate::error::Result;
use crate::inventory::InventoryClient;
use crate::job::JobEngine;
use crate::press::Press;

/// High-level client for the Mercury fleet service.
///
/// Holds one shared transport; the service clients it hands out are cheap
/// to create and clone.
#[derive(Clone)]
pub struct MercuryClient {
    transport: Arc<dyn HttpTransport>,
    config: SdkConfig,
}

impl MercuryClient {
    /// Create a client over HTTP.
    pub fn new(config: SdkConfig, auth_token: Option<AuthToken>) -> Result<Self> {
        let mut http_config = HttpClientConfig::new(config.api_url.clone())
            .with_request_timeout(config.request_timeout);
        if let Some(token) = auth_token {
            http_config = http_config.with_auth_token(token);
        }

        let transport = HttpClient::new(http_config)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Create a client over an existing transport.
    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: SdkConfig) -> Self {
        Self { transport, config }
    }

    /// Create a client from environment variables, without a token.
    pub fn from_env() -> Result<Self> {
        Self::new(SdkConfig::from_env()?, None)
    }

    /// Get the SDK configuration.
    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// The RPC job engine.
    pub fn jobs(&self) -> JobEngine {
        JobEngine::new(self.transport.clone(), self.config.paths.rpc_jobs.clone())
            .with_poll_interval(self.config.poll_interval)
    }

    /// The generic inventory channel.
    pub fn inventory(&self) -> InventoryClient {
        InventoryClient::new(self.transport.clone(), self.config.paths.inventory.clone())
            .with_max_items(self.config.max_items)
    }

    /// The inventory channel restricted to active devices.
    pub fn active_inventory(&self) -> InventoryClient {
        InventoryClient::new(
            self.transport.clone(),
            self.config.paths.active_inventory.clone(),
        )
        .with_max_items(self.config.max_items)
    }

    /// The press pipeline.
    pub fn press(&self) -> Press {
        Press::new(self.jobs(), self.active_inventory())
    }
}
