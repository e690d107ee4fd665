// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the SDK and the `mcli` configuration file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SdkError};
use crate::inventory::DEFAULT_MAX_ITEMS;
use crate::job::DEFAULT_POLL_INTERVAL;

/// Service prefixes below the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePaths {
    /// Generic inventory channel.
    pub inventory: String,
    /// Inventory restricted to active (reachable) devices.
    pub active_inventory: String,
    /// RPC job service.
    pub rpc_jobs: String,
}

impl Default for ServicePaths {
    fn default() -> Self {
        Self {
            inventory: "api/inventory/computers".to_string(),
            active_inventory: "api/active/computers".to_string(),
            rpc_jobs: "api/rpc/jobs".to_string(),
        }
    }
}

/// Configuration for the MercuryClient.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Service base URL.
    pub api_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Default interval between job status polls.
    pub poll_interval: Duration,
    /// Default page size for inventory queries.
    pub max_items: u32,
    /// Service prefixes.
    pub paths: ServicePaths,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:9005".to_string(),
            request_timeout: Duration::from_secs(30),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_items: DEFAULT_MAX_ITEMS,
            paths: ServicePaths::default(),
        }
    }
}

impl SdkConfig {
    /// Create a configuration for the given service URL.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MERCURY_API_URL`: Service URL (default: "http://localhost:9005")
    /// - `MERCURY_REQUEST_TIMEOUT_MS`: Request timeout in milliseconds (default: 30000)
    /// - `MERCURY_POLL_INTERVAL_MS`: Job poll interval in milliseconds (default: 2000)
    /// - `MERCURY_MAX_ITEMS`: Inventory page size (default: 100)
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("MERCURY_API_URL")
            .unwrap_or_else(|_| "http://localhost:9005".to_string());

        let request_timeout_ms: u64 = std::env::var("MERCURY_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid MERCURY_REQUEST_TIMEOUT_MS: {}", e)))?;

        let poll_interval_ms: u64 = std::env::var("MERCURY_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid MERCURY_POLL_INTERVAL_MS: {}", e)))?;

        let max_items: u32 = std::env::var("MERCURY_MAX_ITEMS")
            .unwrap_or_else(|_| DEFAULT_MAX_ITEMS.to_string())
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid MERCURY_MAX_ITEMS: {}", e)))?;

        Ok(Self {
            api_url,
            request_timeout: Duration::from_millis(request_timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_items,
            ..Self::default()
        })
    }

    /// Set the service URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the default poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the inventory page size.
    pub fn with_max_items(mut self, max_items: u32) -> Self {
        self.max_items = max_items;
        self
    }

    /// Set the service prefixes.
    pub fn with_paths(mut self, paths: ServicePaths) -> Self {
        self.paths = paths;
        self
    }
}

/// An external program, given either as a single path or as an argv list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    /// Program path or name.
    Program(String),
    /// Program followed by its leading arguments.
    Argv(Vec<String>),
}

impl CommandLine {
    /// The program to execute.
    pub fn program(&self) -> Option<&str> {
        match self {
            CommandLine::Program(program) => Some(program.as_str()),
            CommandLine::Argv(argv) => argv.first().map(String::as_str),
        }
    }

    /// Leading arguments.
    pub fn args(&self) -> &[String] {
        match self {
            CommandLine::Program(_) => &[],
            CommandLine::Argv(argv) => argv.get(1..).unwrap_or_default(),
        }
    }
}

/// `mercury_api` section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiSection {
    /// Service URL.
    #[serde(default)]
    pub url: Option<String>,
}

/// The `mcli.yml` configuration file.
///
/// ```yaml
/// mercury_api:
///   url: http://mercury.local:9005
/// auth_handler: [mercury-token, --user, ops]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileConfig {
    /// Service section.
    #[serde(default)]
    pub mercury_api: ApiSection,
    /// Program that prints a fresh token on stdout.
    #[serde(default)]
    pub auth_handler: Option<CommandLine>,
}

impl FileConfig {
    /// Load the configuration file. A missing or empty file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(SdkError::Config(format!(
                    "could not read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Self::parse(&content)
            .map_err(|e| SdkError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    /// Parse configuration text.
    pub fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SdkConfig::default();
        assert_eq!(config.api_url, "http://localhost:9005");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_items, 100);
        assert_eq!(config.paths.rpc_jobs, "api/rpc/jobs");
        assert_eq!(config.paths.active_inventory, "api/active/computers");
    }

    #[test]
    fn test_builder_methods() {
        let config = SdkConfig::new("http://mercury.local:9005")
            .with_request_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(250))
            .with_max_items(10);

        assert_eq!(config.api_url, "http://mercury.local:9005");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_items, 10);
    }

    #[test]
    fn test_file_config_parse() {
        let config = FileConfig::parse(
            "mercury_api:\n  url: http://mercury.local:9005\nauth_handler: [token-tool, --user, ops]\n",
        )
        .unwrap();

        assert_eq!(
            config.mercury_api.url.as_deref(),
            Some("http://mercury.local:9005")
        );
        let handler = config.auth_handler.unwrap();
        assert_eq!(handler.program(), Some("token-tool"));
        assert_eq!(handler.args(), ["--user".to_string(), "ops".to_string()]);
    }

    #[test]
    fn test_file_config_program_handler() {
        let config = FileConfig::parse("auth_handler: /usr/local/bin/token-tool\n").unwrap();
        let handler = config.auth_handler.unwrap();
        assert_eq!(handler.program(), Some("/usr/local/bin/token-tool"));
        assert!(handler.args().is_empty());
    }

    #[test]
    fn test_file_config_empty_and_missing() {
        assert_eq!(FileConfig::parse("").unwrap(), FileConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig::load(&dir.path().join("absent.yml")).unwrap();
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn test_file_config_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcli.yml");
        std::fs::write(&path, "mercury_api: [not, a, mapping]\n").unwrap();
        assert!(matches!(FileConfig::load(&path), Err(SdkError::Config(_))));
    }
}
