// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Asset bundles and configuration template rendering.

use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, SdkError};

const TEMPLATE_NAME: &str = "configuration";

/// Flat key to value mapping used as the template context.
///
/// Later merges take precedence over earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetBundle(Map<String, Value>);

impl AssetBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bundle from a decoded value; only mappings are accepted.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Load assets from a YAML or JSON file containing a mapping.
    pub async fn load_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SdkError::ConfigLoad(format!("could not read assets {}: {}", path.display(), e))
        })?;

        // Empty files decode to null, which is not a mapping.
        let value: Value = serde_yaml::from_str(&content).map_err(|e| {
            SdkError::ConfigLoad(format!("invalid assets {}: {}", path.display(), e))
        })?;

        let bundle = Self::from_value(value).ok_or_else(|| {
            SdkError::ConfigLoad(format!("assets {} must be a mapping", path.display()))
        })?;
        debug!(path = %path.display(), keys = bundle.len(), "Loaded asset file");
        Ok(bundle)
    }

    /// Parse a `key=value` override.
    pub fn parse_assignment(assignment: &str) -> Result<(String, Value)> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            SdkError::Validation(format!("asset must be KEY=VALUE, got '{}'", assignment))
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(SdkError::Validation(format!(
                "asset key is empty in '{}'",
                assignment
            )));
        }
        Ok((key.to_string(), Value::String(value.to_string())))
    }

    /// Set one asset.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Merge `other` over this bundle.
    pub fn merge(&mut self, other: AssetBundle) {
        self.0.extend(other.0);
    }

    /// Look up one asset.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of assets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the bundle is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render `template` with this bundle as context.
    ///
    /// Referencing a key that is missing from the bundle is an error.
    pub fn render(&self, template: &str) -> Result<String> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.add_template(TEMPLATE_NAME, template)?;

        let tmpl = env.get_template(TEMPLATE_NAME)?;
        Ok(tmpl.render(&self.0)?)
    }
}

impl FromIterator<(String, Value)> for AssetBundle {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
