// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! External asset backend.
//!
//! The backend is invoked as `<program> [args...] <scratch_dir>`. Device ids
//! are written to `<scratch_dir>/matches.txt`, one per line, before the call;
//! the backend must write a JSON object to `<scratch_dir>/assets.json` and
//! exit 0.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::assets::AssetBundle;
use crate::error::{Result, SdkError};

/// File listing the device ids handed to the backend.
pub const MATCHES_FILE: &str = "matches.txt";

/// File the backend writes its assets to.
pub const ASSETS_FILE: &str = "assets.json";

/// An asset backend executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBackend {
    program: PathBuf,
    args: Vec<String>,
}

impl AssetBackend {
    /// Create a backend invoking `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments passed before the scratch directory.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// The program path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the backend for `device_ids` and collect its assets.
    ///
    /// The scratch directory is removed when this returns, on every path.
    #[instrument(skip(self, device_ids), fields(program = %self.program.display(), devices = device_ids.len()))]
    pub async fn resolve(&self, device_ids: &[String]) -> Result<AssetBundle> {
        let scratch = tempfile::Builder::new()
            .prefix("mercury-press-")
            .tempdir()
            .map_err(|e| SdkError::Backend(format!("could not create scratch directory: {}", e)))?;

        let mut matches = device_ids.join("\n");
        if !matches.is_empty() {
            matches.push('\n');
        }
        tokio::fs::write(scratch.path().join(MATCHES_FILE), matches)
            .await
            .map_err(|e| SdkError::Backend(format!("could not write {}: {}", MATCHES_FILE, e)))?;

        info!("Running asset backend");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(scratch.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SdkError::Backend(format!(
                        "backend not found: {}",
                        self.program.display()
                    ))
                } else {
                    SdkError::Backend(format!(
                        "could not run {}: {}",
                        self.program.display(),
                        e
                    ))
                }
            })?;

        if !output.stdout.is_empty() {
            debug!(stdout = %String::from_utf8_lossy(&output.stdout), "Backend output");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SdkError::Backend(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let artifact = scratch.path().join(ASSETS_FILE);
        let content = tokio::fs::read_to_string(&artifact).await.map_err(|e| {
            SdkError::Backend(format!("backend produced no {}: {}", ASSETS_FILE, e))
        })?;

        let value: Value = serde_json::from_str(&content)
            .map_err(|e| SdkError::Backend(format!("invalid {}: {}", ASSETS_FILE, e)))?;
        let bundle = AssetBundle::from_value(value)
            .ok_or_else(|| SdkError::Backend(format!("{} must be a JSON object", ASSETS_FILE)))?;

        debug!(keys = bundle.len(), "Backend assets collected");
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sh(script: &str) -> AssetBackend {
        AssetBackend::new("sh").with_args(["-c", script, "backend"])
    }

    #[tokio::test]
    async fn test_backend_success() {
        let backend = sh(r#"printf '{"k":"v"}' > "$1/assets.json""#);
        let assets = backend.resolve(&["d1".to_string()]).await.unwrap();
        assert_eq!(assets.get("k"), Some(&json!("v")));
    }

    #[tokio::test]
    async fn test_backend_reads_matches() {
        let backend = sh(
            r#"n=$(wc -l < "$1/matches.txt" | tr -d ' '); first=$(head -n1 "$1/matches.txt"); printf '{"count":"%s","first":"%s"}' "$n" "$first" > "$1/assets.json""#,
        );
        let assets = backend
            .resolve(&["d1".to_string(), "d2".to_string()])
            .await
            .unwrap();
        assert_eq!(assets.get("count"), Some(&json!("2")));
        assert_eq!(assets.get("first"), Some(&json!("d1")));
    }

    #[tokio::test]
    async fn test_backend_non_zero_exit() {
        let result = sh("echo boom >&2; exit 1").resolve(&["d1".to_string()]).await;
        match result {
            Err(SdkError::Backend(message)) => assert!(message.contains("boom")),
            other => panic!("expected backend failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backend_missing_artifact() {
        let result = sh("exit 0").resolve(&["d1".to_string()]).await;
        assert!(matches!(result, Err(SdkError::Backend(_))));
    }

    #[tokio::test]
    async fn test_backend_non_object_artifact() {
        let result = sh(r#"echo '[1, 2]' > "$1/assets.json""#)
            .resolve(&["d1".to_string()])
            .await;
        assert!(matches!(result, Err(SdkError::Backend(_))));
    }

    #[tokio::test]
    async fn test_backend_not_found() {
        let result = AssetBackend::new("/nonexistent/mercury-asset-backend")
            .resolve(&["d1".to_string()])
            .await;
        match result {
            Err(SdkError::Backend(message)) => assert!(message.contains("not found")),
            other => panic!("expected backend failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scratch_directory_removed() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("scratch");
        let script = format!(r#"printf '%s' "$1" > '{}'; exit 3"#, record.display());

        let result = sh(&script).resolve(&["d1".to_string()]).await;
        assert!(matches!(result, Err(SdkError::Backend(_))));

        let scratch = std::fs::read_to_string(&record).unwrap();
        assert!(!scratch.is_empty());
        assert!(!Path::new(&scratch).exists());
    }
}
