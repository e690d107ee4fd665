// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Token cache and token acquisition through an external auth handler.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use mercury_http::AuthToken;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::CommandLine;
use crate::error::{Result, SdkError};

/// How long a freshly acquired token is considered valid.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 8;

/// YAML file holding the current token.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Create a cache backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached token. Missing, unreadable or expired tokens yield `None`.
    pub fn load(&self) -> Result<Option<AuthToken>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let token: AuthToken = match serde_yaml::from_str(&content) {
            Ok(token) => token,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt token cache");
                return Ok(None);
            }
        };

        if token.is_expired() {
            debug!(expires_at = %token.expires_at, "Cached token has expired");
            return Ok(None);
        }
        Ok(Some(token))
    }

    /// Write `token` to the cache, readable only by the owner.
    ///
    /// The token is written to an owner-only temporary file in the same
    /// directory and renamed over the cache.
    pub fn store(&self, token: &AuthToken) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                std::fs::create_dir_all(parent)?;
                parent
            }
            _ => Path::new("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(serde_yaml::to_string(token)?.as_bytes())?;
        file.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), "Stored token");
        Ok(())
    }

    /// Remove the cached token. Succeeds when there is none.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Run the auth handler and return the token it prints on stdout.
pub async fn acquire_token(handler: &CommandLine) -> Result<String> {
    let program = handler
        .program()
        .ok_or_else(|| SdkError::Auth("auth_handler is empty".to_string()))?;

    info!(%program, "Running auth handler");
    let output = Command::new(program)
        .args(handler.args())
        .stdin(Stdio::inherit())
        .stderr(Stdio::inherit())
        .output()
        .await
        .map_err(|e| SdkError::Auth(format!("could not run auth handler {}: {}", program, e)))?;

    if !output.status.success() {
        return Err(SdkError::Auth(format!(
            "auth handler {} exited with {}",
            program, output.status
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(SdkError::Auth(format!(
            "auth handler {} printed no token",
            program
        )));
    }
    Ok(token)
}

/// Return the cached token, or acquire a new one through `handler`.
///
/// A newly acquired token is cached unless `store` is false.
pub async fn login(
    cache: &TokenCache,
    handler: Option<&CommandLine>,
    store: bool,
) -> Result<AuthToken> {
    if let Some(token) = cache.load()? {
        debug!("Using cached token");
        return Ok(token);
    }

    let handler = handler.ok_or_else(|| {
        SdkError::Auth("no cached token and no auth_handler configured".to_string())
    })?;

    let token = AuthToken::valid_for(
        acquire_token(handler).await?,
        chrono::Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
    );
    if store {
        cache.store(&token)?;
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_store_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("nested").join(".token.yml"));
        assert!(cache.load().unwrap().is_none());

        let token = AuthToken::valid_for("secret", Duration::hours(1));
        cache.store(&token).unwrap();
        assert_eq!(cache.load().unwrap(), Some(token));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(cache.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_none());
        cache.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_store_replaces_readable_cache() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join(".token.yml"));
        std::fs::write(cache.path(), "stale").unwrap();
        std::fs::set_permissions(cache.path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        let token = AuthToken::valid_for("secret", Duration::hours(1));
        cache.store(&token).unwrap();

        let mode = std::fs::metadata(cache.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(cache.load().unwrap(), Some(token));

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_expired_token_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join(".token.yml"));
        cache
            .store(&AuthToken::new("old", Utc::now() - Duration::minutes(1)))
            .unwrap();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".token.yml");
        std::fs::write(&path, "- not\n- a token\n").unwrap();
        assert!(TokenCache::new(path).load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_runs_handler_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join(".token.yml"));
        let handler = CommandLine::Argv(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo fresh-token".to_string(),
        ]);

        let token = login(&cache, Some(&handler), true).await.unwrap();
        assert_eq!(token.token, "fresh-token");
        assert_eq!(cache.load().unwrap().unwrap().token, "fresh-token");

        // Served from the cache; the handler would now fail.
        let failing = CommandLine::Argv(vec!["sh".into(), "-c".into(), "exit 1".into()]);
        let token = login(&cache, Some(&failing), true).await.unwrap();
        assert_eq!(token.token, "fresh-token");
    }

    #[tokio::test]
    async fn test_login_without_store() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join(".token.yml"));
        let handler = CommandLine::Argv(vec!["sh".into(), "-c".into(), "echo t".into()]);

        login(&cache, Some(&handler), false).await.unwrap();
        assert!(!cache.path().exists());
    }

    #[tokio::test]
    async fn test_login_failures() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join(".token.yml"));

        assert!(matches!(
            login(&cache, None, true).await,
            Err(SdkError::Auth(_))
        ));

        let silent = CommandLine::Argv(vec!["sh".into(), "-c".into(), "true".into()]);
        assert!(matches!(
            login(&cache, Some(&silent), true).await,
            Err(SdkError::Auth(_))
        ));

        let failing = CommandLine::Argv(vec!["sh".into(), "-c".into(), "exit 2".into()]);
        assert!(matches!(
            login(&cache, Some(&failing), true).await,
            Err(SdkError::Auth(_))
        ));
    }
}
