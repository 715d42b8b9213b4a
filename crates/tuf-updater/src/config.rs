// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Updater configuration.
//!
//! [`UpdaterConfig`] is the static input to [`crate::Updater::new`]. It can be
//! built in code through the `with_*` helpers, or from `TUF_*` environment
//! variables through [`UpdaterEnv`], which captures the raw values first so
//! embedders can inspect or override them before anything touches the disk.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::fetcher::{Fetcher, HttpFetcher, HttpFetcherOptions};

/// Root versions tried per refresh.
pub const DEFAULT_MAX_ROOT_ROTATIONS: u64 = 256;
/// Delegated roles visited per target lookup.
pub const DEFAULT_MAX_DELEGATIONS: usize = 32;
pub const DEFAULT_ROOT_MAX_LENGTH: u64 = 512_000;
pub const DEFAULT_TIMESTAMP_MAX_LENGTH: u64 = 16_384;
pub const DEFAULT_SNAPSHOT_MAX_LENGTH: u64 = 2_000_000;
pub const DEFAULT_TARGETS_MAX_LENGTH: u64 = 5_000_000;

/// Base URL of the remote metadata repository.
const ENV_METADATA_URL: &str = "TUF_METADATA_URL";
/// Base URL for target downloads (defaults to `<metadata url>/targets`).
const ENV_TARGETS_URL: &str = "TUF_TARGETS_URL";
/// Path to the out-of-band trusted root document.
const ENV_TRUSTED_ROOT: &str = "TUF_TRUSTED_ROOT";
/// Directory holding cached metadata.
const ENV_METADATA_DIR: &str = "TUF_METADATA_DIR";
/// Directory holding cached targets.
const ENV_TARGETS_DIR: &str = "TUF_TARGETS_DIR";
const ENV_DISABLE_LOCAL_CACHE: &str = "TUF_DISABLE_LOCAL_CACHE";
const ENV_LOCAL_ONLY: &str = "TUF_LOCAL_ONLY";
const ENV_PREFIX_TARGETS_WITH_HASH: &str = "TUF_PREFIX_TARGETS_WITH_HASH";
const ENV_MAX_ROOT_ROTATIONS: &str = "TUF_MAX_ROOT_ROTATIONS";
const ENV_MAX_DELEGATIONS: &str = "TUF_MAX_DELEGATIONS";
const ENV_HTTP_TIMEOUT_SECS: &str = "TUF_HTTP_TIMEOUT_SECS";
const ENV_HTTP_RETRIES: &str = "TUF_HTTP_RETRIES";
const ENV_LOG_LEVEL: &str = "TUF_LOG_LEVEL";

const DEFAULT_LOG_LEVEL: &str = "info";

/// Settings consumed by [`crate::Updater`].
#[derive(Clone)]
pub struct UpdaterConfig {
    /// Bytes of the out-of-band trusted root.
    pub local_trusted_root: Vec<u8>,
    pub remote_metadata_url: String,
    /// Default base URL for target downloads.
    pub remote_targets_url: Option<String>,
    pub local_metadata_dir: PathBuf,
    /// Default download directory; required for downloads without an
    /// explicit destination while the cache is enabled.
    pub local_targets_dir: Option<PathBuf>,
    pub max_root_rotations: u64,
    pub max_delegations: usize,
    pub root_max_length: u64,
    pub timestamp_max_length: u64,
    /// Used when the timestamp does not declare the snapshot length.
    pub snapshot_max_length: u64,
    /// Used when the snapshot does not declare a targets role length.
    pub targets_max_length: u64,
    /// Fetch targets as `<hash>.<name>` when the root enables consistent snapshots.
    pub prefix_targets_with_hash: bool,
    pub disable_local_cache: bool,
    /// Refresh from the local cache only; no network access.
    pub unsafe_local_mode: bool,
    pub fetcher: Arc<dyn Fetcher>,
}

impl UpdaterConfig {
    /// Builds a configuration with default limits and an [`HttpFetcher`].
    ///
    /// Targets are fetched from `<remote_metadata_url>/targets` and metadata is
    /// cached in the working directory unless overridden.
    pub fn new(remote_metadata_url: impl Into<String>, local_trusted_root: Vec<u8>) -> Result<Self> {
        let fetcher = HttpFetcher::new(HttpFetcherOptions::default())?;
        Ok(Self::with_fetcher(
            remote_metadata_url,
            local_trusted_root,
            Arc::new(fetcher),
        ))
    }

    /// Same as [`UpdaterConfig::new`] with a caller-provided transport.
    pub fn with_fetcher(
        remote_metadata_url: impl Into<String>,
        local_trusted_root: Vec<u8>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let remote_metadata_url = remote_metadata_url.into();
        let remote_targets_url = if remote_metadata_url.is_empty() {
            None
        } else {
            Some(format!("{}/targets", remote_metadata_url.trim_end_matches('/')))
        };
        Self {
            local_trusted_root,
            remote_metadata_url,
            remote_targets_url,
            local_metadata_dir: PathBuf::from("."),
            local_targets_dir: None,
            max_root_rotations: DEFAULT_MAX_ROOT_ROTATIONS,
            max_delegations: DEFAULT_MAX_DELEGATIONS,
            root_max_length: DEFAULT_ROOT_MAX_LENGTH,
            timestamp_max_length: DEFAULT_TIMESTAMP_MAX_LENGTH,
            snapshot_max_length: DEFAULT_SNAPSHOT_MAX_LENGTH,
            targets_max_length: DEFAULT_TARGETS_MAX_LENGTH,
            prefix_targets_with_hash: true,
            disable_local_cache: false,
            unsafe_local_mode: false,
            fetcher,
        }
    }

    pub fn with_metadata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_metadata_dir = dir.into();
        self
    }

    pub fn with_targets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_targets_dir = Some(dir.into());
        self
    }

    pub fn with_targets_url(mut self, url: impl Into<String>) -> Self {
        self.remote_targets_url = Some(url.into());
        self
    }

    /// Keeps everything in memory; nothing is read from or written to disk.
    pub fn without_cache(mut self) -> Self {
        self.disable_local_cache = true;
        self
    }

    /// Refreshes from the cache only.
    pub fn local_only(mut self) -> Self {
        self.unsafe_local_mode = true;
        self
    }

    /// Rejects configurations [`crate::Updater`] cannot start from.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.local_trusted_root.is_empty() || self.remote_metadata_url.is_empty() {
            return Err(Error::Config(
                "no initial trusted root metadata or remote URL provided".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for UpdaterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdaterConfig")
            .field("local_trusted_root_len", &self.local_trusted_root.len())
            .field("remote_metadata_url", &self.remote_metadata_url)
            .field("remote_targets_url", &self.remote_targets_url)
            .field("local_metadata_dir", &self.local_metadata_dir)
            .field("local_targets_dir", &self.local_targets_dir)
            .field("max_root_rotations", &self.max_root_rotations)
            .field("max_delegations", &self.max_delegations)
            .field("prefix_targets_with_hash", &self.prefix_targets_with_hash)
            .field("disable_local_cache", &self.disable_local_cache)
            .field("unsafe_local_mode", &self.unsafe_local_mode)
            .finish_non_exhaustive()
    }
}

/// Raw `TUF_*` environment settings.
#[derive(Debug, Clone)]
pub struct UpdaterEnv {
    pub metadata_url: Option<String>,
    pub targets_url: Option<String>,
    pub trusted_root_path: Option<PathBuf>,
    pub metadata_dir: Option<PathBuf>,
    pub targets_dir: Option<PathBuf>,
    pub disable_local_cache: bool,
    pub local_only: bool,
    pub prefix_targets_with_hash: bool,
    pub max_root_rotations: u64,
    pub max_delegations: usize,
    pub http_timeout: Option<Duration>,
    pub http_retries: u32,
    /// Filter directive for the log subscriber installed by binaries.
    pub log_level: String,
}

impl UpdaterEnv {
    /// Reads settings from the process environment.
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Reads settings from key/value pairs (typically for tests).
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let text = |key: &str| map.get(key).and_then(|value| sanitize_non_empty(value));
        let flag = |key: &str, default: bool| parse_bool(map.get(key).map(String::as_str), default);

        Self {
            metadata_url: text(ENV_METADATA_URL),
            targets_url: text(ENV_TARGETS_URL),
            trusted_root_path: text(ENV_TRUSTED_ROOT).map(PathBuf::from),
            metadata_dir: text(ENV_METADATA_DIR).map(PathBuf::from),
            targets_dir: text(ENV_TARGETS_DIR).map(PathBuf::from),
            disable_local_cache: flag(ENV_DISABLE_LOCAL_CACHE, false),
            local_only: flag(ENV_LOCAL_ONLY, false),
            prefix_targets_with_hash: flag(ENV_PREFIX_TARGETS_WITH_HASH, true),
            max_root_rotations: text(ENV_MAX_ROOT_ROTATIONS)
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_MAX_ROOT_ROTATIONS),
            max_delegations: text(ENV_MAX_DELEGATIONS)
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_MAX_DELEGATIONS),
            http_timeout: text(ENV_HTTP_TIMEOUT_SECS)
                .and_then(|value| value.parse().ok())
                .map(Duration::from_secs),
            http_retries: text(ENV_HTTP_RETRIES)
                .and_then(|value| value.parse().ok())
                .unwrap_or(0),
            log_level: text(ENV_LOG_LEVEL).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    /// Reads the trusted root from disk and builds the updater configuration.
    pub fn load_config(&self) -> Result<UpdaterConfig> {
        let metadata_url = self
            .metadata_url
            .clone()
            .ok_or_else(|| Error::Config(format!("{ENV_METADATA_URL} is not set")))?;
        let root_path = self
            .trusted_root_path
            .as_ref()
            .ok_or_else(|| Error::Config(format!("{ENV_TRUSTED_ROOT} is not set")))?;
        let root = fs::read(root_path).map_err(|err| {
            Error::Config(format!(
                "failed to read trusted root {}: {err}",
                root_path.display()
            ))
        })?;

        let mut options = HttpFetcherOptions {
            retries: self.http_retries,
            ..HttpFetcherOptions::default()
        };
        if let Some(timeout) = self.http_timeout {
            options.timeout = timeout;
        }
        let fetcher = HttpFetcher::new(options)?;

        let mut config = UpdaterConfig::with_fetcher(metadata_url, root, Arc::new(fetcher));
        if let Some(url) = &self.targets_url {
            config.remote_targets_url = Some(url.clone());
        }
        if let Some(dir) = &self.metadata_dir {
            config.local_metadata_dir = dir.clone();
        }
        config.local_targets_dir = self.targets_dir.clone();
        config.disable_local_cache = self.disable_local_cache;
        config.unsafe_local_mode = self.local_only;
        config.prefix_targets_with_hash = self.prefix_targets_with_hash;
        config.max_root_rotations = self.max_root_rotations;
        config.max_delegations = self.max_delegations;
        Ok(config)
    }
}

/// Helper trimming whitespace and discarding empty values.
fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses boolean values from strings, falling back to the provided default.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn env_defaults_match_client_limits() {
        let env = UpdaterEnv::from_env_iter::<Vec<(String, String)>, _, _>(vec![]);
        assert!(env.metadata_url.is_none());
        assert!(env.prefix_targets_with_hash);
        assert!(!env.disable_local_cache);
        assert!(!env.local_only);
        assert_eq!(env.max_root_rotations, DEFAULT_MAX_ROOT_ROTATIONS);
        assert_eq!(env.max_delegations, DEFAULT_MAX_DELEGATIONS);
        assert_eq!(env.log_level, "info");
    }

    #[test]
    fn env_values_are_trimmed_and_parsed() {
        let env = UpdaterEnv::from_env_iter(vec![
            (ENV_METADATA_URL, " https://repo.example/metadata "),
            (ENV_TARGETS_URL, "   "),
            (ENV_DISABLE_LOCAL_CACHE, "Yes"),
            (ENV_PREFIX_TARGETS_WITH_HASH, "0"),
            (ENV_MAX_DELEGATIONS, "4"),
            (ENV_MAX_ROOT_ROTATIONS, "not-a-number"),
            (ENV_HTTP_TIMEOUT_SECS, "5"),
        ]);
        assert_eq!(
            env.metadata_url.as_deref(),
            Some("https://repo.example/metadata")
        );
        assert!(env.targets_url.is_none());
        assert!(env.disable_local_cache);
        assert!(!env.prefix_targets_with_hash);
        assert_eq!(env.max_delegations, 4);
        assert_eq!(env.max_root_rotations, DEFAULT_MAX_ROOT_ROTATIONS);
        assert_eq!(env.http_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn load_config_reads_root_and_derives_targets_url() {
        let tmp = TempDir::new().unwrap();
        let root_path = tmp.path().join("root.json");
        fs::write(&root_path, b"{\"signed\":{}}").unwrap();
        let env = UpdaterEnv::from_env_iter(vec![
            (ENV_METADATA_URL.to_string(), "https://repo.example/metadata/".to_string()),
            (ENV_TRUSTED_ROOT.to_string(), root_path.display().to_string()),
            (ENV_LOCAL_ONLY.to_string(), "true".to_string()),
        ]);

        let config = env.load_config().unwrap();
        assert_eq!(config.local_trusted_root, b"{\"signed\":{}}");
        assert_eq!(
            config.remote_targets_url.as_deref(),
            Some("https://repo.example/metadata/targets")
        );
        assert!(config.unsafe_local_mode);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_config_requires_url_and_root() {
        let env = UpdaterEnv::from_env_iter::<Vec<(String, String)>, _, _>(vec![]);
        assert!(matches!(env.load_config(), Err(Error::Config(_))));

        let env = UpdaterEnv::from_env_iter(vec![
            (ENV_METADATA_URL, "https://repo.example"),
            (ENV_TRUSTED_ROOT, "/definitely/not/here/root.json"),
        ]);
        assert!(matches!(env.load_config(), Err(Error::Config(_))));
    }

    #[test]
    fn empty_root_or_url_is_a_config_error() {
        let fetcher = Arc::new(HttpFetcher::new(HttpFetcherOptions::default()).unwrap());
        let config = UpdaterConfig::with_fetcher("", b"{}".to_vec(), fetcher.clone());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert!(config.remote_targets_url.is_none());

        let config = UpdaterConfig::with_fetcher("https://repo.example", Vec::new(), fetcher);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
