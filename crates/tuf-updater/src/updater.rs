// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client update workflow.
//!
//! [`Updater`] drives a [`TrustedSet`] through the TUF client steps: rotate
//! the root, then load timestamp, snapshot and targets, each from the local
//! cache first and from the repository when the cached copy is missing or
//! rejected. Target lookups walk the delegation graph and load every role on
//! the way.
//!
//! `refresh` may be called repeatedly: each call after the first restarts
//! from the trusted root. Mutating operations take `&mut self` and every
//! network, verification and disk step is awaited in order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::UpdaterConfig;
use crate::delegation::DelegationWalk;
use crate::error::{Error, RepositoryError, Result};
use crate::metadata::{TargetFile, ROOT, SNAPSHOT, TARGETS, TIMESTAMP};
use crate::store::{persist_atomic, read_file, LocalStore};
use crate::trusted::{TrustedMetadata, TrustedSet};

/// TUF client bound to one repository and one local cache.
pub struct Updater {
    config: UpdaterConfig,
    trusted: Box<dyn TrustedSet>,
    /// Bytes of the currently trusted root.
    trusted_root: Vec<u8>,
    reference_time: Option<DateTime<Utc>>,
    store: LocalStore,
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("config", &self.config)
            .field("root_version", &self.trusted.root().signed.version)
            .finish_non_exhaustive()
    }
}

impl Updater {
    /// Creates an updater trusting `config.local_trusted_root`.
    ///
    /// The root must be signed by its own keys. It is written to the cache as
    /// `root.json` before anything else happens.
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        config.validate()?;
        let trusted = TrustedMetadata::new(&config.local_trusted_root, Utc::now())?;
        Self::with_trusted_set(config, Box::new(trusted))
    }

    /// Creates an updater around a caller-provided verification core.
    pub fn with_trusted_set(config: UpdaterConfig, trusted: Box<dyn TrustedSet>) -> Result<Self> {
        config.validate()?;
        let store = LocalStore::new(
            config.local_metadata_dir.clone(),
            config.local_targets_dir.clone(),
            !config.disable_local_cache,
        );
        store.ensure_dirs()?;
        store.write_metadata(ROOT, &config.local_trusted_root)?;
        Ok(Self {
            trusted_root: config.local_trusted_root.clone(),
            config,
            trusted,
            reference_time: None,
            store,
        })
    }

    /// Brings the top-level metadata up to date.
    ///
    /// In local-only mode the cached timestamp, snapshot and targets are
    /// re-verified against the trusted root and nothing is downloaded.
    ///
    /// Once a timestamp has been trusted, a further call starts over from a
    /// fresh [`TrustedMetadata`] built on the current root, replacing any
    /// verification core given to [`Updater::with_trusted_set`].
    pub async fn refresh(&mut self) -> Result<()> {
        if self.trusted.timestamp().is_some() {
            self.restart_from_root()?;
        }
        if self.config.unsafe_local_mode {
            return self.local_refresh();
        }
        self.load_root().await?;
        self.load_timestamp().await?;
        self.load_snapshot().await?;
        self.load_targets(TARGETS, ROOT).await
    }

    /// Resolves `target_path` through the delegation graph.
    ///
    /// Refreshes first when no top-level targets are trusted yet.
    pub async fn get_target_info(&mut self, target_path: &str) -> Result<TargetFile> {
        if self.trusted.targets(TARGETS).is_none() {
            self.refresh().await?;
        }
        self.resolve_target(target_path).await
    }

    /// Downloads and verifies `target`.
    ///
    /// `dest` defaults to the target's path in the targets cache and
    /// `base_url` to the configured targets URL. The bytes are written to
    /// `dest` only once they match the declared length and hashes, and only
    /// when the cache is enabled.
    pub async fn download_target(
        &self,
        target: &TargetFile,
        dest: Option<&Path>,
        base_url: Option<&str>,
    ) -> Result<(PathBuf, Vec<u8>)> {
        let path = match dest {
            Some(path) => path.to_path_buf(),
            None => self.default_target_path(target)?,
        };
        let base_url = base_url
            .or(self.config.remote_targets_url.as_deref())
            .ok_or_else(|| {
                Error::Config("a targets base URL must be configured or provided".to_string())
            })?;

        let remote_path = if self.trusted.root().signed.consistent_snapshot
            && self.config.prefix_targets_with_hash
        {
            hash_prefixed_path(target)
        } else {
            target.path.clone()
        };
        let url = format!("{}/{}", base_url.trim_end_matches('/'), remote_path);
        let data = self
            .config
            .fetcher
            .download_file(&url, target.length, 0)
            .await?;
        target.verify_length_hashes(&data)?;

        if self.store.is_enabled() {
            persist_atomic(&path, &data)?;
        }
        info!(path = %target.path, bytes = data.len(), "downloaded target");
        Ok((path, data))
    }

    /// Returns the cached copy of `target` if it still matches the metadata.
    ///
    /// A missing, unreadable or mismatching file is reported as `Ok(None)`.
    pub fn find_cached_target(
        &self,
        target: &TargetFile,
        dest: Option<&Path>,
    ) -> Result<Option<(PathBuf, Vec<u8>)>> {
        if !self.store.is_enabled() {
            return Ok(None);
        }
        let path = match dest {
            Some(path) => path.to_path_buf(),
            None => self.default_target_path(target)?,
        };
        let Ok(Some(data)) = read_file(&path) else {
            return Ok(None);
        };
        if target.verify_length_hashes(&data).is_err() {
            debug!(path = %target.path, "cached target does not match metadata");
            return Ok(None);
        }
        Ok(Some((path, data)))
    }

    /// Targets listed directly by the trusted top-level targets role.
    pub fn top_level_targets(&self) -> Option<&BTreeMap<String, TargetFile>> {
        self.trusted
            .targets(TARGETS)
            .map(|targets| &targets.signed.targets)
    }

    pub fn trusted_set(&self) -> &dyn TrustedSet {
        self.trusted.as_ref()
    }

    /// Overrides the time used for expiry checks, including by later
    /// refreshes.
    pub fn set_reference_time(&mut self, reference_time: DateTime<Utc>) {
        self.reference_time = Some(reference_time);
        self.trusted.set_reference_time(reference_time);
    }

    fn restart_from_root(&mut self) -> Result<()> {
        let reference_time = self.reference_time.unwrap_or_else(Utc::now);
        self.trusted = Box::new(TrustedMetadata::new(&self.trusted_root, reference_time)?);
        debug!(
            version = self.trusted.root().signed.version,
            "restarting refresh from trusted root"
        );
        Ok(())
    }

    fn local_refresh(&mut self) -> Result<()> {
        let timestamp = self.require_cached(TIMESTAMP)?;
        self.trusted.update_timestamp(&timestamp)?;
        let snapshot = self.require_cached(SNAPSHOT)?;
        self.trusted.update_snapshot(&snapshot, false)?;
        let targets = self.require_cached(TARGETS)?;
        self.trusted
            .update_delegated_targets(&targets, TARGETS, ROOT)?;
        debug!("refreshed from local cache");
        Ok(())
    }

    fn require_cached(&self, role: &str) -> Result<Vec<u8>> {
        self.store.read_metadata(role)?.ok_or_else(|| {
            Error::InvalidState(format!("local-only refresh requires cached {role} metadata"))
        })
    }

    /// Cached bytes for `role`; unreadable files count as a miss.
    fn read_cached(&self, role: &str) -> Option<Vec<u8>> {
        match self.store.read_metadata(role) {
            Ok(data) => data,
            Err(err) => {
                warn!(role, error = %err, "failed to read cached metadata");
                None
            }
        }
    }

    async fn load_root(&mut self) -> Result<()> {
        let lower = self.trusted.root().signed.version + 1;
        let upper = lower.saturating_add(self.config.max_root_rotations);
        for next in lower..upper {
            let data = match self
                .download_metadata(ROOT, self.config.root_max_length, Some(next))
                .await
            {
                Ok(data) => data,
                Err(err) if err.is_not_found() => {
                    debug!(version = next, "no newer root");
                    break;
                }
                Err(err) => return Err(err),
            };
            self.trusted.update_root(&data)?;
            self.store.write_metadata(ROOT, &data)?;
            self.trusted_root = data;
        }
        Ok(())
    }

    async fn load_timestamp(&mut self) -> Result<()> {
        // A valid cached timestamp only serves as the rollback baseline.
        if let Some(data) = self.read_cached(TIMESTAMP) {
            match self.trusted.update_timestamp(&data) {
                Ok(()) => {}
                Err(err) if err.is_repository() => {
                    info!(error = %err, "cached timestamp rejected");
                }
                Err(err) => return Err(err),
            }
        }

        let data = self
            .download_metadata(TIMESTAMP, self.config.timestamp_max_length, None)
            .await?;
        match self.trusted.update_timestamp(&data) {
            Ok(()) => {}
            Err(Error::Repository(RepositoryError::EqualVersion { version, .. })) => {
                debug!(version, "timestamp unchanged");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
        self.store.write_metadata(TIMESTAMP, &data)?;
        Ok(())
    }

    async fn load_snapshot(&mut self) -> Result<()> {
        if let Some(data) = self.read_cached(SNAPSHOT) {
            match self.trusted.update_snapshot(&data, true) {
                Ok(()) => {
                    debug!("using cached snapshot");
                    return Ok(());
                }
                Err(err) if err.is_repository() => {
                    info!(error = %err, "cached snapshot rejected");
                }
                Err(err) => return Err(err),
            }
        }

        let timestamp = self
            .trusted
            .timestamp()
            .ok_or_else(|| Error::InvalidState("trusted timestamp not set".to_string()))?;
        let meta = timestamp.signed.snapshot_meta()?;
        let max_length = meta.length.unwrap_or(self.config.snapshot_max_length);
        let version = self
            .trusted
            .root()
            .signed
            .consistent_snapshot
            .then_some(meta.version);

        let data = self.download_metadata(SNAPSHOT, max_length, version).await?;
        self.trusted.update_snapshot(&data, false)?;
        self.store.write_metadata(SNAPSHOT, &data)?;
        Ok(())
    }

    /// Loads targets role `role`, delegated by `parent`, unless it is
    /// already trusted.
    async fn load_targets(&mut self, role: &str, parent: &str) -> Result<()> {
        if self.trusted.targets(role).is_some() {
            return Ok(());
        }

        if let Some(data) = self.read_cached(role) {
            match self.trusted.update_delegated_targets(&data, role, parent) {
                Ok(()) => {
                    debug!(role, "using cached targets");
                    return Ok(());
                }
                Err(err) if err.is_repository() => {
                    info!(role, error = %err, "cached targets rejected");
                }
                Err(err) => return Err(err),
            }
        }
        if self.config.unsafe_local_mode {
            return Err(Error::InvalidState(format!(
                "local-only refresh requires cached {role} metadata"
            )));
        }

        let snapshot = self
            .trusted
            .snapshot()
            .ok_or_else(|| Error::InvalidState("trusted snapshot not set".to_string()))?;
        let meta = snapshot.signed.role_meta(role)?;
        let max_length = meta.length.unwrap_or(self.config.targets_max_length);
        let version = self
            .trusted
            .root()
            .signed
            .consistent_snapshot
            .then_some(meta.version);

        let data = self.download_metadata(role, max_length, version).await?;
        self.trusted
            .update_delegated_targets(&data, role, parent)?;
        self.store.write_metadata(role, &data)?;
        Ok(())
    }

    async fn resolve_target(&mut self, target_path: &str) -> Result<TargetFile> {
        let mut walk = DelegationWalk::new(target_path, self.config.max_delegations);
        while let Some((role, parent)) = walk.next_role() {
            self.load_targets(&role, &parent).await?;
            let metadata = self
                .trusted
                .targets(&role)
                .ok_or_else(|| Error::InvalidState(format!("targets role {role} not loaded")))?;
            if let Some(target) = walk.visit(&role, &metadata.signed) {
                debug!(target_path, role, "resolved target");
                return Ok(target);
            }
        }
        if walk.exceeded_bound() {
            warn!(
                target_path,
                max_delegations = self.config.max_delegations,
                "maximum number of delegations reached"
            );
        }
        Err(Error::TargetNotFound(target_path.to_string()))
    }

    async fn download_metadata(
        &self,
        role: &str,
        max_length: u64,
        version: Option<u64>,
    ) -> Result<Vec<u8>> {
        let url = metadata_url(&self.config.remote_metadata_url, role, version);
        Ok(self
            .config
            .fetcher
            .download_file(&url, max_length, 0)
            .await?)
    }

    fn default_target_path(&self, target: &TargetFile) -> Result<PathBuf> {
        if let Some(path) = self.store.target_path(&target.path) {
            return Ok(path);
        }
        if self.store.is_enabled() {
            return Err(Error::Config(
                "local targets dir must be set if no destination is given".to_string(),
            ));
        }
        Ok(PathBuf::from(urlencoding::encode(&target.path).into_owned()))
    }
}

/// `<base>/<role>.json`, or `<base>/<version>.<role>.json` when pinned.
fn metadata_url(base: &str, role: &str, version: Option<u64>) -> String {
    let base = base.trim_end_matches('/');
    let role = urlencoding::encode(role);
    match version {
        Some(version) => format!("{base}/{version}.{role}.json"),
        None => format!("{base}/{role}.json"),
    }
}

/// Remote path with the basename prefixed by the target's first hash.
fn hash_prefixed_path(target: &TargetFile) -> String {
    let Some(hash) = target.hashes.values().next() else {
        return target.path.clone();
    };
    match target.path.rsplit_once('/') {
        Some((dir, base)) => format!("{dir}/{hash}.{base}"),
        None => format!("{hash}.{}", target.path),
    }
}
