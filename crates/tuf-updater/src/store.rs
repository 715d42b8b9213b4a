// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! File-backed cache for metadata and target files.
//!
//! Metadata lives at `<metadata_dir>/<escaped role>.json` and targets at
//! `<targets_dir>/<escaped path>`. Writes go through a temporary file in the
//! destination directory and a rename, then the final file is read back and
//! compared so a short write never goes unnoticed. Nothing read from here is
//! trusted until the verification core accepts it again.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Permission bits applied to every persisted file.
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Errors emitted by the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),
    #[error("persisted file {0} does not match the written payload")]
    ReadBackMismatch(PathBuf),
}

/// Locations of the on-disk cache.
#[derive(Debug, Clone)]
pub struct LocalStore {
    metadata_dir: PathBuf,
    targets_dir: Option<PathBuf>,
    enabled: bool,
}

impl LocalStore {
    /// Describes a cache rooted at the given directories.
    ///
    /// When `enabled` is false every read reports a miss and every write is
    /// skipped.
    pub fn new(metadata_dir: PathBuf, targets_dir: Option<PathBuf>, enabled: bool) -> Self {
        Self {
            metadata_dir,
            targets_dir,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn targets_dir(&self) -> Option<&Path> {
        self.targets_dir.as_deref()
    }

    /// Creates the cache directories if they do not exist.
    pub fn ensure_dirs(&self) -> Result<(), StoreError> {
        if !self.enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.metadata_dir)?;
        if let Some(targets_dir) = &self.targets_dir {
            fs::create_dir_all(targets_dir)?;
        }
        Ok(())
    }

    /// Path of the cached metadata file for `role`.
    pub fn metadata_path(&self, role: &str) -> PathBuf {
        self.metadata_dir
            .join(format!("{}.json", urlencoding::encode(role)))
    }

    /// Default cache path for the target at logical `path`.
    pub fn target_path(&self, path: &str) -> Option<PathBuf> {
        self.targets_dir
            .as_ref()
            .map(|dir| dir.join(urlencoding::encode(path).into_owned()))
    }

    /// Reads cached metadata; `Ok(None)` means nothing is cached.
    pub fn read_metadata(&self, role: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if !self.enabled {
            return Ok(None);
        }
        read_file(&self.metadata_path(role))
    }

    /// Atomically replaces the cached metadata for `role`.
    pub fn write_metadata(&self, role: &str, data: &[u8]) -> Result<(), StoreError> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.metadata_path(role);
        persist_atomic(&path, data)?;
        debug!(role, path = %path.display(), "persisted metadata");
        Ok(())
    }
}

/// Reads a whole file, mapping "does not exist" to `Ok(None)`.
pub fn read_file(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::Io(err)),
    }
}

/// Writes `data` to `path` through a temporary file and a rename, then
/// verifies the result by reading it back.
///
/// The temporary file is removed on every failure path, so `path` either
/// keeps its previous content or holds exactly `data`.
pub fn persist_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
    }
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| StoreError::Io(err.error))?;

    let written = fs::read(path)?;
    if written != data {
        return Err(StoreError::ReadBackMismatch(path.to_path_buf()));
    }
    Ok(())
}
