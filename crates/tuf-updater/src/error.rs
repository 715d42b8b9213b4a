// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by the update engine.
//!
//! Failures are split by origin so callers can tell a flaky network from a
//! repository that is serving untrustworthy metadata. Repository errors are
//! the only class the engine downgrades when they come from the local cache.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::fetcher::FetchError;
use crate::store::StoreError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by [`crate::Updater`] operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration is missing a required value.
    #[error("configuration error: {0}")]
    Config(String),
    /// The fetcher failed to retrieve a resource.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
    /// Metadata or target content failed verification.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    /// A trusted-set update was attempted out of protocol order.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// No trusted role declares the requested target path.
    #[error("target {0} not found")]
    TargetNotFound(String),
    /// The local cache could not be read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Returns `true` when the error stems from untrusted repository content.
    pub fn is_repository(&self) -> bool {
        matches!(self, Error::Repository(_))
    }

    /// Returns `true` when the fetcher reported the resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Fetch(err) if err.is_not_found())
    }
}

/// Verification failures raised against repository metadata or target bytes.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The document is not valid JSON or violates a structural invariant.
    #[error("malformed metadata: {0}")]
    Malformed(String),
    /// The `_type` tag does not match the expected role.
    #[error("expected metadata type {expected}, got {actual}")]
    BadType { expected: String, actual: String },
    /// Fewer distinct keys than the threshold produced a valid signature.
    #[error("{role} was signed by {valid}/{threshold} keys")]
    Unsigned {
        role: String,
        valid: usize,
        threshold: u64,
    },
    /// A version number regressed or skipped ahead.
    #[error("{role} version {actual} is not acceptable, expected {expected}")]
    BadVersion {
        role: String,
        expected: String,
        actual: u64,
    },
    /// The candidate carries the version that is already trusted.
    #[error("{role} version {version} is already trusted")]
    EqualVersion { role: String, version: u64 },
    /// The metadata expiry is in the past.
    #[error("{role} expired at {expires}")]
    Expired {
        role: String,
        expires: DateTime<Utc>,
    },
    /// Content does not match the length or hashes it was referenced with.
    #[error("length or hash mismatch: {0}")]
    LengthOrHashMismatch(String),
    /// A role is not referenced by the metadata that should describe it.
    #[error("role {role} not found in {parent}")]
    MissingMeta { role: String, parent: String },
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Malformed(err.to_string())
    }
}
