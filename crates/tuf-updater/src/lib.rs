// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Client-side update engine for The Update Framework.
//!
//! The crate re-exports what a host needs to bootstrap an [`Updater`] from a
//! trusted root, refresh repository metadata, resolve targets through
//! delegations and download verified target files.

pub mod config;
mod delegation;
pub mod error;
pub mod fetcher;
pub mod keys;
pub mod metadata;
pub mod store;
pub mod trusted;
pub mod updater;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{UpdaterConfig, UpdaterEnv};
pub use error::{Error, RepositoryError, Result};
pub use fetcher::{FetchError, Fetcher, HttpFetcher, HttpFetcherOptions};
pub use keys::{Key, KeyError};
pub use metadata::{
    DelegatedRole, Delegations, MetaFile, Metadata, Role, RootMetadata, SnapshotMetadata,
    SuccinctRoles, TargetFile, TargetsMetadata, TimestampMetadata,
};
pub use store::{LocalStore, StoreError};
pub use trusted::{TrustedMetadata, TrustedSet};
pub use updater::Updater;

#[cfg(test)]
mod tests {
    use super::*;

    /// Ensures an updater can be configured through the crate root alone.
    #[test]
    fn config_types_are_reexported() {
        let env = UpdaterEnv::from_env_iter::<Vec<(String, String)>, _, _>(Vec::new());
        assert!(env.metadata_url.is_none());
        assert!(matches!(env.load_config(), Err(Error::Config(_))));
    }

    /// Verifies the verification core is usable as a trait object.
    #[test]
    fn trusted_set_is_object_safe() {
        let sim = test_support::RepositorySimulator::new();
        let trusted: Box<dyn TrustedSet> = Box::new(
            TrustedMetadata::new(&sim.trusted_root(), chrono::Utc::now()).unwrap(),
        );
        assert_eq!(trusted.root().signed.version, 1);
    }
}
