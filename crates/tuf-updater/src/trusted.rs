// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory set of trusted metadata.
//!
//! [`TrustedMetadata`] is the only place that decides whether a candidate
//! document is trusted. It enforces the client workflow ordering (root, then
//! timestamp, then snapshot, then targets roles), signature thresholds,
//! version rules and expiry. A rejected candidate never replaces trusted
//! state, with one exception: an expired or inconsistent timestamp or
//! snapshot is kept after its signatures check out, so that it still serves
//! as the rollback baseline for the next candidate.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{Error, RepositoryError, Result};
use crate::keys::Key;
use crate::metadata::{
    Metadata, Role, RootMetadata, SnapshotMetadata, TargetsMetadata, TimestampMetadata, ROOT,
    SNAPSHOT, TARGETS, TIMESTAMP,
};

/// Verification core consumed by [`crate::Updater`].
pub trait TrustedSet: Send + Sync {
    fn root(&self) -> &Metadata<RootMetadata>;

    fn timestamp(&self) -> Option<&Metadata<TimestampMetadata>>;

    fn snapshot(&self) -> Option<&Metadata<SnapshotMetadata>>;

    /// The trusted top-level or delegated targets role `role`, if loaded.
    fn targets(&self, role: &str) -> Option<&Metadata<TargetsMetadata>>;

    /// Time used for every expiry decision.
    fn reference_time(&self) -> DateTime<Utc>;

    fn set_reference_time(&mut self, reference_time: DateTime<Utc>);

    /// Verifies and trusts the next root version.
    fn update_root(&mut self, data: &[u8]) -> Result<()>;

    /// Verifies and trusts a timestamp.
    fn update_timestamp(&mut self, data: &[u8]) -> Result<()>;

    /// Verifies and trusts a snapshot. With `trusted` set, the length and
    /// hashes declared by the timestamp are not checked (the bytes come from
    /// the local cache and were checked when first written).
    fn update_snapshot(&mut self, data: &[u8], trusted: bool) -> Result<()>;

    /// Verifies and trusts targets role `role`, delegated by `parent`.
    fn update_delegated_targets(&mut self, data: &[u8], role: &str, parent: &str) -> Result<()>;
}

/// Default [`TrustedSet`].
#[derive(Debug, Clone)]
pub struct TrustedMetadata {
    root: Metadata<RootMetadata>,
    timestamp: Option<Metadata<TimestampMetadata>>,
    snapshot: Option<Metadata<SnapshotMetadata>>,
    targets: HashMap<String, Metadata<TargetsMetadata>>,
    reference_time: DateTime<Utc>,
}

impl TrustedMetadata {
    /// Starts from a root that must be signed by its own root keys.
    pub fn new(root_data: &[u8], reference_time: DateTime<Utc>) -> Result<Self> {
        let root = Metadata::<RootMetadata>::from_bytes(root_data)?;
        verify_with_root(&root.signed, ROOT, &root)?;
        debug!(version = root.signed.version, "loaded trusted root");
        Ok(Self {
            root,
            timestamp: None,
            snapshot: None,
            targets: HashMap::new(),
            reference_time,
        })
    }

    /// Loads the top-level targets role.
    pub fn update_targets(&mut self, data: &[u8]) -> Result<()> {
        self.update_delegated_targets(data, TARGETS, ROOT)
    }

    fn check_final_timestamp(&self) -> Result<()> {
        let timestamp = self
            .timestamp
            .as_ref()
            .ok_or_else(|| Error::InvalidState("trusted timestamp not set".to_string()))?;
        if timestamp.signed.is_expired(self.reference_time) {
            return Err(RepositoryError::Expired {
                role: TIMESTAMP.to_string(),
                expires: timestamp.signed.expires,
            }
            .into());
        }
        Ok(())
    }

    fn check_final_snapshot(&self) -> Result<()> {
        let (Some(timestamp), Some(snapshot)) = (&self.timestamp, &self.snapshot) else {
            return Err(Error::InvalidState(
                "trusted snapshot not set".to_string(),
            ));
        };
        if snapshot.signed.is_expired(self.reference_time) {
            return Err(RepositoryError::Expired {
                role: SNAPSHOT.to_string(),
                expires: snapshot.signed.expires,
            }
            .into());
        }
        let expected = timestamp.signed.snapshot_meta()?.version;
        if snapshot.signed.version != expected {
            return Err(RepositoryError::BadVersion {
                role: SNAPSHOT.to_string(),
                expected: expected.to_string(),
                actual: snapshot.signed.version,
            }
            .into());
        }
        Ok(())
    }
}

impl TrustedSet for TrustedMetadata {
    fn root(&self) -> &Metadata<RootMetadata> {
        &self.root
    }

    fn timestamp(&self) -> Option<&Metadata<TimestampMetadata>> {
        self.timestamp.as_ref()
    }

    fn snapshot(&self) -> Option<&Metadata<SnapshotMetadata>> {
        self.snapshot.as_ref()
    }

    fn targets(&self, role: &str) -> Option<&Metadata<TargetsMetadata>> {
        self.targets.get(role)
    }

    fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    fn set_reference_time(&mut self, reference_time: DateTime<Utc>) {
        self.reference_time = reference_time;
    }

    fn update_root(&mut self, data: &[u8]) -> Result<()> {
        if self.timestamp.is_some() {
            return Err(Error::InvalidState(
                "cannot update root after timestamp".to_string(),
            ));
        }
        let new_root = Metadata::<RootMetadata>::from_bytes(data)?;
        // The new root must satisfy both the currently trusted keys and its own.
        verify_with_root(&self.root.signed, ROOT, &new_root)?;
        let expected = self.root.signed.version + 1;
        if new_root.signed.version != expected {
            return Err(RepositoryError::BadVersion {
                role: ROOT.to_string(),
                expected: expected.to_string(),
                actual: new_root.signed.version,
            }
            .into());
        }
        verify_with_root(&new_root.signed, ROOT, &new_root)?;

        info!(version = new_root.signed.version, "updated trusted root");
        self.root = new_root;
        Ok(())
    }

    fn update_timestamp(&mut self, data: &[u8]) -> Result<()> {
        if self.snapshot.is_some() {
            return Err(Error::InvalidState(
                "cannot update timestamp after snapshot".to_string(),
            ));
        }
        if self.root.signed.is_expired(self.reference_time) {
            return Err(RepositoryError::Expired {
                role: ROOT.to_string(),
                expires: self.root.signed.expires,
            }
            .into());
        }
        let new_timestamp = Metadata::<TimestampMetadata>::from_bytes(data)?;
        verify_with_root(&self.root.signed, TIMESTAMP, &new_timestamp)?;

        if let Some(current) = &self.timestamp {
            let (trusted, candidate) = (current.signed.version, new_timestamp.signed.version);
            if candidate < trusted {
                return Err(RepositoryError::BadVersion {
                    role: TIMESTAMP.to_string(),
                    expected: format!(">= {trusted}"),
                    actual: candidate,
                }
                .into());
            }
            if candidate == trusted {
                return Err(RepositoryError::EqualVersion {
                    role: TIMESTAMP.to_string(),
                    version: candidate,
                }
                .into());
            }
            let trusted_snapshot = current.signed.snapshot_meta()?.version;
            let candidate_snapshot = new_timestamp.signed.snapshot_meta()?.version;
            if candidate_snapshot < trusted_snapshot {
                return Err(RepositoryError::BadVersion {
                    role: SNAPSHOT.to_string(),
                    expected: format!(">= {trusted_snapshot}"),
                    actual: candidate_snapshot,
                }
                .into());
            }
        }

        debug!(version = new_timestamp.signed.version, "updated trusted timestamp");
        self.timestamp = Some(new_timestamp);
        self.check_final_timestamp()
    }

    fn update_snapshot(&mut self, data: &[u8], trusted: bool) -> Result<()> {
        let Some(timestamp) = &self.timestamp else {
            return Err(Error::InvalidState(
                "cannot update snapshot before timestamp".to_string(),
            ));
        };
        if self.targets.contains_key(TARGETS) {
            return Err(Error::InvalidState(
                "cannot update snapshot after targets".to_string(),
            ));
        }
        self.check_final_timestamp()?;

        if !trusted {
            timestamp.signed.snapshot_meta()?.verify_length_hashes(data)?;
        }
        let new_snapshot = Metadata::<SnapshotMetadata>::from_bytes(data)?;
        verify_with_root(&self.root.signed, SNAPSHOT, &new_snapshot)?;

        if let Some(current) = &self.snapshot {
            for (name, info) in &current.signed.meta {
                let Some(candidate) = new_snapshot.signed.meta.get(name) else {
                    return Err(RepositoryError::MissingMeta {
                        role: name.trim_end_matches(".json").to_string(),
                        parent: SNAPSHOT.to_string(),
                    }
                    .into());
                };
                if candidate.version < info.version {
                    return Err(RepositoryError::BadVersion {
                        role: name.clone(),
                        expected: format!(">= {}", info.version),
                        actual: candidate.version,
                    }
                    .into());
                }
            }
        }

        debug!(version = new_snapshot.signed.version, "updated trusted snapshot");
        self.snapshot = Some(new_snapshot);
        self.check_final_snapshot()
    }

    fn update_delegated_targets(&mut self, data: &[u8], role: &str, parent: &str) -> Result<()> {
        let Some(snapshot) = &self.snapshot else {
            return Err(Error::InvalidState(
                "cannot load targets before snapshot".to_string(),
            ));
        };
        self.check_final_snapshot()?;

        let delegator = if parent == ROOT {
            None
        } else {
            Some(
                self.targets
                    .get(parent)
                    .ok_or_else(|| {
                        Error::InvalidState(format!("cannot load {role} before delegator {parent}"))
                    })?,
            )
        };

        let meta = snapshot.signed.role_meta(role)?;
        meta.verify_length_hashes(data)?;
        let new_targets = Metadata::<TargetsMetadata>::from_bytes(data)?;
        match delegator {
            None => verify_with_root(&self.root.signed, role, &new_targets)?,
            Some(parent_targets) => verify_with_targets(&parent_targets.signed, role, &new_targets)?,
        }

        if new_targets.signed.version != meta.version {
            return Err(RepositoryError::BadVersion {
                role: role.to_string(),
                expected: meta.version.to_string(),
                actual: new_targets.signed.version,
            }
            .into());
        }
        if new_targets.signed.is_expired(self.reference_time) {
            return Err(RepositoryError::Expired {
                role: role.to_string(),
                expires: new_targets.signed.expires,
            }
            .into());
        }

        debug!(role, version = new_targets.signed.version, "updated trusted targets");
        self.targets.insert(role.to_string(), new_targets);
        Ok(())
    }
}

/// Verifies `delegate` against the keys root assigns to `role`.
fn verify_with_root<T: Role>(
    root: &RootMetadata,
    role: &str,
    delegate: &Metadata<T>,
) -> std::result::Result<(), RepositoryError> {
    let keys = root
        .roles
        .get(role)
        .ok_or_else(|| RepositoryError::MissingMeta {
            role: role.to_string(),
            parent: ROOT.to_string(),
        })?;
    verify_threshold(role, &keys.keyids, keys.threshold, &root.keys, delegate)
}

/// Verifies `delegate` against the delegation `parent` declares for `role`.
fn verify_with_targets<T: Role>(
    parent: &TargetsMetadata,
    role: &str,
    delegate: &Metadata<T>,
) -> std::result::Result<(), RepositoryError> {
    let unknown = || RepositoryError::MissingMeta {
        role: role.to_string(),
        parent: "delegations".to_string(),
    };
    let delegations = parent.delegations.as_ref().ok_or_else(unknown)?;
    let (keyids, threshold) = delegations.role_keys(role).ok_or_else(unknown)?;
    verify_threshold(role, keyids, threshold, &delegations.keys, delegate)
}

/// Counts distinct authorised keys with a valid signature over the canonical
/// payload and compares the count with `threshold`.
fn verify_threshold<T: Role>(
    role: &str,
    keyids: &[String],
    threshold: u64,
    keys: &BTreeMap<String, Key>,
    delegate: &Metadata<T>,
) -> std::result::Result<(), RepositoryError> {
    let message = delegate.canonical_signed()?;
    let mut valid = HashSet::new();
    for keyid in keyids {
        let (Some(key), Some(signature)) = (keys.get(keyid), delegate.signature_for(keyid)) else {
            continue;
        };
        let Ok(sig) = hex::decode(&signature.sig) else {
            debug!(role, keyid, "signature is not valid hex");
            continue;
        };
        match key.verify(&message, &sig) {
            Ok(()) => {
                valid.insert(keyid.as_str());
            }
            Err(err) => debug!(role, keyid, error = %err, "signature did not verify"),
        }
    }
    if (valid.len() as u64) < threshold {
        return Err(RepositoryError::Unsigned {
            role: role.to_string(),
            valid: valid.len(),
            threshold,
        });
    }
    Ok(())
}
