// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]

//! In-memory TUF repository used by the unit tests.
//!
//! The simulator owns the payloads of every role plus one Ed25519 key per
//! role, signs on demand and serves the signed bytes through [`SimFetcher`].
//! Tests mutate the payloads directly, then call [`RepositorySimulator::publish`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

use crate::config::UpdaterConfig;
use crate::fetcher::{FetchError, Fetcher};
use crate::keys::Key;
use crate::metadata::{
    meta_name, DelegatedRole, Delegations, MetaFile, Metadata, Role, RootMetadata,
    SnapshotMetadata, SuccinctRoles, TargetFile, TargetsMetadata, TimestampMetadata,
    UnrecognizedFields, ROOT, SNAPSHOT, TARGETS, TIMESTAMP,
};

pub(crate) const METADATA_URL: &str = "https://repo.test/metadata";
pub(crate) const TARGETS_URL: &str = "https://repo.test/targets";

/// Fetcher answering from a shared URL map and recording every request.
#[derive(Debug, Clone, Default)]
pub(crate) struct SimFetcher {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Fetcher for SimFetcher {
    async fn download_file(
        &self,
        url: &str,
        max_length: u64,
        _prior_attempts: u32,
    ) -> Result<Vec<u8>, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        let files = self.files.lock().unwrap();
        let data = files
            .get(url)
            .ok_or_else(|| FetchError::NotFound(url.to_string()))?;
        if data.len() as u64 > max_length {
            return Err(FetchError::LengthExceeded {
                url: url.to_string(),
                max_length,
            });
        }
        Ok(data.clone())
    }
}

pub(crate) struct RepositorySimulator {
    pub root: RootMetadata,
    pub timestamp: TimestampMetadata,
    pub snapshot: SnapshotMetadata,
    pub targets: TargetsMetadata,
    pub delegates: BTreeMap<String, TargetsMetadata>,
    signers: HashMap<String, Vec<SigningKey>>,
    initial_root: Vec<u8>,
    next_seed: u8,
    fetcher: SimFetcher,
}

fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap()
}

fn public_key(signer: &SigningKey) -> Key {
    Key::from_ed25519(&signer.verifying_key().to_bytes())
}

fn sign<T: Role + Clone>(payload: &T, signers: &[SigningKey]) -> Vec<u8> {
    let mut metadata = Metadata::new(payload.clone());
    let message = metadata.canonical_signed().unwrap();
    for signer in signers {
        metadata.signatures.push(crate::metadata::Signature {
            keyid: public_key(signer).key_id().unwrap(),
            sig: hex::encode(signer.sign(&message).to_bytes()),
            unrecognized: UnrecognizedFields::new(),
        });
    }
    metadata.to_bytes().unwrap()
}

impl RepositorySimulator {
    /// Repository at root v1 with every other role at v1 and no targets.
    pub fn new() -> Self {
        let expires = far_future();
        let mut root = RootMetadata::new(expires);
        root.consistent_snapshot = false;

        let mut sim = Self {
            root,
            timestamp: TimestampMetadata::new(expires),
            snapshot: SnapshotMetadata::new(expires),
            targets: TargetsMetadata::new(expires),
            delegates: BTreeMap::new(),
            signers: HashMap::new(),
            initial_root: Vec::new(),
            next_seed: 1,
            fetcher: SimFetcher::default(),
        };
        for role in [ROOT, TIMESTAMP, SNAPSHOT, TARGETS] {
            let signer = sim.new_signer();
            sim.root.add_key(public_key(&signer), role).unwrap();
            sim.signers.insert(role.to_string(), vec![signer]);
        }
        sim.initial_root = sim.signed_root();
        sim.serve(&format!("{METADATA_URL}/1.root.json"), sim.initial_root.clone());
        sim.publish();
        sim
    }

    fn new_signer(&mut self) -> SigningKey {
        let signer = SigningKey::from_bytes(&[self.next_seed; 32]);
        self.next_seed += 1;
        signer
    }

    fn signers(&self, role: &str) -> &[SigningKey] {
        self.signers.get(role).map(Vec::as_slice).unwrap_or_default()
    }

    /// Bytes of the v1 root, the client's initial trust anchor.
    pub fn trusted_root(&self) -> Vec<u8> {
        self.initial_root.clone()
    }

    pub fn signed_root(&self) -> Vec<u8> {
        sign(&self.root, self.signers(ROOT))
    }

    pub fn signed_timestamp(&self) -> Vec<u8> {
        sign(&self.timestamp, self.signers(TIMESTAMP))
    }

    pub fn signed_snapshot(&self) -> Vec<u8> {
        sign(&self.snapshot, self.signers(SNAPSHOT))
    }

    pub fn signed_targets(&self) -> Vec<u8> {
        sign(&self.targets, self.signers(TARGETS))
    }

    pub fn signed_delegate(&self, name: &str) -> Vec<u8> {
        self.sign_delegate_with(name, name)
    }

    /// Signs delegate `name` with the keys of `signer_role`.
    pub fn sign_delegate_with(&self, name: &str, signer_role: &str) -> Vec<u8> {
        sign(&self.delegates[name], self.signers(signer_role))
    }

    /// Publishes root `version + 1`, signed by the current and the next root
    /// keys. With `replace_key` the root key is swapped for a fresh one.
    pub fn rotate_root(&mut self, replace_key: bool) -> Vec<u8> {
        self.root.version += 1;
        let mut signing = self.signers(ROOT).to_vec();
        if replace_key {
            let old_ids = self.root.roles[ROOT].keyids.clone();
            for keyid in old_ids {
                self.root.revoke_key(&keyid, ROOT).unwrap();
            }
            let signer = self.new_signer();
            self.root.add_key(public_key(&signer), ROOT).unwrap();
            signing.push(signer.clone());
            self.signers.insert(ROOT.to_string(), vec![signer]);
        }
        let bytes = sign(&self.root, &signing);
        self.serve(
            &format!("{METADATA_URL}/{}.root.json", self.root.version),
            bytes.clone(),
        );
        bytes
    }

    /// Re-signs and serves every non-root role, refreshing the `meta`
    /// references first. Versions are left as the test set them.
    pub fn publish(&mut self) {
        self.snapshot
            .meta
            .insert(meta_name(TARGETS), MetaFile::new(self.targets.version));
        let delegated: Vec<(String, u64)> = self
            .delegates
            .iter()
            .map(|(name, targets)| (name.clone(), targets.version))
            .collect();
        for (name, version) in &delegated {
            self.snapshot
                .meta
                .insert(meta_name(name), MetaFile::new(*version));
        }

        let snapshot = self.signed_snapshot();
        self.timestamp.meta.insert(
            meta_name(SNAPSHOT),
            MetaFile::with_content(self.snapshot.version, &snapshot),
        );

        for (name, version) in &delegated {
            let bytes = self.signed_delegate(name);
            self.serve(&self.metadata_url(name, *version), bytes);
        }
        let targets = self.signed_targets();
        self.serve(&self.metadata_url(TARGETS, self.targets.version), targets);
        self.serve(&self.metadata_url(SNAPSHOT, self.snapshot.version), snapshot);
        self.serve(
            &format!("{METADATA_URL}/timestamp.json"),
            self.signed_timestamp(),
        );
    }

    fn metadata_url(&self, role: &str, version: u64) -> String {
        if self.root.consistent_snapshot {
            format!("{METADATA_URL}/{version}.{role}.json")
        } else {
            format!("{METADATA_URL}/{role}.json")
        }
    }

    /// Lists `data` at `path` in `role` and serves it both plainly and under
    /// its hash-prefixed name.
    pub fn add_target(&mut self, role: &str, path: &str, data: &[u8]) {
        let target = TargetFile::from_data(path, data);
        let digest = hex::encode(Sha256::digest(data));
        self.role_mut(role).targets.insert(path.to_string(), target);

        let prefixed = match path.rsplit_once('/') {
            Some((dir, base)) => format!("{dir}/{digest}.{base}"),
            None => format!("{digest}.{path}"),
        };
        self.serve(&format!("{TARGETS_URL}/{path}"), data.to_vec());
        self.serve(&format!("{TARGETS_URL}/{prefixed}"), data.to_vec());
    }

    /// Adds a path-pattern delegation from `parent` to `name`.
    ///
    /// A role keeps its key across delegations, so the same role can be
    /// delegated to from several parents (cycles included).
    pub fn add_delegation(&mut self, parent: &str, name: &str, paths: &[&str], terminating: bool) {
        if !self.signers.contains_key(name) {
            let signer = self.new_signer();
            self.signers.insert(name.to_string(), vec![signer]);
        }
        let key = public_key(&self.signers(name)[0]);
        let keyid = key.key_id().unwrap();

        let delegations = self
            .role_mut(parent)
            .delegations
            .get_or_insert_with(|| Delegations {
                keys: BTreeMap::new(),
                roles: Some(Vec::new()),
                succinct_roles: None,
                unrecognized: UnrecognizedFields::new(),
            });
        delegations.keys.insert(keyid.clone(), key);
        delegations
            .roles
            .get_or_insert_with(Vec::new)
            .push(DelegatedRole {
                name: name.to_string(),
                keyids: vec![keyid],
                threshold: 1,
                terminating,
                paths: Some(paths.iter().map(|p| p.to_string()).collect()),
                path_hash_prefixes: None,
                unrecognized: UnrecognizedFields::new(),
            });
        self.delegates
            .entry(name.to_string())
            .or_insert_with(|| TargetsMetadata::new(far_future()));
    }

    /// Delegates everything from top-level targets to `2^bit_length` bins
    /// sharing one key.
    pub fn add_succinct_delegation(&mut self, bit_length: u32, name_prefix: &str) {
        let signer = self.new_signer();
        let key = public_key(&signer);
        let keyid = key.key_id().unwrap();
        let succinct = SuccinctRoles {
            keyids: vec![keyid.clone()],
            threshold: 1,
            bit_length,
            name_prefix: name_prefix.to_string(),
            unrecognized: UnrecognizedFields::new(),
        };
        for bin in succinct.roles() {
            self.signers.insert(bin.clone(), vec![signer.clone()]);
            self.delegates
                .insert(bin, TargetsMetadata::new(far_future()));
        }
        self.targets.delegations = Some(Delegations {
            keys: BTreeMap::from([(keyid, key)]),
            roles: None,
            succinct_roles: Some(succinct),
            unrecognized: UnrecognizedFields::new(),
        });
    }

    fn role_mut(&mut self, role: &str) -> &mut TargetsMetadata {
        if role == TARGETS {
            &mut self.targets
        } else {
            self.delegates.get_mut(role).unwrap()
        }
    }

    /// Serves `data` at `url`, replacing anything served there.
    pub fn serve(&self, url: &str, data: Vec<u8>) {
        self.fetcher
            .files
            .lock()
            .unwrap()
            .insert(url.to_string(), data);
    }

    pub fn fetcher(&self) -> Arc<SimFetcher> {
        Arc::new(self.fetcher.clone())
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.fetcher.requests.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.fetcher.requests.lock().unwrap().clear();
    }

    /// Client configuration caching under `dir`.
    pub fn config(&self, dir: &Path) -> UpdaterConfig {
        UpdaterConfig::with_fetcher(METADATA_URL, self.trusted_root(), self.fetcher())
            .with_targets_url(TARGETS_URL)
            .with_metadata_dir(dir.join("metadata"))
            .with_targets_dir(dir.join("targets"))
    }
}
