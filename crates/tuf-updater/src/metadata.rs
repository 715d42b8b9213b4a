// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! TUF metadata documents.
//!
//! Every document is a signed envelope (`{"signed": ..., "signatures": [...]}`)
//! around one of four payload shapes. The payload type is a static parameter of
//! [`Metadata`], so a snapshot can never be handed to code expecting a root.
//! Members that this crate does not understand are kept in an
//! `unrecognized` map on each struct and written back untouched, which keeps
//! signatures valid across schema additions.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use olpc_cjson::CanonicalFormatter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};

use crate::error::RepositoryError;
use crate::keys::Key;

/// Name of the root role.
pub const ROOT: &str = "root";
/// Name of the timestamp role.
pub const TIMESTAMP: &str = "timestamp";
/// Name of the snapshot role.
pub const SNAPSHOT: &str = "snapshot";
/// Name of the top-level targets role.
pub const TARGETS: &str = "targets";

/// Spec version stamped on metadata built through the constructors below.
pub const SPEC_VERSION: &str = "1.0.31";

const TOP_LEVEL_ROLES: [&str; 4] = [ROOT, TIMESTAMP, SNAPSHOT, TARGETS];

/// JSON members preserved verbatim for forward compatibility.
pub type UnrecognizedFields = BTreeMap<String, Value>;

/// Discriminant for the four payload shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleType {
    Root,
    Timestamp,
    Snapshot,
    Targets,
}

impl RoleType {
    /// Returns the `_type` tag used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::Root => ROOT,
            RoleType::Timestamp => TIMESTAMP,
            RoleType::Snapshot => SNAPSHOT,
            RoleType::Targets => TARGETS,
        }
    }
}

impl std::fmt::Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour shared by all signed payloads.
pub trait Role: Serialize + DeserializeOwned {
    /// Wire tag this payload must carry.
    const TYPE: RoleType;

    /// The `_type` value found in the document.
    fn type_tag(&self) -> &str;

    fn version(&self) -> u64;

    fn expires(&self) -> DateTime<Utc>;

    /// Checks invariants that serde alone cannot express.
    fn validate(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    /// Whether the payload has expired relative to `reference`.
    fn is_expired(&self, reference: DateTime<Utc>) -> bool {
        reference > self.expires()
    }
}

macro_rules! impl_role {
    ($ty:ty, $role:expr) => {
        impl Role for $ty {
            const TYPE: RoleType = $role;

            fn type_tag(&self) -> &str {
                &self.type_tag
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn expires(&self) -> DateTime<Utc> {
                self.expires
            }

            fn validate(&self) -> Result<(), RepositoryError> {
                <$ty>::check(self)
            }
        }
    };
}

/// Serialises expiry timestamps as `YYYY-MM-DDTHH:MM:SSZ`.
mod expiry {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format("%Y-%m-%dT%H:%M:%SZ").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// A single signature over the canonical form of `signed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    /// Hex-encoded signature bytes.
    pub sig: String,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

/// Signed envelope around a role payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata<T> {
    pub signed: T,
    pub signatures: Vec<Signature>,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

impl<T: Role> Metadata<T> {
    /// Wraps a payload in an envelope with no signatures.
    pub fn new(signed: T) -> Self {
        Self {
            signed,
            signatures: Vec::new(),
            unrecognized: UnrecognizedFields::new(),
        }
    }

    /// Parses raw bytes and checks the structural invariants of the role.
    ///
    /// This does not verify signatures; that is the trusted set's job since
    /// it depends on which keys are currently trusted.
    pub fn from_bytes(data: &[u8]) -> Result<Self, RepositoryError> {
        let metadata: Self = serde_json::from_slice(data)?;
        if metadata.signed.type_tag() != T::TYPE.as_str() {
            return Err(RepositoryError::BadType {
                expected: T::TYPE.to_string(),
                actual: metadata.signed.type_tag().to_string(),
            });
        }
        let mut seen = HashSet::new();
        for signature in &metadata.signatures {
            if !seen.insert(signature.keyid.as_str()) {
                return Err(RepositoryError::Malformed(format!(
                    "multiple signatures found for keyid {}",
                    signature.keyid
                )));
            }
        }
        metadata.signed.validate()?;
        Ok(metadata)
    }

    /// Serialises the envelope as JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RepositoryError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Canonical JSON of the `signed` payload, i.e. the bytes covered by signatures.
    pub fn canonical_signed(&self) -> Result<Vec<u8>, RepositoryError> {
        Ok(canonical_json(&self.signed)?)
    }

    /// Returns the signature made by `keyid`, if any.
    pub fn signature_for(&self, keyid: &str) -> Option<&Signature> {
        self.signatures.iter().find(|sig| sig.keyid == keyid)
    }
}

/// Encodes `value` as OLPC canonical JSON.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter::new());
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Threshold and key IDs for one top-level role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u64,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

/// Payload of `root.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootMetadata {
    #[serde(rename = "_type")]
    pub type_tag: String,
    pub spec_version: String,
    pub version: u64,
    #[serde(with = "expiry")]
    pub expires: DateTime<Utc>,
    pub keys: BTreeMap<String, Key>,
    pub roles: BTreeMap<String, RoleKeys>,
    #[serde(default)]
    pub consistent_snapshot: bool,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

impl RootMetadata {
    /// Builds version 1 of a root with empty top-level roles (threshold 1).
    pub fn new(expires: DateTime<Utc>) -> Self {
        let roles = TOP_LEVEL_ROLES
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    RoleKeys {
                        keyids: Vec::new(),
                        threshold: 1,
                        unrecognized: UnrecognizedFields::new(),
                    },
                )
            })
            .collect();
        Self {
            type_tag: ROOT.to_string(),
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
            keys: BTreeMap::new(),
            roles,
            consistent_snapshot: true,
            unrecognized: UnrecognizedFields::new(),
        }
    }

    /// Adds `key` to the key map and authorises it for `role`.
    pub fn add_key(&mut self, key: Key, role: &str) -> Result<(), RepositoryError> {
        let keyid = key.key_id()?;
        let entry = self
            .roles
            .get_mut(role)
            .ok_or_else(|| RepositoryError::Malformed(format!("role {role} does not exist")))?;
        if !entry.keyids.contains(&keyid) {
            entry.keyids.push(keyid.clone());
        }
        self.keys.insert(keyid, key);
        Ok(())
    }

    /// Removes `keyid` from `role`; the key itself is dropped once unused.
    pub fn revoke_key(&mut self, keyid: &str, role: &str) -> Result<(), RepositoryError> {
        let entry = self
            .roles
            .get_mut(role)
            .ok_or_else(|| RepositoryError::Malformed(format!("role {role} does not exist")))?;
        entry.keyids.retain(|id| id != keyid);
        if !self.roles.values().any(|r| r.keyids.iter().any(|id| id == keyid)) {
            self.keys.remove(keyid);
        }
        Ok(())
    }

    fn check(&self) -> Result<(), RepositoryError> {
        for name in TOP_LEVEL_ROLES {
            if !self.roles.contains_key(name) {
                return Err(RepositoryError::Malformed(format!(
                    "root is missing the {name} role"
                )));
            }
        }
        for (name, role) in &self.roles {
            if role.threshold == 0 {
                return Err(RepositoryError::Malformed(format!(
                    "role {name} has a zero threshold"
                )));
            }
            if let Some(missing) = role.keyids.iter().find(|id| !self.keys.contains_key(*id)) {
                return Err(RepositoryError::Malformed(format!(
                    "role {name} references unknown keyid {missing}"
                )));
            }
        }
        Ok(())
    }
}

impl_role!(RootMetadata, RoleType::Root);

/// Expected version (and optionally length and hashes) of a metadata file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

impl MetaFile {
    /// Reference carrying only a version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            length: None,
            hashes: None,
            unrecognized: UnrecognizedFields::new(),
        }
    }

    /// Reference pinning the length and SHA-256 of `data`.
    pub fn with_content(version: u64, data: &[u8]) -> Self {
        let mut hashes = BTreeMap::new();
        hashes.insert("sha256".to_string(), hex::encode(Sha256::digest(data)));
        Self {
            version,
            length: Some(data.len() as u64),
            hashes: Some(hashes),
            unrecognized: UnrecognizedFields::new(),
        }
    }

    /// Checks `data` against whichever of length and hashes are declared.
    pub fn verify_length_hashes(&self, data: &[u8]) -> Result<(), RepositoryError> {
        if let Some(length) = self.length {
            verify_length(data, length)?;
        }
        if let Some(hashes) = &self.hashes {
            verify_hashes(data, hashes)?;
        }
        Ok(())
    }
}

/// Payload of `timestamp.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampMetadata {
    #[serde(rename = "_type")]
    pub type_tag: String,
    pub spec_version: String,
    pub version: u64,
    #[serde(with = "expiry")]
    pub expires: DateTime<Utc>,
    pub meta: BTreeMap<String, MetaFile>,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

impl TimestampMetadata {
    pub fn new(expires: DateTime<Utc>) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert(meta_name(SNAPSHOT), MetaFile::new(1));
        Self {
            type_tag: TIMESTAMP.to_string(),
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
            meta,
            unrecognized: UnrecognizedFields::new(),
        }
    }

    /// The reference to the current snapshot.
    pub fn snapshot_meta(&self) -> Result<&MetaFile, RepositoryError> {
        self.meta
            .get(&meta_name(SNAPSHOT))
            .ok_or_else(|| RepositoryError::MissingMeta {
                role: SNAPSHOT.to_string(),
                parent: TIMESTAMP.to_string(),
            })
    }

    fn check(&self) -> Result<(), RepositoryError> {
        self.snapshot_meta()?;
        if self.meta.len() != 1 {
            return Err(RepositoryError::Malformed(
                "timestamp must reference exactly one snapshot".to_string(),
            ));
        }
        Ok(())
    }
}

impl_role!(TimestampMetadata, RoleType::Timestamp);

/// Payload of `snapshot.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(rename = "_type")]
    pub type_tag: String,
    pub spec_version: String,
    pub version: u64,
    #[serde(with = "expiry")]
    pub expires: DateTime<Utc>,
    pub meta: BTreeMap<String, MetaFile>,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

impl SnapshotMetadata {
    pub fn new(expires: DateTime<Utc>) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert(meta_name(TARGETS), MetaFile::new(1));
        Self {
            type_tag: SNAPSHOT.to_string(),
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
            meta,
            unrecognized: UnrecognizedFields::new(),
        }
    }

    /// The reference to targets role `role`.
    pub fn role_meta(&self, role: &str) -> Result<&MetaFile, RepositoryError> {
        self.meta
            .get(&meta_name(role))
            .ok_or_else(|| RepositoryError::MissingMeta {
                role: role.to_string(),
                parent: SNAPSHOT.to_string(),
            })
    }

    fn check(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

impl_role!(SnapshotMetadata, RoleType::Snapshot);

/// Description of a single artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetFile {
    pub length: u64,
    pub hashes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
    /// Logical path; filled from the map key when looked up.
    #[serde(skip)]
    pub path: String,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

impl TargetFile {
    /// Describes `data` at `path` with its length and SHA-256.
    pub fn from_data(path: &str, data: &[u8]) -> Self {
        let mut hashes = BTreeMap::new();
        hashes.insert("sha256".to_string(), hex::encode(Sha256::digest(data)));
        Self {
            length: data.len() as u64,
            hashes,
            custom: None,
            path: path.to_string(),
            unrecognized: UnrecognizedFields::new(),
        }
    }

    /// Checks `data` against the declared length and every declared hash.
    pub fn verify_length_hashes(&self, data: &[u8]) -> Result<(), RepositoryError> {
        verify_length(data, self.length)?;
        verify_hashes(data, &self.hashes)
    }
}

/// Payload of `targets.json` and of every delegated targets role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetsMetadata {
    #[serde(rename = "_type")]
    pub type_tag: String,
    pub spec_version: String,
    pub version: u64,
    #[serde(with = "expiry")]
    pub expires: DateTime<Utc>,
    pub targets: BTreeMap<String, TargetFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

impl TargetsMetadata {
    pub fn new(expires: DateTime<Utc>) -> Self {
        Self {
            type_tag: TARGETS.to_string(),
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
            targets: BTreeMap::new(),
            delegations: None,
            unrecognized: UnrecognizedFields::new(),
        }
    }

    /// Looks up `path` and returns a copy with its logical path filled in.
    pub fn target(&self, path: &str) -> Option<TargetFile> {
        self.targets.get(path).map(|target| {
            let mut target = target.clone();
            target.path = path.to_string();
            target
        })
    }

    fn check(&self) -> Result<(), RepositoryError> {
        match &self.delegations {
            Some(delegations) => delegations.check(),
            None => Ok(()),
        }
    }
}

impl_role!(TargetsMetadata, RoleType::Targets);

/// Delegation block of a targets role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegations {
    pub keys: BTreeMap<String, Key>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<DelegatedRole>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succinct_roles: Option<SuccinctRoles>,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

impl Delegations {
    /// Child roles responsible for `target_path`, in declaration order.
    ///
    /// Each entry carries the role name and whether the delegation is
    /// terminating. Succinct delegations yield exactly one bin.
    pub fn roles_for_target(&self, target_path: &str) -> Vec<(String, bool)> {
        if let Some(roles) = &self.roles {
            return roles
                .iter()
                .filter(|role| role.is_delegated_path(target_path))
                .map(|role| (role.name.clone(), role.terminating))
                .collect();
        }
        if let Some(succinct) = &self.succinct_roles {
            return vec![(succinct.role_for_target(target_path), true)];
        }
        Vec::new()
    }

    /// Key IDs and threshold authorised for the delegated role `name`.
    pub fn role_keys(&self, name: &str) -> Option<(&[String], u64)> {
        if let Some(roles) = &self.roles {
            return roles
                .iter()
                .find(|role| role.name == name)
                .map(|role| (role.keyids.as_slice(), role.threshold));
        }
        match &self.succinct_roles {
            Some(succinct) if succinct.is_delegated_role(name) => {
                Some((succinct.keyids.as_slice(), succinct.threshold))
            }
            _ => None,
        }
    }

    fn check(&self) -> Result<(), RepositoryError> {
        match (&self.roles, &self.succinct_roles) {
            (Some(roles), None) => {
                let mut names = HashSet::new();
                for role in roles {
                    if TOP_LEVEL_ROLES.contains(&role.name.as_str()) {
                        return Err(RepositoryError::Malformed(format!(
                            "delegated role name {} is reserved",
                            role.name
                        )));
                    }
                    if !names.insert(role.name.as_str()) {
                        return Err(RepositoryError::Malformed(format!(
                            "delegated role {} is declared twice",
                            role.name
                        )));
                    }
                    if role.paths.is_some() && role.path_hash_prefixes.is_some() {
                        return Err(RepositoryError::Malformed(format!(
                            "delegated role {} sets both paths and path_hash_prefixes",
                            role.name
                        )));
                    }
                }
                Ok(())
            }
            (None, Some(succinct)) => {
                if !(1..=32).contains(&succinct.bit_length) {
                    return Err(RepositoryError::Malformed(format!(
                        "succinct bit_length {} is outside 1..=32",
                        succinct.bit_length
                    )));
                }
                Ok(())
            }
            _ => Err(RepositoryError::Malformed(
                "delegations must set exactly one of roles and succinct_roles".to_string(),
            )),
        }
    }
}

/// A named delegation with its own keys, threshold and path constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedRole {
    pub name: String,
    pub keyids: Vec<String>,
    pub threshold: u64,
    #[serde(default)]
    pub terminating: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_hash_prefixes: Option<Vec<String>>,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

impl DelegatedRole {
    /// Whether this delegation covers `target_path`.
    pub fn is_delegated_path(&self, target_path: &str) -> bool {
        if let Some(patterns) = &self.paths {
            return patterns
                .iter()
                .any(|pattern| path_matches_pattern(target_path, pattern));
        }
        if let Some(prefixes) = &self.path_hash_prefixes {
            let digest = hex::encode(Sha256::digest(target_path.as_bytes()));
            return prefixes.iter().any(|prefix| digest.starts_with(prefix.as_str()));
        }
        false
    }
}

/// Matches a target path against a delegation path pattern.
///
/// A pattern ending in `/` covers everything below that directory. Otherwise
/// both sides are split on `/`, must have the same number of segments, and
/// each segment is matched with shell wildcards (`*`, `?`, `[...]`).
fn path_matches_pattern(target_path: &str, pattern: &str) -> bool {
    if pattern.ends_with('/') {
        return target_path.starts_with(pattern);
    }
    let targets: Vec<&str> = target_path.split('/').collect();
    let patterns: Vec<&str> = pattern.split('/').collect();
    if targets.len() != patterns.len() {
        return false;
    }
    targets.iter().zip(patterns.iter()).all(|(segment, glob)| {
        glob::Pattern::new(glob)
            .map(|compiled| compiled.matches(segment))
            .unwrap_or(false)
    })
}

/// Compact delegation to `2^bit_length` hash bins sharing one key set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccinctRoles {
    pub keyids: Vec<String>,
    pub threshold: u64,
    pub bit_length: u32,
    pub name_prefix: String,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

impl SuccinctRoles {
    fn bin_count(&self) -> u64 {
        1u64 << self.bit_length
    }

    /// Width of the zero-padded hex suffix in bin names.
    pub fn suffix_len(&self) -> usize {
        format!("{:x}", self.bin_count() - 1).len()
    }

    /// Name of the bin responsible for `target_path`.
    pub fn role_for_target(&self, target_path: &str) -> String {
        let digest = Sha256::digest(target_path.as_bytes());
        let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let shift = 32 - self.bit_length.min(32);
        let bin = if shift == 32 { 0 } else { prefix >> shift };
        self.bin_name(u64::from(bin))
    }

    /// Every bin name, in ascending order.
    pub fn roles(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.bin_count()).map(|bin| self.bin_name(bin))
    }

    /// Whether `name` is one of the bins of this delegation.
    pub fn is_delegated_role(&self, name: &str) -> bool {
        let Some(suffix) = name
            .strip_prefix(self.name_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
        else {
            return false;
        };
        if suffix.len() != self.suffix_len() || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }
        u64::from_str_radix(suffix, 16)
            .map(|bin| bin < self.bin_count())
            .unwrap_or(false)
    }

    fn bin_name(&self, bin: u64) -> String {
        format!(
            "{}-{:0width$x}",
            self.name_prefix,
            bin,
            width = self.suffix_len()
        )
    }
}

/// File name used for `role` inside snapshot/timestamp `meta` maps.
pub fn meta_name(role: &str) -> String {
    format!("{role}.json")
}

fn verify_length(data: &[u8], expected: u64) -> Result<(), RepositoryError> {
    let actual = data.len() as u64;
    if actual != expected {
        return Err(RepositoryError::LengthOrHashMismatch(format!(
            "length verification failed: expected {expected}, got {actual}"
        )));
    }
    Ok(())
}

fn verify_hashes(data: &[u8], hashes: &BTreeMap<String, String>) -> Result<(), RepositoryError> {
    for (algorithm, expected) in hashes {
        let computed = match algorithm.as_str() {
            "sha256" => Sha256::digest(data).to_vec(),
            "sha512" => Sha512::digest(data).to_vec(),
            other => {
                return Err(RepositoryError::LengthOrHashMismatch(format!(
                    "hash verification failed: unsupported algorithm {other}"
                )))
            }
        };
        let matches = hex::decode(expected)
            .map(|expected| expected == computed)
            .unwrap_or(false);
        if !matches {
            return Err(RepositoryError::LengthOrHashMismatch(format!(
                "hash verification failed: {algorithm} mismatch"
            )));
        }
    }
    Ok(())
}
