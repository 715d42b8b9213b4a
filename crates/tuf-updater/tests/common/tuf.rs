// Minimal TUF signing helpers shared across tests.
//
// A single Ed25519 key signs every top-level role, which is all the HTTP
// scenarios need. Payloads are built from the crate's own metadata types so
// the bytes served match what a real repository would publish.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use tuf_updater::metadata::{
    meta_name, MetaFile, Metadata, Role, RootMetadata, Signature, SnapshotMetadata, TargetFile,
    TargetsMetadata, TimestampMetadata, UnrecognizedFields, ROOT, SNAPSHOT, TARGETS, TIMESTAMP,
};
use tuf_updater::Key;

/// Simplified target descriptor used by the signing helpers.
pub struct TargetData<'a> {
    pub path: &'a str,
    pub payload: &'a [u8],
}

/// Signed repository served by the integration tests.
pub struct RepoFixture {
    pub root: RootMetadata,
    pub timestamp: TimestampMetadata,
    pub snapshot: SnapshotMetadata,
    pub targets: TargetsMetadata,
    key: SigningKey,
}

fn expires() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap()
}

/// Hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

impl RepoFixture {
    /// Root v1 with consistent snapshots; every other role at `version`.
    pub fn new(version: u64, targets: &[TargetData<'_>]) -> Self {
        let key = SigningKey::from_bytes(&[42u8; 32]);
        let public = Key::from_ed25519(&key.verifying_key().to_bytes());

        let mut root = RootMetadata::new(expires());
        for role in [ROOT, TIMESTAMP, SNAPSHOT, TARGETS] {
            root.add_key(public.clone(), role).unwrap();
        }

        let mut targets_meta = TargetsMetadata::new(expires());
        targets_meta.version = version;
        for target in targets {
            targets_meta.targets.insert(
                target.path.to_string(),
                TargetFile::from_data(target.path, target.payload),
            );
        }

        let mut snapshot = SnapshotMetadata::new(expires());
        snapshot.version = version;
        snapshot
            .meta
            .insert(meta_name(TARGETS), MetaFile::new(version));

        let mut fixture = Self {
            root,
            timestamp: TimestampMetadata::new(expires()),
            snapshot,
            targets: targets_meta,
            key,
        };
        fixture.timestamp.version = version;
        fixture.refresh_timestamp_meta();
        fixture
    }

    /// Points the timestamp at the current snapshot bytes.
    pub fn refresh_timestamp_meta(&mut self) {
        let snapshot = self.snapshot_bytes();
        self.timestamp.meta.insert(
            meta_name(SNAPSHOT),
            MetaFile::with_content(self.snapshot.version, &snapshot),
        );
    }

    /// Bumps the root version and returns the newly signed root.
    pub fn rotate_root(&mut self) -> Vec<u8> {
        self.root.version += 1;
        self.root_bytes()
    }

    pub fn root_bytes(&self) -> Vec<u8> {
        self.sign(&self.root)
    }

    pub fn timestamp_bytes(&self) -> Vec<u8> {
        self.sign(&self.timestamp)
    }

    pub fn snapshot_bytes(&self) -> Vec<u8> {
        self.sign(&self.snapshot)
    }

    pub fn targets_bytes(&self) -> Vec<u8> {
        self.sign(&self.targets)
    }

    fn sign<T: Role + Clone>(&self, payload: &T) -> Vec<u8> {
        let mut metadata = Metadata::new(payload.clone());
        let message = metadata.canonical_signed().unwrap();
        let keyid = Key::from_ed25519(&self.key.verifying_key().to_bytes())
            .key_id()
            .unwrap();
        metadata.signatures.push(Signature {
            keyid,
            sig: hex::encode(self.key.sign(&message).to_bytes()),
            unrecognized: UnrecognizedFields::new(),
        });
        metadata.to_bytes().unwrap()
    }
}
