// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public keys and signature verification.
//!
//! Two schemes are supported: `ed25519` with hex-encoded public keys, and
//! `ecdsa-sha2-nistp256` with PEM (or hex SEC1) public keys and DER
//! signatures. Keys of any other type parse fine but never verify.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::RepositoryError;
use crate::metadata::{canonical_json, UnrecognizedFields};

/// Key type and scheme for Ed25519 keys.
pub const ED25519: &str = "ed25519";
/// Key type for ECDSA keys.
pub const ECDSA: &str = "ecdsa";
/// Legacy key type and current scheme name for ECDSA P-256 keys.
pub const ECDSA_SHA2_NISTP256: &str = "ecdsa-sha2-nistp256";

/// Reasons a signature could not be verified.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("unsupported key type {keytype} with scheme {scheme}")]
    Unsupported { keytype: String, scheme: String },
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Public key material as it appears in root and delegation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyVal,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyVal {
    pub public: String,
    #[serde(flatten)]
    pub unrecognized: UnrecognizedFields,
}

impl Key {
    /// Builds an Ed25519 key from its 32 raw public bytes.
    pub fn from_ed25519(public: &[u8; 32]) -> Self {
        Self::with_public(ED25519, ED25519, hex::encode(public))
    }

    /// Builds an ECDSA P-256 key from a PEM `SubjectPublicKeyInfo`.
    pub fn from_ecdsa_pem(pem: &str) -> Self {
        Self::with_public(ECDSA, ECDSA_SHA2_NISTP256, pem.to_string())
    }

    fn with_public(keytype: &str, scheme: &str, public: String) -> Self {
        Self {
            keytype: keytype.to_string(),
            scheme: scheme.to_string(),
            keyval: KeyVal {
                public,
                unrecognized: UnrecognizedFields::new(),
            },
            unrecognized: UnrecognizedFields::new(),
        }
    }

    /// Key ID: hex SHA-256 of the canonical JSON form of the key.
    pub fn key_id(&self) -> Result<String, RepositoryError> {
        let canonical = canonical_json(self)?;
        Ok(hex::encode(Sha256::digest(canonical)))
    }

    /// Verifies `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        match (self.keytype.as_str(), self.scheme.as_str()) {
            (ED25519, ED25519) => self.verify_ed25519(message, signature),
            (ECDSA | ECDSA_SHA2_NISTP256, ECDSA_SHA2_NISTP256) => {
                self.verify_ecdsa_p256(message, signature)
            }
            (keytype, scheme) => Err(KeyError::Unsupported {
                keytype: keytype.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }

    fn verify_ed25519(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        let raw = hex::decode(self.keyval.public.trim())
            .map_err(|err| KeyError::InvalidPublicKey(err.to_string()))?;
        let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
            KeyError::InvalidPublicKey(format!("expected 32 bytes, got {}", raw.len()))
        })?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|err| KeyError::InvalidPublicKey(err.to_string()))?;
        let signature = ed25519_dalek::Signature::from_slice(signature)
            .map_err(|err| KeyError::InvalidSignature(err.to_string()))?;
        key.verify_strict(message, &signature)
            .map_err(|_| KeyError::VerificationFailed)
    }

    fn verify_ecdsa_p256(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        use p256::ecdsa::signature::Verifier;
        use p256::ecdsa::{Signature, VerifyingKey};
        use p256::pkcs8::DecodePublicKey;

        let public = self.keyval.public.trim();
        let key = if public.starts_with("-----BEGIN") {
            VerifyingKey::from_public_key_pem(public)
                .map_err(|err| KeyError::InvalidPublicKey(err.to_string()))?
        } else {
            let raw =
                hex::decode(public).map_err(|err| KeyError::InvalidPublicKey(err.to_string()))?;
            VerifyingKey::from_sec1_bytes(&raw)
                .map_err(|err| KeyError::InvalidPublicKey(err.to_string()))?
        };
        // DER is the TUF encoding; fixed-width r||s shows up from some signers.
        let signature = Signature::from_der(signature)
            .or_else(|_| Signature::from_slice(signature))
            .map_err(|err| KeyError::InvalidSignature(err.to_string()))?;
        key.verify(message, &signature)
            .map_err(|_| KeyError::VerificationFailed)
    }
}
