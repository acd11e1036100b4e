// src/models/did.rs
//! Decentralized Identifier (DID) data model.
//!
//! Only the parts of a DID that the publication pipeline reads or writes live
//! here: the locally stored [`DidRecord`] with its private keys, and the slice of a
//! resolved DID Document needed to find the master signing key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fragment that marks the master verification method of a DID Document.
pub const MASTER_KEY_FRAGMENT: &str = "#master";

/// Publication status of a locally created DID.
///
/// `Publishing` is never written to the record store. It is reported while a
/// publish is in flight and falls back to the persisted status afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DidStatus {
    Unpublished,
    Publishing,
    Published,
    Deactivated,
}

impl fmt::Display for DidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DidStatus::Unpublished => "unpublished",
            DidStatus::Publishing => "publishing",
            DidStatus::Published => "published",
            DidStatus::Deactivated => "deactivated",
        };
        f.write_str(s)
    }
}

/// A private key held by the local key store.
///
/// Immutable once created. `raw` is the secret scalar; it is skipped by `Debug`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateKeyHandle {
    /// Key-type tag, e.g. "master0"
    pub recovery_id: String,
    #[serde(with = "hex::serde")]
    pub raw: Vec<u8>,
    pub index: u32,
    pub uuid: String,
}

impl fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyHandle")
            .field("recovery_id", &self.recovery_id)
            .field("index", &self.index)
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

/// A DID as held by the local record store.
///
/// # Fields
/// - `did`: full identifier, e.g. `did:prism:4a5b...`
/// - `alias`: user-chosen label
/// - `method`: DID method name, e.g. `prism`
/// - `status`: the only field the publication pipeline mutates
/// - `keys`: private keys created for this DID, in creation order
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DidRecord {
    pub did: String,
    pub alias: String,
    pub method: String,
    pub status: DidStatus,
    #[serde(default)]
    pub keys: Vec<PrivateKeyHandle>,
}

impl DidRecord {
    pub fn new(did: impl Into<String>, alias: impl Into<String>, keys: Vec<PrivateKeyHandle>) -> Self {
        let did = did.into();
        let method = did.split(':').nth(1).unwrap_or_default().to_string();
        DidRecord {
            did,
            alias: alias.into(),
            method,
            status: DidStatus::Unpublished,
            keys,
        }
    }
}

/// secp256k1 public key in JWK form as found in resolved DID Documents.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
}

/// A verification method of a resolved DID Document.
///
/// Public key material comes either as hex-encoded SEC1 bytes or as a JWK,
/// depending on the resolver.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub controller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<PublicKeyJwk>,
}

impl VerificationMethod {
    pub fn is_master(&self) -> bool {
        self.id.contains(MASTER_KEY_FRAGMENT)
    }
}

/// A resolved DID Document. Transient; never persisted by this crate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: String,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
}
