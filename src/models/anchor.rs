// src/models/anchor.rs
//! Wire artifacts of an on-chain DID anchor.
//!
//! A signed anchoring payload travels inside ledger transaction metadata as a
//! [`MetadataEnvelope`] under [`ANCHOR_METADATA_LABEL`]. The ledger limits byte
//! strings in metadata to [`MAX_METADATA_CHUNK`] bytes, hence the chunking.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction metadata label reserved for DID anchoring.
pub const ANCHOR_METADATA_LABEL: u64 = 21325;

/// Only envelope version understood by producers and readers.
pub const ENVELOPE_VERSION: u32 = 1;

/// Per-value byte limit imposed by the ledger's metadata format.
pub const MAX_METADATA_CHUNK: usize = 64;

/// Chunked anchoring payload as stored in ledger metadata.
///
/// Serializes bit-exactly as `{"v":1,"c":[[..],[..]]}`. Concatenating `c` in
/// order reproduces the payload; chunk order is significant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetadataEnvelope {
    pub v: u32,
    pub c: Vec<Vec<u8>>,
}

impl MetadataEnvelope {
    pub fn payload_len(&self) -> usize {
        self.c.iter().map(Vec::len).sum()
    }
}

/// Hash of a submitted transaction; the key the confirmation poller looks up.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionHandle {
    pub hash: String,
}

impl TransactionHandle {
    pub fn new(hash: impl Into<String>) -> Self {
        TransactionHandle { hash: hash.into() }
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}
