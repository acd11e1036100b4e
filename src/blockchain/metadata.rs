// src/blockchain/metadata.rs
//! Ledger transaction metadata values.
//!
//! Wallet backends accept metadata in the ledger's "detailed JSON" schema, where
//! every value is a single-key object naming its type:
//!
//! ```text
//! {"map": [{"k": {"string": "v"}, "v": {"int": 1}},
//!          {"k": {"string": "c"}, "v": {"list": [{"bytes": "01ab.."}, ...]}}]}
//! ```
//!
//! Byte strings are limited to 64 bytes per value by the ledger, which is what
//! forces the chunking of anchoring payloads.

use crate::error::{PublishError, Result};
use crate::models::anchor::{MetadataEnvelope, MAX_METADATA_CHUNK};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Metadatum {
    Int(i64),
    Bytes(#[serde(with = "hex::serde")] Vec<u8>),
    String(String),
    List(Vec<Metadatum>),
    Map(Vec<MetadatumPair>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetadatumPair {
    pub k: Metadatum,
    pub v: Metadatum,
}

impl Metadatum {
    /// Checks the ledger's per-value byte limit throughout the tree.
    pub fn validate(&self) -> Result<()> {
        match self {
            Metadatum::Bytes(bytes) if bytes.len() > MAX_METADATA_CHUNK => Err(
                PublishError::InvalidEnvelope(
                    format!("metadata bytes value of {} exceeds {}", bytes.len(), MAX_METADATA_CHUNK).into(),
                ),
            ),
            Metadatum::String(s) if s.len() > MAX_METADATA_CHUNK => Err(PublishError::InvalidEnvelope(
                format!("metadata text value of {} bytes exceeds {}", s.len(), MAX_METADATA_CHUNK).into(),
            )),
            Metadatum::List(items) => items.iter().try_for_each(Metadatum::validate),
            Metadatum::Map(pairs) => pairs.iter().try_for_each(|p| {
                p.k.validate()?;
                p.v.validate()
            }),
            _ => Ok(()),
        }
    }
}

impl TryFrom<&MetadataEnvelope> for Metadatum {
    type Error = PublishError;

    fn try_from(envelope: &MetadataEnvelope) -> Result<Self> {
        let metadatum = Metadatum::Map(vec![
            MetadatumPair {
                k: Metadatum::String("v".to_string()),
                v: Metadatum::Int(i64::from(envelope.v)),
            },
            MetadatumPair {
                k: Metadatum::String("c".to_string()),
                v: Metadatum::List(envelope.c.iter().cloned().map(Metadatum::Bytes).collect()),
            },
        ]);
        metadatum.validate()?;
        Ok(metadatum)
    }
}
