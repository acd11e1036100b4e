// src/utils/serialization.rs
//! Serialization utilities for the anchoring pipeline.
//!
//! Provides:
//! - [`AnchorEncoder`], which splits a signed anchoring payload into
//!   ledger-metadata-sized chunks and puts it back together
//! - JSON helpers used by the record store snapshot

use crate::error::{PublishError, Result};
use crate::models::anchor::{MetadataEnvelope, ENVELOPE_VERSION, MAX_METADATA_CHUNK};
use serde::{Deserialize, Serialize};

/// Chunks anchoring payloads into [`MetadataEnvelope`]s.
///
/// The chunk size is bounded by [`MAX_METADATA_CHUNK`] at construction, so an
/// encoder can never produce a chunk the ledger would reject at build time,
/// whatever the caller configured.
#[derive(Debug, Clone, Copy)]
pub struct AnchorEncoder {
    chunk_size: usize,
}

impl Default for AnchorEncoder {
    fn default() -> Self {
        AnchorEncoder {
            chunk_size: MAX_METADATA_CHUNK,
        }
    }
}

impl AnchorEncoder {
    /// Creates an encoder with a custom stride.
    ///
    /// # Errors
    /// `InvalidChunkSize` unless `1 <= chunk_size <= 64`.
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_size > MAX_METADATA_CHUNK {
            return Err(PublishError::InvalidChunkSize {
                got: chunk_size,
                max: MAX_METADATA_CHUNK,
            });
        }
        Ok(AnchorEncoder { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Walks `payload` in strides of `chunk_size`, keeping a final partial chunk.
    ///
    /// An empty payload yields an envelope with no chunks.
    pub fn encode(&self, payload: &[u8]) -> MetadataEnvelope {
        MetadataEnvelope {
            v: ENVELOPE_VERSION,
            c: payload.chunks(self.chunk_size).map(<[u8]>::to_vec).collect(),
        }
    }

    /// Reassembles the payload carried by `envelope`.
    ///
    /// # Errors
    /// `InvalidEnvelope` for an unknown version or a chunk over the ledger limit.
    pub fn decode(envelope: &MetadataEnvelope) -> Result<Vec<u8>> {
        if envelope.v != ENVELOPE_VERSION {
            return Err(PublishError::InvalidEnvelope(
                format!("unsupported version {}", envelope.v).into(),
            ));
        }
        let mut payload = Vec::with_capacity(envelope.payload_len());
        for (i, chunk) in envelope.c.iter().enumerate() {
            if chunk.len() > MAX_METADATA_CHUNK {
                return Err(PublishError::InvalidEnvelope(
                    format!("chunk {} is {} bytes", i, chunk.len()).into(),
                ));
            }
            payload.extend_from_slice(chunk);
        }
        Ok(payload)
    }
}

/// Serializes a value to pretty-printed JSON.
pub fn serialize<T: Serialize>(data: &T) -> std::result::Result<String, serde_json::Error> {
    serde_json::to_string_pretty(data)
}

/// Deserializes a value from a JSON string.
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> std::result::Result<T, serde_json::Error> {
    serde_json::from_str(data)
}
