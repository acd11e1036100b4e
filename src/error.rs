// src/error.rs
//! Error taxonomy for the DID publication pipeline.
//!
//! Errors raised before a transaction is broadcast carry no side effects and are
//! safe to surface and retry. Errors raised after broadcast (`Submission` once the
//! wallet has accepted a request, `ConfirmationTimeout`, `Cancelled`,
//! `RecordChanged`) may leave a transaction on the ledger; the publisher keeps a
//! [`PublicationJob`](crate::models::publication::PublicationJob) so the next
//! attempt can reconcile instead of anchoring twice.

use crate::blockchain::indexer_client::LookupOutcome;
use crate::models::did::DidStatus;
use std::borrow::Cow;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PublishError>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("DID document for {0} has no #master verification method")]
    NoMasterKey(String),
    #[error("no locally stored private key matches the master key of {0}")]
    NoMatchingSecret(String),
    #[error("chain indexer API key is not configured")]
    MissingApiKey,
    #[error("no wallet is connected")]
    WalletNotConnected,
    #[error("a publish is already in progress for {0}")]
    AlreadyInProgress(String),
    #[error("DID {0} not found in the local record store")]
    DidNotFound(String),
    #[error("DID {0} is deactivated and cannot be published")]
    Deactivated(String),
    #[error("DID {did} changed concurrently (expected {expected:?}, found {found:?})")]
    RecordChanged {
        did: String,
        expected: DidStatus,
        found: Option<DidStatus>,
    },
    #[error("chunk size must be between 1 and {max} bytes, got {got}")]
    InvalidChunkSize { got: usize, max: usize },
    #[error("invalid metadata envelope: {0}")]
    InvalidEnvelope(Cow<'static, str>),
    #[error("invalid key material: {0}")]
    InvalidKey(Cow<'static, str>),
    #[error("DID resolution failed: {0}")]
    Resolution(Cow<'static, str>),
    #[error("transaction submission failed: {0}")]
    Submission(Cow<'static, str>),
    #[error("chain indexer error: {0}")]
    Indexer(Cow<'static, str>),
    #[error("transaction {hash} not confirmed after {attempts} checks (last outcome: {last_outcome:?})")]
    ConfirmationTimeout {
        hash: String,
        attempts: u32,
        last_outcome: Option<LookupOutcome>,
    },
    #[error("publication cancelled")]
    Cancelled,
    #[error("record store error: {0}")]
    Storage(Cow<'static, str>),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
