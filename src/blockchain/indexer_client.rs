// src/blockchain/indexer_client.rs
//! Chain-indexer client used to confirm submitted transactions.
//!
//! A transaction is confirmed once the indexer's transaction-lookup endpoint
//! answers with a 2xx status. A 404 means the indexer has not (yet) seen it;
//! anything else is a transient failure.

use crate::error::{PublishError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Header carrying the indexer API key.
pub const API_KEY_HEADER: &str = "project_id";

/// Result of one successful lookup round-trip.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LookupOutcome {
    Confirmed,
    NotFound,
}

#[async_trait]
pub trait ChainIndexer: Send + Sync {
    /// Whether an API key is configured. Publishing is refused without one,
    /// since a broadcast transaction could never be confirmed.
    fn has_credentials(&self) -> bool;

    /// Looks up a transaction by hash.
    ///
    /// # Errors
    /// `Indexer` for network failures and unexpected statuses, `MissingApiKey`
    /// when no key is configured.
    async fn lookup_transaction(&self, hash: &str) -> Result<LookupOutcome>;
}

/// HTTP client for a Blockfrost-style indexer: `GET {base}/txs/{hash}`.
#[derive(Clone)]
pub struct IndexerClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl IndexerClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        IndexerClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

#[async_trait]
impl ChainIndexer for IndexerClient {
    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    async fn lookup_transaction(&self, hash: &str) -> Result<LookupOutcome> {
        let api_key = self.api_key.as_deref().ok_or(PublishError::MissingApiKey)?;
        let url = format!("{}/txs/{}", self.base_url, hash);
        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .map_err(|e| PublishError::Indexer(format!("GET {} failed: {}", url, e).into()))?;

        let status = response.status();
        if status.is_success() {
            Ok(LookupOutcome::Confirmed)
        } else if status == StatusCode::NOT_FOUND {
            Ok(LookupOutcome::NotFound)
        } else {
            Err(PublishError::Indexer(format!("GET {} returned {}", url, status).into()))
        }
    }
}
