// src/models/publication.rs
//! Durable bookkeeping for publish attempts.
//!
//! A [`PublicationJob`] outlives any single caller: it is written as soon as a
//! transaction has been broadcast, so a later publish of the same DID can pick
//! up the pending hash instead of anchoring a second time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an in-flight publish currently is.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStage {
    Unpublished,
    Resolving,
    Signing,
    Submitting,
    Confirming,
    Published,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Broadcast, confirmation outstanding. A new publish resumes polling.
    Pending,
    Confirmed,
    /// Indexer kept reporting "not found" until the poll budget ran out.
    /// A new publish may broadcast again.
    Dropped,
    /// Failed before anything was broadcast.
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicationJob {
    pub did: String,
    pub tx_hash: Option<String>,
    pub state: JobState,
    /// Confirmation checks performed for `tx_hash` so far.
    pub attempts: u32,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    /// User-facing warning raised after repeated indexer failures.
    pub warning: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublicationJob {
    pub fn pending(did: impl Into<String>, tx_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        PublicationJob {
            did: did.into(),
            tx_hash: Some(tx_hash.into()),
            state: JobState::Pending,
            attempts: 0,
            consecutive_failures: 0,
            last_error: None,
            warning: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn failed(did: impl Into<String>, error: impl Into<String>) -> Self {
        let now = Utc::now();
        PublicationJob {
            did: did.into(),
            tx_hash: None,
            state: JobState::Failed,
            attempts: 0,
            consecutive_failures: 0,
            last_error: Some(error.into()),
            warning: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Hash of a broadcast transaction that may still confirm.
    pub fn pending_hash(&self) -> Option<&str> {
        match self.state {
            JobState::Pending => self.tx_hash.as_deref(),
            _ => None,
        }
    }

    /// Hash of a transaction the indexer already reported as confirmed.
    pub fn confirmed_hash(&self) -> Option<&str> {
        match self.state {
            JobState::Confirmed => self.tx_hash.as_deref(),
            _ => None,
        }
    }

    pub fn transition(&mut self, state: JobState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_jobs_expose_a_hash() {
        let mut job = PublicationJob::pending("did:prism:abc", "tx1");
        assert_eq!(job.pending_hash(), Some("tx1"));

        job.transition(JobState::Dropped);
        assert_eq!(job.pending_hash(), None);
        assert_eq!(job.tx_hash.as_deref(), Some("tx1"));

        let failed = PublicationJob::failed("did:prism:abc", "boom");
        assert_eq!(failed.pending_hash(), None);
        assert_eq!(failed.confirmed_hash(), None);

        let mut confirmed = PublicationJob::pending("did:prism:abc", "tx2");
        assert_eq!(confirmed.confirmed_hash(), None);
        confirmed.transition(JobState::Confirmed);
        assert_eq!(confirmed.confirmed_hash(), Some("tx2"));
        assert_eq!(confirmed.pending_hash(), None);
    }
}
