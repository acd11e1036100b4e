// src/storage/record_store.rs
//! Local DID record store.
//!
//! Holds the wallet's DIDs (with their private keys) and the publication jobs
//! written by the publisher. The publisher reads a record at the start of a
//! publish and writes its status at the end, so status writes are guarded by
//! an expected-status check.
//!
//! [`MemoryRecordStore`] keeps everything in memory and, when opened with a
//! path, mirrors every write to a JSON snapshot on disk.

use crate::error::{PublishError, Result};
use crate::models::did::{DidRecord, DidStatus};
use crate::models::publication::PublicationJob;
use crate::utils::serialization::{deserialize, serialize};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[async_trait]
pub trait DidRecordStore: Send + Sync {
    async fn find_did(&self, did: &str) -> Result<Option<DidRecord>>;

    async fn list_dids(&self) -> Result<Vec<DidRecord>>;

    async fn insert_did(&self, record: DidRecord) -> Result<()>;

    /// Sets the status of `did` to `new` if it is currently `expected`.
    ///
    /// # Errors
    /// `RecordChanged` if the record is gone or its status differs.
    async fn update_did_status(&self, did: &str, expected: DidStatus, new: DidStatus) -> Result<DidRecord>;

    async fn load_job(&self, did: &str) -> Result<Option<PublicationJob>>;

    async fn save_job(&self, job: &PublicationJob) -> Result<()>;
}

#[derive(Serialize, Deserialize, Default, Clone)]
struct Snapshot {
    dids: BTreeMap<String, DidRecord>,
    jobs: BTreeMap<String, PublicationJob>,
}

pub struct MemoryRecordStore {
    state: RwLock<Snapshot>,
    path: Option<PathBuf>,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        MemoryRecordStore::new()
    }
}

impl MemoryRecordStore {
    /// In-memory only.
    pub fn new() -> Self {
        MemoryRecordStore {
            state: RwLock::new(Snapshot::default()),
            path: None,
        }
    }

    /// Loads the snapshot at `path` if present; later writes are saved there.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(json) => deserialize(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };
        log::info!(
            "record store {} opened: {} DIDs, {} jobs",
            path.display(),
            snapshot.dids.len(),
            snapshot.jobs.len()
        );
        Ok(MemoryRecordStore {
            state: RwLock::new(snapshot),
            path: Some(path),
        })
    }

    /// Applies `change` to a copy of the state and swaps it in only once the
    /// copy is saved, so a failed write leaves memory and disk unchanged.
    async fn commit<T>(&self, change: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let value = change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(value)
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let storage_error = |e: std::io::Error| PublishError::Storage(format!("saving {}: {}", path.display(), e).into());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(storage_error)?;
        }
        let json = serialize(snapshot)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await.map_err(storage_error)?;
        tokio::fs::rename(&tmp, path).await.map_err(storage_error)
    }
}

#[async_trait]
impl DidRecordStore for MemoryRecordStore {
    async fn find_did(&self, did: &str) -> Result<Option<DidRecord>> {
        Ok(self.state.read().await.dids.get(did).cloned())
    }

    async fn list_dids(&self) -> Result<Vec<DidRecord>> {
        Ok(self.state.read().await.dids.values().cloned().collect())
    }

    async fn insert_did(&self, record: DidRecord) -> Result<()> {
        self.commit(|state| {
            state.dids.insert(record.did.clone(), record);
            Ok(())
        })
        .await
    }

    async fn update_did_status(&self, did: &str, expected: DidStatus, new: DidStatus) -> Result<DidRecord> {
        self.commit(|state| match state.dids.get_mut(did) {
            Some(record) if record.status == expected => {
                record.status = new;
                Ok(record.clone())
            }
            other => Err(PublishError::RecordChanged {
                did: did.to_string(),
                expected,
                found: other.map(|r| r.status),
            }),
        })
        .await
    }

    async fn load_job(&self, did: &str) -> Result<Option<PublicationJob>> {
        Ok(self.state.read().await.jobs.get(did).cloned())
    }

    async fn save_job(&self, job: &PublicationJob) -> Result<()> {
        self.commit(|state| {
            state.jobs.insert(job.did.clone(), job.clone());
            Ok(())
        })
        .await
    }
}
