// src/services/publisher.rs
//! DID publication state machine.
//!
//! Orchestrates one publish attempt:
//!
//! ```text
//! Unpublished -> Resolving -> Signing -> Submitting -> Confirming -> Published
//! ```
//!
//! - At most one publish per DID is in flight; a second request is rejected with
//!   `AlreadyInProgress` before any I/O.
//! - Everything up to `Submitting` is free of side effects. A failure there
//!   leaves the DID `unpublished`.
//! - Once a transaction is broadcast its hash is written to the DID's
//!   [`PublicationJob`] before polling starts. A later publish of the same DID
//!   resumes polling that hash instead of broadcasting again.
//! - A job already marked confirmed skips straight to the status write.
//! - If the job cannot be saved after a broadcast, the hash is kept in memory
//!   and polling continues; the next publish resumes it.
//! - The final status write only succeeds if the record is still `unpublished`.

use crate::blockchain::cardano_wallet::WalletSession;
use crate::blockchain::indexer_client::LookupOutcome;
use crate::blockchain::transaction_submitter::TransactionSubmitter;
use crate::error::{PublishError, Result};
use crate::models::anchor::TransactionHandle;
use crate::models::did::{DidRecord, DidStatus};
use crate::models::publication::{JobState, PublicationJob, PublicationStage};
use crate::services::confirmation_poller::{ConfirmationPoller, ConfirmedEvent, PollProgress};
use crate::services::identity_sdk::IdentitySdk;
use crate::storage::record_store::DidRecordStore;
use crate::utils::serialization::AnchorEncoder;
use crate::wallet::key_matching::{find_master_method, match_master_key};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published { tx_hash: String, attempts: u32 },
    AlreadyPublished,
}

struct InFlight {
    stage: PublicationStage,
    cancel: CancellationToken,
    progress: Option<PollProgress>,
}

type InFlightMap = Arc<Mutex<HashMap<String, InFlight>>>;

const JOB_SAVE_ATTEMPTS: u32 = 3;

fn lock<T>(map: &Mutex<T>) -> MutexGuard<'_, T> {
    map.lock().unwrap_or_else(|e| e.into_inner())
}

/// Claim on a DID for the duration of one publish. Releases the DID on drop.
struct InFlightGuard {
    did: String,
    cancel: CancellationToken,
    in_flight: InFlightMap,
    tx_hash: OnceLock<String>,
}

impl InFlightGuard {
    /// Records the transaction this attempt is waiting on.
    fn track(&self, handle: &TransactionHandle) {
        let _ = self.tx_hash.set(handle.hash.clone());
    }

    fn set_stage(&self, stage: PublicationStage) {
        if let Some(entry) = lock(&self.in_flight).get_mut(&self.did) {
            log::info!("{}: {:?} -> {:?}", self.did, entry.stage, stage);
            entry.stage = stage;
        }
    }

    fn set_progress(&self, progress: &PollProgress) {
        if let Some(entry) = lock(&self.in_flight).get_mut(&self.did) {
            entry.progress = Some(progress.clone());
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        Ok(())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.did);
    }
}

pub struct DidPublisher {
    sdk: Arc<dyn IdentitySdk>,
    store: Arc<dyn DidRecordStore>,
    wallet: Arc<WalletSession>,
    encoder: AnchorEncoder,
    submitter: TransactionSubmitter,
    poller: ConfirmationPoller,
    in_flight: InFlightMap,
    /// Broadcast hashes whose job could not be saved, by DID.
    unsaved_hashes: Mutex<HashMap<String, String>>,
}

impl DidPublisher {
    pub fn new(
        sdk: Arc<dyn IdentitySdk>,
        store: Arc<dyn DidRecordStore>,
        wallet: Arc<WalletSession>,
        encoder: AnchorEncoder,
        submitter: TransactionSubmitter,
        poller: ConfirmationPoller,
    ) -> Self {
        DidPublisher {
            sdk,
            store,
            wallet,
            encoder,
            submitter,
            poller,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            unsaved_hashes: Mutex::new(HashMap::new()),
        }
    }

    pub fn wallet(&self) -> &Arc<WalletSession> {
        &self.wallet
    }

    pub fn store(&self) -> &Arc<dyn DidRecordStore> {
        &self.store
    }

    /// Whether confirmations can be polled at all (indexer API key present).
    pub fn indexer_ready(&self) -> bool {
        self.poller.indexer().has_credentials()
    }

    /// Publishes `did` and waits for the anchor to confirm.
    pub async fn publish(&self, did: &str) -> Result<PublishOutcome> {
        let guard = self.claim(did)?;
        self.run(guard).await
    }

    /// Starts publishing `did` on a detached task.
    ///
    /// The DID is claimed before returning, so a concurrent request is rejected
    /// immediately. The task keeps running when the caller goes away; use
    /// [`DidPublisher::cancel`] to stop it.
    pub fn spawn_publish(self: &Arc<Self>, did: &str) -> Result<JoinHandle<Result<PublishOutcome>>> {
        let guard = self.claim(did)?;
        let publisher = Arc::clone(self);
        Ok(tokio::spawn(async move { publisher.run(guard).await }))
    }

    /// Cancels the in-flight publish of `did`. Returns false if none is running.
    pub fn cancel(&self, did: &str) -> bool {
        match lock(&self.in_flight).get(did) {
            Some(entry) => {
                log::info!("{}: cancellation requested", did);
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn stage(&self, did: &str) -> Option<PublicationStage> {
        lock(&self.in_flight).get(did).map(|entry| entry.stage)
    }

    /// Latest confirmation-poll snapshot of an in-flight publish.
    pub fn progress(&self, did: &str) -> Option<PollProgress> {
        lock(&self.in_flight).get(did).and_then(|entry| entry.progress.clone())
    }

    /// Durable publication job of `did`, if one was ever started.
    pub async fn job(&self, did: &str) -> Result<Option<PublicationJob>> {
        self.store.load_job(did).await
    }

    /// Persisted status, reported as `Publishing` while a publish is in flight.
    pub async fn status(&self, did: &str) -> Result<DidStatus> {
        if self.stage(did).is_some() {
            return Ok(DidStatus::Publishing);
        }
        let record = self
            .store
            .find_did(did)
            .await?
            .ok_or_else(|| PublishError::DidNotFound(did.to_string()))?;
        Ok(record.status)
    }

    fn claim(&self, did: &str) -> Result<InFlightGuard> {
        let mut in_flight = lock(&self.in_flight);
        if in_flight.contains_key(did) {
            log::warn!("{}: publish rejected, another one is in flight", did);
            return Err(PublishError::AlreadyInProgress(did.to_string()));
        }
        let cancel = CancellationToken::new();
        in_flight.insert(
            did.to_string(),
            InFlight {
                stage: PublicationStage::Unpublished,
                cancel: cancel.clone(),
                progress: None,
            },
        );
        Ok(InFlightGuard {
            did: did.to_string(),
            cancel,
            in_flight: Arc::clone(&self.in_flight),
            tx_hash: OnceLock::new(),
        })
    }

    async fn run(&self, guard: InFlightGuard) -> Result<PublishOutcome> {
        let result = self.drive(&guard).await;
        if let Err(e) = &result {
            log::error!("{}: publish failed: {}", guard.did, e);
            let known_hash = guard.tx_hash.get().map(String::as_str);
            if let Err(store_err) = self.record_failure(&guard.did, e, known_hash).await {
                log::error!("{}: could not record failure: {}", guard.did, store_err);
            }
        }
        result
    }

    async fn drive(&self, guard: &InFlightGuard) -> Result<PublishOutcome> {
        let did = guard.did.as_str();
        if !self.indexer_ready() {
            return Err(PublishError::MissingApiKey);
        }
        let record = self
            .store
            .find_did(did)
            .await?
            .ok_or_else(|| PublishError::DidNotFound(did.to_string()))?;
        match record.status {
            DidStatus::Published => return Ok(PublishOutcome::AlreadyPublished),
            DidStatus::Deactivated => return Err(PublishError::Deactivated(did.to_string())),
            DidStatus::Unpublished | DidStatus::Publishing => {}
        }

        let job = self.store.load_job(did).await?;
        let unsaved = lock(&self.unsaved_hashes).get(did).cloned();
        if unsaved.is_none() {
            if let Some(job) = job.as_ref().filter(|job| job.confirmed_hash().is_some()) {
                let hash = job.tx_hash.clone().unwrap_or_default();
                log::info!("{}: transaction {} already confirmed, completing", did, hash);
                return self.complete(guard, hash, job.attempts).await;
            }
        }

        let resume = unsaved.or_else(|| job.as_ref().and_then(PublicationJob::pending_hash).map(str::to_string));
        let handle = match resume {
            Some(hash) => {
                log::info!("{}: resuming confirmation of earlier transaction {}", did, hash);
                TransactionHandle::new(hash)
            }
            None => self.broadcast(guard, &record).await?,
        };
        guard.track(&handle);

        guard.set_stage(PublicationStage::Confirming);
        let event = self.confirm(guard, &handle).await?;
        self.complete(guard, event.hash, event.attempts).await
    }

    async fn complete(&self, guard: &InFlightGuard, tx_hash: String, attempts: u32) -> Result<PublishOutcome> {
        let did = guard.did.as_str();
        self.store
            .update_did_status(did, DidStatus::Unpublished, DidStatus::Published)
            .await?;
        guard.set_stage(PublicationStage::Published);
        log::info!("{}: published in transaction {}", did, tx_hash);
        Ok(PublishOutcome::Published { tx_hash, attempts })
    }

    /// Saves `job`, retrying briefly. A hash that still cannot be saved is kept
    /// in memory so the next publish of the DID resumes it.
    async fn save_job(&self, job: &PublicationJob) -> Result<()> {
        let mut attempt = 1;
        let result = loop {
            match self.store.save_job(job).await {
                Ok(()) => break Ok(()),
                Err(e) if attempt < JOB_SAVE_ATTEMPTS => {
                    log::warn!("{}: saving publication job failed (attempt {}): {}", job.did, attempt, e);
                    sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        let mut unsaved = lock(&self.unsaved_hashes);
        match (&result, &job.tx_hash) {
            (Ok(()), Some(hash)) if unsaved.get(&job.did) == Some(hash) => {
                unsaved.remove(&job.did);
            }
            (Err(_), Some(hash)) => {
                unsaved.insert(job.did.clone(), hash.clone());
            }
            _ => {}
        }
        result
    }

    /// Resolve, sign, encode and submit. Only the final step has side effects.
    async fn broadcast(&self, guard: &InFlightGuard, record: &DidRecord) -> Result<TransactionHandle> {
        let did = record.did.as_str();

        guard.set_stage(PublicationStage::Resolving);
        let document = tokio::select! {
            biased;
            _ = guard.cancel.cancelled() => return Err(PublishError::Cancelled),
            document = self.sdk.resolve_did(did) => document?,
        };
        let master = find_master_method(&document)?;

        guard.set_stage(PublicationStage::Signing);
        let target = self.sdk.public_key_of(master)?;
        let key = match_master_key(did, &target, &record.keys, |k| self.sdk.derive_public_key(k))?;
        let payload = self.sdk.create_anchoring_payload(key, &document).await?;
        let envelope = self.encoder.encode(&payload);
        log::debug!("{}: anchoring payload of {} bytes, {} chunks", did, payload.len(), envelope.c.len());

        guard.check_cancelled()?;
        guard.set_stage(PublicationStage::Submitting);
        let handle = self.submitter.submit(&envelope, &self.wallet).await?;
        guard.track(&handle);
        if let Err(e) = self.save_job(&PublicationJob::pending(did, handle.hash.clone())).await {
            log::error!("{}: transaction {} submitted but its job was not saved: {}", did, handle, e);
        }
        Ok(handle)
    }

    async fn confirm(&self, guard: &InFlightGuard, handle: &TransactionHandle) -> Result<ConfirmedEvent> {
        let did = guard.did.as_str();
        let mut last_progress: Option<PollProgress> = None;
        let result = self
            .poller
            .await_confirmation(handle, &guard.cancel, |progress| {
                guard.set_progress(progress);
                last_progress = Some(progress.clone());
            })
            .await;

        let stored = match self.store.load_job(did).await {
            Ok(job) => job,
            Err(e) => {
                log::error!("{}: loading publication job failed: {}", did, e);
                None
            }
        };
        let mut job = stored
            .filter(|job| job.tx_hash.as_deref() == Some(handle.hash.as_str()))
            .unwrap_or_else(|| PublicationJob::pending(did, handle.hash.clone()));
        if let Some(progress) = &last_progress {
            job.consecutive_failures = progress.consecutive_failures;
            job.last_error = progress.last_error.clone();
            job.warning = progress.warning.clone();
        }
        match &result {
            Ok(event) => {
                job.attempts += event.attempts;
                job.consecutive_failures = 0;
                job.warning = None;
                job.transition(JobState::Confirmed);
            }
            Err(PublishError::ConfirmationTimeout {
                attempts,
                last_outcome,
                ..
            }) => {
                job.attempts += attempts;
                if *last_outcome == Some(LookupOutcome::NotFound) {
                    log::warn!("{}: transaction {} never seen by the indexer, marking dropped", did, handle);
                    job.transition(JobState::Dropped);
                } else {
                    job.updated_at = Utc::now();
                }
            }
            Err(_) => {
                job.attempts += last_progress.as_ref().map_or(0, |p| p.attempt);
                job.updated_at = Utc::now();
            }
        }
        if let Err(e) = self.save_job(&job).await {
            log::error!("{}: job for transaction {} not saved: {}", did, handle, e);
        }
        result
    }

    /// Keeps a failed attempt visible to callers that did not wait for it.
    /// A transaction hash, stored or only known to this attempt, is never dropped.
    async fn record_failure(&self, did: &str, error: &PublishError, known_hash: Option<&str>) -> Result<()> {
        if matches!(error, PublishError::DidNotFound(_)) {
            return Ok(());
        }
        let stored = self.store.load_job(did).await?;
        let job = match (stored, known_hash) {
            (Some(mut job), known)
                if job.tx_hash.is_some() && (known.is_none() || job.tx_hash.as_deref() == known) =>
            {
                job.last_error = Some(error.to_string());
                job.updated_at = Utc::now();
                job
            }
            (_, Some(hash)) => {
                let mut job = PublicationJob::pending(did, hash);
                job.last_error = Some(error.to_string());
                job
            }
            _ => PublicationJob::failed(did, error.to_string()),
        };
        self.save_job(&job).await
    }
}
