// src/services/confirmation_poller.rs
//! Waits for an anchoring transaction to settle.
//!
//! The poller sleeps, asks the chain indexer about the transaction, and repeats
//! until the indexer confirms it, the attempt budget runs out, or the caller
//! cancels.
//!
//! # Retry policy
//! - "not found" is the normal state of a freshly broadcast transaction: the
//!   next check follows after the fixed interval (15 s by default)
//! - network errors and unexpected statuses back off exponentially, capped at
//!   `max_backoff`, and are counted; after `warn_after_failures` in a row a
//!   warning is raised through the progress callback, but polling continues
//! - a missing API key is a configuration error and stops polling at once

use crate::blockchain::indexer_client::{ChainIndexer, LookupOutcome};
use crate::error::{PublishError, Result};
use crate::models::anchor::TransactionHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub max_backoff: Duration,
    pub warn_after_failures: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            interval: Duration::from_secs(15),
            max_attempts: 240,
            max_backoff: Duration::from_secs(300),
            warn_after_failures: 5,
        }
    }
}

impl PollPolicy {
    /// Wait before the next check, given the transient failures seen in a row.
    fn delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.interval;
        }
        let factor = 1u32 << consecutive_failures.min(16);
        self.interval.saturating_mul(factor).min(self.max_backoff.max(self.interval))
    }
}

/// Snapshot reported after every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollProgress {
    pub attempt: u32,
    pub outcome: Option<LookupOutcome>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedEvent {
    pub hash: String,
    pub attempts: u32,
    pub elapsed: Duration,
}

pub struct ConfirmationPoller {
    indexer: Arc<dyn ChainIndexer>,
    policy: PollPolicy,
}

impl ConfirmationPoller {
    pub fn new(indexer: Arc<dyn ChainIndexer>, policy: PollPolicy) -> Self {
        ConfirmationPoller { indexer, policy }
    }

    pub fn indexer(&self) -> &Arc<dyn ChainIndexer> {
        &self.indexer
    }

    /// Polls until `handle` is confirmed.
    ///
    /// # Errors
    /// - `Cancelled` once `cancel` fires, at any suspension point
    /// - `ConfirmationTimeout` after `max_attempts` checks without confirmation
    /// - `MissingApiKey` if the indexer has no credentials
    pub async fn await_confirmation<F>(
        &self,
        handle: &TransactionHandle,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<ConfirmedEvent>
    where
        F: FnMut(&PollProgress),
    {
        let started = Instant::now();
        let mut consecutive_failures = 0u32;
        let mut last_error: Option<String> = None;
        let mut last_outcome: Option<LookupOutcome> = None;

        for attempt in 1..=self.policy.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PublishError::Cancelled),
                _ = sleep(self.policy.delay(consecutive_failures)) => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PublishError::Cancelled),
                result = self.indexer.lookup_transaction(&handle.hash) => result,
            };

            match result {
                Ok(LookupOutcome::Confirmed) => {
                    let elapsed = started.elapsed();
                    log::info!(
                        "transaction {} confirmed after {} checks ({:?})",
                        handle,
                        attempt,
                        elapsed
                    );
                    return Ok(ConfirmedEvent {
                        hash: handle.hash.clone(),
                        attempts: attempt,
                        elapsed,
                    });
                }
                Ok(LookupOutcome::NotFound) => {
                    log::debug!("transaction {} not yet confirmed (check {})", handle, attempt);
                    consecutive_failures = 0;
                    last_error = None;
                    last_outcome = Some(LookupOutcome::NotFound);
                }
                Err(PublishError::MissingApiKey) => return Err(PublishError::MissingApiKey),
                Err(e) => {
                    consecutive_failures += 1;
                    log::debug!("check {} for {} failed: {}", attempt, handle, e);
                    if consecutive_failures == self.policy.warn_after_failures {
                        log::warn!(
                            "chain indexer failing for {} consecutive checks of {}: {}",
                            consecutive_failures,
                            handle,
                            e
                        );
                    }
                    last_error = Some(e.to_string());
                    last_outcome = None;
                }
            }

            let warning = (consecutive_failures >= self.policy.warn_after_failures).then(|| {
                format!(
                    "chain indexer unreachable for {} consecutive checks; still waiting for {}",
                    consecutive_failures, handle
                )
            });
            on_progress(&PollProgress {
                attempt,
                outcome: last_outcome,
                consecutive_failures,
                last_error: last_error.clone(),
                warning,
            });
        }

        Err(PublishError::ConfirmationTimeout {
            hash: handle.hash.clone(),
            attempts: self.policy.max_attempts,
            last_outcome,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    pub(crate) enum Step {
        Confirmed,
        NotFound,
        Fail,
    }

    /// Indexer double answering from a script, then with `fallback`.
    pub(crate) struct ScriptedIndexer {
        script: Mutex<VecDeque<Step>>,
        fallback: Step,
        credentials: bool,
        pub calls: AtomicU32,
    }

    impl ScriptedIndexer {
        pub fn new(script: Vec<Step>, fallback: Step) -> Self {
            ScriptedIndexer {
                script: Mutex::new(script.into()),
                fallback,
                credentials: true,
                calls: AtomicU32::new(0),
            }
        }

        pub fn without_credentials() -> Self {
            ScriptedIndexer {
                credentials: false,
                ..ScriptedIndexer::new(vec![], Step::Confirmed)
            }
        }

        pub fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChainIndexer for ScriptedIndexer {
        fn has_credentials(&self) -> bool {
            self.credentials
        }

        async fn lookup_transaction(&self, _hash: &str) -> Result<LookupOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.credentials {
                return Err(PublishError::MissingApiKey);
            }
            let step = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
            match step {
                Step::Confirmed => Ok(LookupOutcome::Confirmed),
                Step::NotFound => Ok(LookupOutcome::NotFound),
                Step::Fail => Err(PublishError::Indexer("connection refused".into())),
            }
        }
    }

    fn poller(indexer: Arc<ScriptedIndexer>, policy: PollPolicy) -> ConfirmationPoller {
        ConfirmationPoller::new(indexer, policy)
    }

    fn assert_elapsed(elapsed: Duration, secs: u64) {
        assert!(
            elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_secs(secs + 1),
            "elapsed {:?}, expected ~{}s",
            elapsed,
            secs
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_on_check_after_n_misses() {
        let indexer = Arc::new(ScriptedIndexer::new(vec![Step::NotFound, Step::NotFound], Step::Confirmed));
        let poller = poller(indexer.clone(), PollPolicy::default());
        let started = Instant::now();

        let event = poller
            .await_confirmation(&TransactionHandle::new("tx1"), &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(event.attempts, 3);
        assert_eq!(indexer.call_count(), 3);
        assert_elapsed(started.elapsed(), 45);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_resolved_before_final_check() {
        let indexer = Arc::new(ScriptedIndexer::new(vec![Step::NotFound; 3], Step::Confirmed));
        let poller = poller(indexer.clone(), PollPolicy::default());
        let cancel = CancellationToken::new();
        let handle = TransactionHandle::new("tx1");

        let early = tokio::time::timeout(
            Duration::from_secs(59),
            poller.await_confirmation(&handle, &cancel, |_| {}),
        )
        .await;
        assert!(early.is_err());
        assert_eq!(indexer.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_back_off_and_warn() {
        let indexer = Arc::new(ScriptedIndexer::new(vec![Step::Fail, Step::Fail, Step::Fail], Step::Confirmed));
        let policy = PollPolicy {
            warn_after_failures: 2,
            ..PollPolicy::default()
        };
        let poller = poller(indexer.clone(), policy);
        let mut progress = Vec::new();
        let started = Instant::now();

        let event = poller
            .await_confirmation(&TransactionHandle::new("tx1"), &CancellationToken::new(), |p| {
                progress.push(p.clone())
            })
            .await
            .unwrap();

        // 15 + 30 + 60 + 120
        assert_elapsed(started.elapsed(), 225);
        assert_eq!(event.attempts, 4);
        assert_eq!(progress.len(), 3);
        assert!(progress[0].warning.is_none());
        assert_eq!(progress[1].consecutive_failures, 2);
        assert!(progress[1].warning.is_some());
        assert!(progress[2].last_error.as_deref().unwrap().contains("connection refused"));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(15));
        assert_eq!(policy.delay(1), Duration::from_secs(30));
        assert_eq!(policy.delay(10), Duration::from_secs(300));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let indexer = Arc::new(ScriptedIndexer::new(vec![], Step::NotFound));
        let policy = PollPolicy {
            max_attempts: 3,
            ..PollPolicy::default()
        };
        let err = poller(indexer.clone(), policy)
            .await_confirmation(&TransactionHandle::new("tx1"), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PublishError::ConfirmationTimeout {
                attempts: 3,
                last_outcome: Some(LookupOutcome::NotFound),
                ..
            }
        ));
        assert_eq!(indexer.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let indexer = Arc::new(ScriptedIndexer::new(vec![], Step::NotFound));
        let poller = poller(indexer.clone(), PollPolicy::default());
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(40)).await;
            canceller.cancel();
        });

        let err = poller
            .await_confirmation(&TransactionHandle::new("tx1"), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Cancelled));
        assert_eq!(indexer.call_count(), 2);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(indexer.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_api_key_is_fatal() {
        let indexer = Arc::new(ScriptedIndexer::without_credentials());
        let err = poller(indexer.clone(), PollPolicy::default())
            .await_confirmation(&TransactionHandle::new("tx1"), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::MissingApiKey));
        assert_eq!(indexer.call_count(), 1);
    }
}
