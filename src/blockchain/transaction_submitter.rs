// src/blockchain/transaction_submitter.rs
//! Builds and broadcasts the anchoring transaction.
//!
//! The ledger requires at least one output, so the transaction pays a nominal
//! amount back to the wallet's own change address and carries the envelope as
//! metadata under [`ANCHOR_METADATA_LABEL`].

use crate::blockchain::cardano_wallet::{TxOutput, WalletSession};
use crate::blockchain::metadata::Metadatum;
use crate::error::Result;
use crate::models::anchor::{MetadataEnvelope, TransactionHandle, ANCHOR_METADATA_LABEL};

/// Default self-payment, 1 ADA.
pub const DEFAULT_ANCHOR_LOVELACE: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct TransactionSubmitter {
    anchor_lovelace: u64,
}

impl Default for TransactionSubmitter {
    fn default() -> Self {
        TransactionSubmitter::new(DEFAULT_ANCHOR_LOVELACE)
    }
}

impl TransactionSubmitter {
    pub fn new(anchor_lovelace: u64) -> Self {
        TransactionSubmitter { anchor_lovelace }
    }

    /// Submits `envelope` through the connected wallet.
    ///
    /// # Errors
    /// - `WalletNotConnected` if no wallet session is active
    /// - `InvalidEnvelope` if a chunk breaks the ledger's value limit
    /// - `Submission` if the wallet refuses or fails to submit
    ///
    /// # Side Effects
    /// Broadcasts a real transaction. Retrying after an error may anchor twice.
    pub async fn submit(&self, envelope: &MetadataEnvelope, session: &WalletSession) -> Result<TransactionHandle> {
        let wallet = session.current()?;
        let body = Metadatum::try_from(envelope)?;

        let address = wallet.change_address().await?;
        let outputs = [TxOutput {
            address,
            lovelace: self.anchor_lovelace,
        }];

        log::info!(
            "submitting anchor of {} bytes in {} chunks via wallet {}",
            envelope.payload_len(),
            envelope.c.len(),
            wallet.name()
        );
        let hash = wallet
            .build_sign_submit(&outputs, ANCHOR_METADATA_LABEL, &body)
            .await?;
        log::info!("anchor transaction submitted: {}", hash);
        Ok(TransactionHandle::new(hash))
    }
}
