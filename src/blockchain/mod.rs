// src/blockchain/mod.rs
//! Ledger-facing components: wallet, metadata, indexer.

pub mod cardano_wallet;
pub mod indexer_client;
pub mod metadata;
pub mod transaction_submitter;
