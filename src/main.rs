// src/main.rs

//! # DID Anchor - Main Entry Point
//!
//! Wires the publication pipeline together and starts the API server.
//!
//! ## Architecture Overview
//! 1. **Blockchain Layer**: wallet backend, metadata encoding, chain indexer
//! 2. **Services Layer**: DID resolution, confirmation polling, the publisher and API endpoints
//! 3. **Storage Layer**: local DID records and publication jobs
//! 4. **Cryptography Layer**: secp256k1 key derivation and master-key matching
//!
//! ## Configuration
//! See [`settings`]. The indexer API key (`DIDANCHOR__INDEXER__API_KEY`) must be
//! set before any DID can be published.

use crate::blockchain::cardano_wallet::{WalletBackendClient, WalletSession};
use crate::blockchain::indexer_client::IndexerClient;
use crate::services::api_server::ApiServer;
use crate::services::confirmation_poller::ConfirmationPoller;
use crate::services::identity_sdk::ResolverIdentitySdk;
use crate::services::publisher::DidPublisher;
use crate::settings::{Settings, WalletSettings};
use crate::storage::record_store::{DidRecordStore, MemoryRecordStore};
use anyhow::Context;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;

mod blockchain; // Ledger wallet, metadata and indexer clients
mod error;
mod models; // Data structures
mod services; // Pipeline and API
mod settings;
mod storage; // Record store
mod utils; // Helper functions
mod wallet; // Key matching

fn connect_wallet(settings: &WalletSettings, session: &WalletSession) {
    match (&settings.base_url, &settings.wallet_id, &settings.passphrase) {
        (Some(base_url), Some(wallet_id), Some(passphrase)) => {
            session.connect(Arc::new(WalletBackendClient::new(base_url, wallet_id, passphrase)));
        }
        _ => log::info!("no wallet configured; connect one via POST /wallet/connect"),
    }
}

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load `.env` and layered configuration
/// 2. Open the record store
/// 3. Build resolver, indexer and wallet clients
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("failed to load configuration")?;

    let store: Arc<dyn DidRecordStore> = match &settings.store.records_path {
        Some(path) => Arc::new(
            MemoryRecordStore::open(path)
                .await
                .with_context(|| format!("failed to open record store {}", path))?,
        ),
        None => Arc::new(MemoryRecordStore::new()),
    };

    let indexer = IndexerClient::new(&settings.indexer.base_url, settings.indexer.api_key.clone());
    let poller = ConfirmationPoller::new(Arc::new(indexer), settings.publication.poll_policy());

    let wallet = Arc::new(WalletSession::new());
    connect_wallet(&settings.wallet, &wallet);

    let publisher = DidPublisher::new(
        Arc::new(ResolverIdentitySdk::new(&settings.resolver.base_url)),
        store,
        wallet,
        settings.publication.encoder()?,
        settings.publication.submitter(),
        poller,
    );
    if !publisher.indexer_ready() {
        log::warn!("indexer API key is not set; publishing is disabled until it is configured");
    }

    let addr: SocketAddr = settings
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {}", settings.server.bind_addr))?;
    log::info!("Available endpoints:");
    log::info!("- GET    /dids");
    log::info!("- GET    /dids/:did");
    log::info!("- POST   /dids/:did/publish");
    log::info!("- POST   /dids/:did/cancel");
    log::info!("- GET    /wallet");
    log::info!("- POST   /wallet/connect");
    log::info!("- DELETE /wallet");

    ApiServer::new(Arc::new(publisher)).run(addr).await?;
    Ok(())
}
