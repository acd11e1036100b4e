// src/settings.rs
//! Layered configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. `config/default.{toml,json,yaml}` (optional)
//! 3. `config/local.{toml,json,yaml}` (optional)
//! 4. environment variables `DIDANCHOR__<SECTION>__<KEY>`, e.g.
//!    `DIDANCHOR__INDEXER__API_KEY` (a `.env` file is loaded first by `main`)

use crate::blockchain::transaction_submitter::TransactionSubmitter;
use crate::error::Result;
use crate::services::confirmation_poller::PollPolicy;
use crate::utils::serialization::AnchorEncoder;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub resolver: ResolverSettings,
    pub indexer: IndexerSettings,
    #[serde(default)]
    pub wallet: WalletSettings,
    pub publication: PublicationSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// JSON snapshot of DIDs and publication jobs; in-memory only when unset.
    pub records_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverSettings {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Wallet backend connected at startup. All three must be set to connect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletSettings {
    pub base_url: Option<String>,
    pub wallet_id: Option<String>,
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicationSettings {
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    pub max_backoff_secs: u64,
    pub warn_after_failures: u32,
    pub chunk_size: usize,
    pub anchor_lovelace: u64,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("DIDANCHOR").separator("__"))
            .build()?;
        Self::checked(config)
    }

    /// Defaults overridden by a TOML document.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config = Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::checked(config)
    }

    fn checked(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.publication.validate()?;
        Ok(settings)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("server.bind_addr", "127.0.0.1:3000")?
            .set_default("store.records_path", "data/records.json")?
            .set_default("resolver.base_url", "https://dev.uniresolver.io")?
            .set_default("indexer.base_url", "https://cardano-preprod.blockfrost.io/api/v0")?
            .set_default("publication.poll_interval_secs", 15i64)?
            .set_default("publication.max_poll_attempts", 240i64)?
            .set_default("publication.max_backoff_secs", 300i64)?
            .set_default("publication.warn_after_failures", 5i64)?
            .set_default("publication.chunk_size", 64i64)?
            .set_default("publication.anchor_lovelace", 1_000_000i64)?)
    }
}

impl PublicationSettings {
    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_poll_attempts == 0 {
            return Err(ConfigError::Message("publication.max_poll_attempts must be at least 1".into()).into());
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Message("publication.poll_interval_secs must be at least 1".into()).into());
        }
        self.encoder().map(|_| ())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_poll_attempts,
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            warn_after_failures: self.warn_after_failures,
        }
    }

    pub fn encoder(&self) -> Result<AnchorEncoder> {
        AnchorEncoder::new(self.chunk_size)
    }

    pub fn submitter(&self) -> TransactionSubmitter {
        TransactionSubmitter::new(self.anchor_lovelace)
    }
}
