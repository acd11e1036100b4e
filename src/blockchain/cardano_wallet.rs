// src/blockchain/cardano_wallet.rs
//! Connected-wallet boundary.
//!
//! The pipeline never holds spending keys. It asks the connected wallet for a
//! change address and hands it a list of outputs plus metadata; the wallet
//! builds, signs and submits the transaction and reports its hash.
//!
//! [`WalletBackendClient`] talks to a cardano-wallet style REST backend:
//! - `GET  {base}/v2/wallets/{id}/addresses?state=unused`
//! - `POST {base}/v2/wallets/{id}/transactions`

use crate::blockchain::metadata::Metadatum;
use crate::error::{PublishError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, RwLock};

/// A payment output of a transaction to be built by the wallet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: String,
    pub lovelace: u64,
}

#[async_trait]
pub trait LedgerWallet: Send + Sync {
    /// Human-readable wallet name, used in logs.
    fn name(&self) -> &str;

    /// An address owned by the wallet that can receive funds.
    async fn change_address(&self) -> Result<String>;

    /// Builds, signs and submits a transaction; returns its hash.
    ///
    /// Not idempotent: every successful call broadcasts a transaction.
    async fn build_sign_submit(&self, outputs: &[TxOutput], label: u64, body: &Metadatum) -> Result<String>;
}

/// The currently connected wallet, if any.
#[derive(Default)]
pub struct WalletSession {
    wallet: RwLock<Option<Arc<dyn LedgerWallet>>>,
}

impl WalletSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, wallet: Arc<dyn LedgerWallet>) {
        log::info!("wallet connected: {}", wallet.name());
        *self.wallet.write().unwrap_or_else(|e| e.into_inner()) = Some(wallet);
    }

    pub fn disconnect(&self) -> bool {
        let previous = self.wallet.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(wallet) = &previous {
            log::info!("wallet disconnected: {}", wallet.name());
        }
        previous.is_some()
    }

    /// The connected wallet.
    ///
    /// # Errors
    /// `WalletNotConnected` when no session is active.
    pub fn current(&self) -> Result<Arc<dyn LedgerWallet>> {
        self.wallet
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(PublishError::WalletNotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.wallet.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

#[derive(Deserialize)]
struct WalletAddress {
    id: String,
}

#[derive(Deserialize)]
struct SubmittedTransaction {
    id: String,
}

/// REST client for a wallet backend holding the user's funds.
#[derive(Clone)]
pub struct WalletBackendClient {
    http: reqwest::Client,
    base_url: String,
    wallet_id: String,
    passphrase: String,
}

impl WalletBackendClient {
    pub fn new(base_url: &str, wallet_id: &str, passphrase: &str) -> Self {
        WalletBackendClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            wallet_id: wallet_id.to_string(),
            passphrase: passphrase.to_string(),
        }
    }

    fn wallet_url(&self, suffix: &str) -> String {
        format!("{}/v2/wallets/{}{}", self.base_url, self.wallet_id, suffix)
    }
}

#[async_trait]
impl LedgerWallet for WalletBackendClient {
    fn name(&self) -> &str {
        &self.wallet_id
    }

    async fn change_address(&self) -> Result<String> {
        let response = self
            .http
            .get(self.wallet_url("/addresses"))
            .query(&[("state", "unused")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PublishError::Submission(
                format!("address lookup returned {}", response.status()).into(),
            ));
        }
        let addresses: Vec<WalletAddress> = response.json().await?;
        addresses
            .into_iter()
            .next()
            .map(|a| a.id)
            .ok_or_else(|| PublishError::Submission("wallet has no unused address".into()))
    }

    async fn build_sign_submit(&self, outputs: &[TxOutput], label: u64, body: &Metadatum) -> Result<String> {
        let payments: Vec<_> = outputs
            .iter()
            .map(|o| {
                json!({
                    "address": o.address,
                    "amount": {"quantity": o.lovelace, "unit": "lovelace"},
                })
            })
            .collect();
        let request = json!({
            "passphrase": self.passphrase,
            "payments": payments,
            "metadata": { label.to_string(): body },
        });

        let response = self
            .http
            .post(self.wallet_url("/transactions"))
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PublishError::Submission(
                format!("wallet backend returned {}: {}", status, detail).into(),
            ));
        }
        let submitted: SubmittedTransaction = response.json().await?;
        Ok(submitted.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_change_address_takes_first_unused() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/wallets/w1/addresses")
            .match_query(Matcher::UrlEncoded("state".into(), "unused".into()))
            .with_status(200)
            .with_body(r#"[{"id":"addr_test1qfirst","state":"unused"},{"id":"addr_test1qsecond","state":"unused"}]"#)
            .create_async()
            .await;

        let client = WalletBackendClient::new(&server.url(), "w1", "secret");
        assert_eq!(client.change_address().await.unwrap(), "addr_test1qfirst");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_posts_payment_and_labelled_metadata() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/wallets/w1/transactions")
            .match_body(Matcher::PartialJson(json!({
                "passphrase": "secret",
                "payments": [{"address": "addr_self", "amount": {"quantity": 1000000, "unit": "lovelace"}}],
                "metadata": {"21325": {"int": 1}},
            })))
            .with_status(202)
            .with_body(r#"{"id":"abc123","status":"pending"}"#)
            .create_async()
            .await;

        let client = WalletBackendClient::new(&server.url(), "w1", "secret");
        let outputs = vec![TxOutput {
            address: "addr_self".into(),
            lovelace: 1_000_000,
        }];
        let hash = client
            .build_sign_submit(&outputs, 21325, &Metadatum::Int(1))
            .await
            .unwrap();
        assert_eq!(hash, "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_surfaces_backend_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v2/wallets/w1/transactions")
            .with_status(403)
            .with_body("not enough funds")
            .create_async()
            .await;

        let client = WalletBackendClient::new(&server.url(), "w1", "secret");
        let err = client.build_sign_submit(&[], 21325, &Metadatum::Int(1)).await.unwrap_err();
        assert!(matches!(err, PublishError::Submission(msg) if msg.contains("not enough funds")));
    }

    #[test]
    fn test_session_requires_connection() {
        let session = WalletSession::new();
        assert!(matches!(session.current(), Err(PublishError::WalletNotConnected)));
        session.connect(Arc::new(WalletBackendClient::new("http://localhost", "w1", "p")));
        assert!(session.is_connected());
        assert!(session.disconnect());
        assert!(!session.is_connected());
    }
}
