// src/services/identity_sdk.rs
//! Identity SDK boundary.
//!
//! DID resolution and payload signing belong to the identity layer, not to the
//! publication pipeline. The pipeline only sees the [`IdentitySdk`] trait; the
//! bundled [`ResolverIdentitySdk`] resolves through a universal-resolver style
//! HTTP endpoint and signs with secp256k1.

use crate::error::{PublishError, Result};
use crate::models::did::{DidDocument, PrivateKeyHandle, VerificationMethod};
use crate::utils::crypto;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait IdentitySdk: Send + Sync {
    /// Resolves `did` to its current DID Document.
    async fn resolve_did(&self, did: &str) -> Result<DidDocument>;

    /// Key task: public key bytes described by a verification method.
    fn public_key_of(&self, method: &VerificationMethod) -> Result<Vec<u8>>;

    /// Key task: public key bytes of a stored private key, in the same encoding
    /// as [`IdentitySdk::public_key_of`].
    fn derive_public_key(&self, key: &PrivateKeyHandle) -> Result<Vec<u8>>;

    /// Signs the anchor operation of `document` with `key`.
    async fn create_anchoring_payload(&self, key: &PrivateKeyHandle, document: &DidDocument) -> Result<Vec<u8>>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolutionResult {
    did_document: DidDocument,
}

/// The operation a DID's master key signs to anchor it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnchorOperation {
    pub did: String,
    #[serde(with = "hex::serde")]
    pub master_public_key: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignedAnchorOperation {
    pub operation: AnchorOperation,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

/// Resolves via `GET {base}/1.0/identifiers/{did}` and signs with `k256`.
#[derive(Clone)]
pub struct ResolverIdentitySdk {
    http: reqwest::Client,
    base_url: String,
}

impl ResolverIdentitySdk {
    pub fn new(base_url: &str) -> Self {
        ResolverIdentitySdk {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl IdentitySdk for ResolverIdentitySdk {
    async fn resolve_did(&self, did: &str) -> Result<DidDocument> {
        let url = format!("{}/1.0/identifiers/{}", self.base_url, did);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PublishError::Resolution(format!("GET {} failed: {}", url, e).into()))?;

        match response.status() {
            status if status.is_success() => {
                let result: ResolutionResult = response.json().await?;
                Ok(result.did_document)
            }
            StatusCode::NOT_FOUND => Err(PublishError::Resolution(format!("{} not found", did).into())),
            status => Err(PublishError::Resolution(format!("GET {} returned {}", url, status).into())),
        }
    }

    fn public_key_of(&self, method: &VerificationMethod) -> Result<Vec<u8>> {
        if let Some(jwk) = &method.public_key_jwk {
            return crypto::public_key_from_jwk(jwk);
        }
        let hex_key = method.public_key_hex.as_deref().ok_or_else(|| {
            PublishError::InvalidKey(format!("{} carries no public key", method.id).into())
        })?;
        let bytes = hex::decode(hex_key)
            .map_err(|e| PublishError::InvalidKey(format!("{}: {}", method.id, e).into()))?;
        crypto::normalize_public_key(&bytes)
    }

    fn derive_public_key(&self, key: &PrivateKeyHandle) -> Result<Vec<u8>> {
        crypto::derive_public_key(&key.raw)
    }

    async fn create_anchoring_payload(&self, key: &PrivateKeyHandle, document: &DidDocument) -> Result<Vec<u8>> {
        let operation = AnchorOperation {
            did: document.id.clone(),
            master_public_key: crypto::derive_public_key(&key.raw)?,
        };
        let signature = crypto::sign(&key.raw, &serde_json::to_vec(&operation)?)?;
        Ok(serde_json::to_vec(&SignedAnchorOperation { operation, signature })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::Verifier;
    use k256::ecdsa::{Signature, VerifyingKey};

    fn master_key() -> PrivateKeyHandle {
        PrivateKeyHandle {
            recovery_id: "master0".into(),
            raw: vec![11u8; 32],
            index: 0,
            uuid: "k-0".into(),
        }
    }

    #[tokio::test]
    async fn test_resolves_did_document() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/1.0/identifiers/did:prism:abc")
            .with_status(200)
            .with_body(
                r#"{"didDocument":{"id":"did:prism:abc","verificationMethod":[
                    {"id":"did:prism:abc#master0","type":"EcdsaSecp256k1VerificationKey2019",
                     "controller":"did:prism:abc","publicKeyHex":"04aa"}]},
                    "didResolutionMetadata":{}}"#,
            )
            .create_async()
            .await;

        let sdk = ResolverIdentitySdk::new(&server.url());
        let doc = sdk.resolve_did("did:prism:abc").await.unwrap();
        assert_eq!(doc.id, "did:prism:abc");
        assert_eq!(doc.verification_method[0].id, "did:prism:abc#master0");
    }

    #[tokio::test]
    async fn test_unknown_did_fails_resolution() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/1.0/identifiers/did:prism:missing")
            .with_status(404)
            .create_async()
            .await;

        let sdk = ResolverIdentitySdk::new(&server.url());
        assert!(matches!(
            sdk.resolve_did("did:prism:missing").await,
            Err(PublishError::Resolution(_))
        ));
    }

    #[test]
    fn test_key_task_agrees_across_encodings() {
        let sdk = ResolverIdentitySdk::new("http://localhost");
        let key = master_key();
        let public = sdk.derive_public_key(&key).unwrap();

        let by_jwk = VerificationMethod {
            id: "did:prism:abc#master0".into(),
            kind: "JsonWebKey2020".into(),
            controller: "did:prism:abc".into(),
            public_key_hex: None,
            public_key_jwk: Some(crypto::public_key_to_jwk(&public).unwrap()),
        };
        let by_hex = VerificationMethod {
            public_key_hex: Some(hex::encode(&public)),
            public_key_jwk: None,
            ..by_jwk.clone()
        };
        assert_eq!(sdk.public_key_of(&by_jwk).unwrap(), public);
        assert_eq!(sdk.public_key_of(&by_hex).unwrap(), public);
    }

    #[tokio::test]
    async fn test_payload_is_signed_by_master_key() {
        let sdk = ResolverIdentitySdk::new("http://localhost");
        let key = master_key();
        let doc = DidDocument {
            id: "did:prism:abc".into(),
            verification_method: vec![],
        };

        let payload = sdk.create_anchoring_payload(&key, &doc).await.unwrap();
        let signed: SignedAnchorOperation = serde_json::from_slice(&payload).unwrap();
        assert_eq!(signed.operation.did, "did:prism:abc");

        let verifying_key = VerifyingKey::from_sec1_bytes(&signed.operation.master_public_key).unwrap();
        let signature = Signature::from_slice(&signed.signature).unwrap();
        let message = serde_json::to_vec(&signed.operation).unwrap();
        assert!(verifying_key.verify(&message, &signature).is_ok());
    }
}
