// src/services/api_server.rs
//! HTTP API for the wallet front end.
//!
//! Endpoints:
//! - `GET    /dids`                    list local DIDs with their status
//! - `GET    /dids/:did`               one DID with stage, poll progress and job
//! - `POST   /dids/:did/publish`       start publishing (202, runs in background)
//! - `POST   /dids/:did/cancel`        cancel an in-flight publish
//! - `GET    /wallet`                  wallet session state
//! - `POST   /wallet/connect`          connect a wallet backend
//! - `DELETE /wallet`                  disconnect

use crate::blockchain::cardano_wallet::WalletBackendClient;
use crate::error::PublishError;
use crate::models::did::{DidRecord, DidStatus};
use crate::models::publication::{PublicationJob, PublicationStage};
use crate::services::confirmation_poller::PollProgress;
use crate::services::publisher::DidPublisher;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Summary of a DID for listings. Keys are never exposed.
#[derive(Serialize, Deserialize)]
struct DidSummary {
    did: String,
    alias: String,
    method: String,
    status: DidStatus,
}

#[derive(Serialize)]
struct DidDetail {
    #[serde(flatten)]
    summary: DidSummary,
    stage: Option<PublicationStage>,
    progress: Option<PollProgress>,
    job: Option<PublicationJob>,
}

#[derive(Serialize, Deserialize)]
struct PublishAccepted {
    did: String,
    status: DidStatus,
}

/// Request payload for connecting a wallet backend
#[derive(Serialize, Deserialize)]
struct ConnectWalletRequest {
    base_url: String,
    wallet_id: String,
    passphrase: String,
}

#[derive(Serialize, Deserialize)]
struct WalletStateResponse {
    connected: bool,
}

/// Error body returned by every failing endpoint.
struct ApiError(PublishError);

impl From<PublishError> for ApiError {
    fn from(error: PublishError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PublishError::DidNotFound(_) => StatusCode::NOT_FOUND,
            PublishError::AlreadyInProgress(_) | PublishError::RecordChanged { .. } => StatusCode::CONFLICT,
            PublishError::MissingApiKey | PublishError::WalletNotConnected | PublishError::Deactivated(_) => {
                StatusCode::PRECONDITION_FAILED
            }
            PublishError::NoMasterKey(_) | PublishError::NoMatchingSecret(_) | PublishError::InvalidKey(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PublishError::Resolution(_)
            | PublishError::Submission(_)
            | PublishError::Indexer(_)
            | PublishError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// API server state: the publisher owns every other component.
pub struct ApiServer {
    publisher: Arc<DidPublisher>,
}

impl ApiServer {
    pub fn new(publisher: Arc<DidPublisher>) -> Self {
        ApiServer { publisher }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/dids", get(Self::list_dids_handler))
            .route("/dids/:did", get(Self::get_did_handler))
            .route("/dids/:did/publish", post(Self::publish_handler))
            .route("/dids/:did/cancel", post(Self::cancel_handler))
            .route("/wallet", get(Self::wallet_state_handler).delete(Self::disconnect_wallet_handler))
            .route("/wallet/connect", post(Self::connect_wallet_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self))
    }

    /// Serves until the process is stopped.
    pub async fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    async fn summary(&self, record: DidRecord) -> ApiResult<DidSummary> {
        let status = self.publisher.status(&record.did).await?;
        Ok(DidSummary {
            did: record.did,
            alias: record.alias,
            method: record.method,
            status,
        })
    }

    async fn list_dids_handler(State(state): State<Arc<ApiServer>>) -> ApiResult<Json<Vec<DidSummary>>> {
        let records = state.publisher.store().list_dids().await?;
        let summaries = try_join_all(records.into_iter().map(|record| state.summary(record))).await?;
        Ok(Json(summaries))
    }

    async fn get_did_handler(
        State(state): State<Arc<ApiServer>>,
        Path(did): Path<String>,
    ) -> ApiResult<Json<DidDetail>> {
        let record = state
            .publisher
            .store()
            .find_did(&did)
            .await?
            .ok_or_else(|| PublishError::DidNotFound(did.clone()))?;
        let job = state.publisher.job(&did).await?;
        Ok(Json(DidDetail {
            summary: state.summary(record).await?,
            stage: state.publisher.stage(&did),
            progress: state.publisher.progress(&did),
            job,
        }))
    }

    /// Preconditions that make a publish pointless are checked here so the
    /// caller gets a direct answer; everything else runs in the background.
    async fn publish_handler(
        State(state): State<Arc<ApiServer>>,
        Path(did): Path<String>,
    ) -> ApiResult<(StatusCode, Json<PublishAccepted>)> {
        let status = state.publisher.status(&did).await?;
        if !state.publisher.indexer_ready() {
            return Err(PublishError::MissingApiKey.into());
        }
        match status {
            DidStatus::Published => return Ok((StatusCode::OK, Json(PublishAccepted { did, status }))),
            DidStatus::Deactivated => return Err(PublishError::Deactivated(did).into()),
            _ => {}
        }
        state.publisher.spawn_publish(&did)?;
        Ok((
            StatusCode::ACCEPTED,
            Json(PublishAccepted {
                did,
                status: DidStatus::Publishing,
            }),
        ))
    }

    async fn cancel_handler(State(state): State<Arc<ApiServer>>, Path(did): Path<String>) -> StatusCode {
        if state.publisher.cancel(&did) {
            StatusCode::ACCEPTED
        } else {
            StatusCode::NOT_FOUND
        }
    }

    async fn wallet_state_handler(State(state): State<Arc<ApiServer>>) -> Json<WalletStateResponse> {
        Json(WalletStateResponse {
            connected: state.publisher.wallet().is_connected(),
        })
    }

    async fn connect_wallet_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<ConnectWalletRequest>,
    ) -> Json<WalletStateResponse> {
        let wallet = WalletBackendClient::new(&payload.base_url, &payload.wallet_id, &payload.passphrase);
        state.publisher.wallet().connect(Arc::new(wallet));
        Json(WalletStateResponse { connected: true })
    }

    async fn disconnect_wallet_handler(State(state): State<Arc<ApiServer>>) -> StatusCode {
        if state.publisher.wallet().disconnect() {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::NOT_FOUND
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::cardano_wallet::WalletSession;
    use crate::blockchain::transaction_submitter::TransactionSubmitter;
    use crate::services::confirmation_poller::tests::{ScriptedIndexer, Step};
    use crate::services::confirmation_poller::{ConfirmationPoller, PollPolicy};
    use crate::services::identity_sdk::ResolverIdentitySdk;
    use crate::storage::record_store::{DidRecordStore, MemoryRecordStore};
    use crate::utils::serialization::AnchorEncoder;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn app(indexer: ScriptedIndexer) -> Router {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .insert_did(DidRecord::new("did:prism:abc", "main", vec![]))
            .await
            .unwrap();
        let publisher = DidPublisher::new(
            Arc::new(ResolverIdentitySdk::new("http://127.0.0.1:9")),
            store,
            Arc::new(WalletSession::new()),
            AnchorEncoder::default(),
            TransactionSubmitter::default(),
            ConfirmationPoller::new(Arc::new(indexer), PollPolicy::default()),
        );
        ApiServer::new(Arc::new(publisher)).router()
    }

    async fn send(app: Router, method: &str, uri: &str, body: Body) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_lists_dids() {
        let (status, json) = send(app(ScriptedIndexer::new(vec![], Step::Confirmed)).await, "GET", "/dids", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["did"], "did:prism:abc");
        assert_eq!(json[0]["status"], "unpublished");
        assert!(json[0].get("keys").is_none());
    }

    #[tokio::test]
    async fn test_unknown_did_is_404() {
        let (status, json) = send(
            app(ScriptedIndexer::new(vec![], Step::Confirmed)).await,
            "GET",
            "/dids/did:prism:nope",
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("did:prism:nope"));
    }

    #[tokio::test]
    async fn test_publish_without_api_key_is_refused() {
        let (status, json) = send(
            app(ScriptedIndexer::without_credentials()).await,
            "POST",
            "/dids/did:prism:abc/publish",
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert!(json["error"].as_str().unwrap().contains("API key"));
    }

    #[tokio::test]
    async fn test_cancel_without_publish_is_404() {
        let (status, _) = send(
            app(ScriptedIndexer::new(vec![], Step::Confirmed)).await,
            "POST",
            "/dids/did:prism:abc/cancel",
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wallet_connect_and_state() {
        let app = app(ScriptedIndexer::new(vec![], Step::Confirmed)).await;
        let (status, json) = send(app.clone(), "GET", "/wallet", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["connected"], false);

        let body = json!({"base_url": "http://localhost:8090", "wallet_id": "w1", "passphrase": "p"});
        let (status, _) = send(app.clone(), "POST", "/wallet/connect", Body::from(body.to_string())).await;
        assert_eq!(status, StatusCode::OK);

        let (_, json) = send(app.clone(), "GET", "/wallet", Body::empty()).await;
        assert_eq!(json["connected"], true);

        let (status, _) = send(app, "DELETE", "/wallet", Body::empty()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
