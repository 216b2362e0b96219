use std::sync::Arc;

use serde_json::Value;

use crate::error::OperationError;
use crate::rpc::{RpcError, RpcResponse};
use crate::services::PeerClient;

/// A pending dapp request that expects exactly one response.
#[derive(Clone)]
pub struct DappRequest {
    pub client: Arc<dyn PeerClient>,
    pub topic: String,
    pub request_id: u64,
}

/// Who asked for an operation.
#[derive(Clone)]
pub enum Origin {
    /// Started from the wallet itself; nobody waits for a response.
    Wallet,
    Dapp(DappRequest),
}

impl std::fmt::Debug for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Wallet => f.write_str("Wallet"),
            Origin::Dapp(request) => f
                .debug_struct("Dapp")
                .field("topic", &request.topic)
                .field("request_id", &request.request_id)
                .finish(),
        }
    }
}

impl Origin {
    pub fn dapp(client: Arc<dyn PeerClient>, topic: impl Into<String>, request_id: u64) -> Self {
        Origin::Dapp(DappRequest {
            client,
            topic: topic.into(),
            request_id,
        })
    }

    pub async fn respond(&self, result: Value) -> Result<(), OperationError> {
        self.send(RpcResponse::Result(result)).await
    }

    /// Sends the user-rejected error. Failures are only logged.
    pub async fn reject(&self) {
        self.fail(RpcError::user_rejected()).await;
    }

    pub async fn fail(&self, error: RpcError) {
        if let Err(err) = self.send(RpcResponse::Error(error)).await {
            tracing::warn!(origin = ?self, error = %err, "failed to send error response");
        }
    }

    async fn send(&self, response: RpcResponse) -> Result<(), OperationError> {
        match self {
            Origin::Wallet => Ok(()),
            Origin::Dapp(request) => {
                request
                    .client
                    .respond(&request.topic, request.request_id, response)
                    .await
            }
        }
    }
}
