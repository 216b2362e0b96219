//! JSON-RPC payloads sent back to dapp peers.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(0, "User rejected")
    }

    pub fn unsupported_method() -> Self {
        Self::new(0, "Unsupported method")
    }

    pub fn method_not_found() -> Self {
        Self::new(-32601, "Method not found")
    }

    pub fn insufficient_fee() -> Self {
        Self::new(0, "Insufficient Fee")
    }

    pub fn local_failed() -> Self {
        Self::new(0, "Local failed")
    }

    pub fn missing_session() -> Self {
        Self::new(-1, "Missing session")
    }
}

/// Terminal response to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcResponse {
    Result(Value),
    Error(RpcError),
}

impl RpcResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, RpcResponse::Error(_))
    }
}
