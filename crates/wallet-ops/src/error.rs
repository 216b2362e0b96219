use thiserror::Error;

use chain_btc::BtcError;
use chain_eth::EthError;
use chain_sol::SolError;

/// Validation failures while constructing an operation. Raised before any
/// network or signing work.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("No fee token for chain: {0}")]
    NoFeeToken(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid receiver: {0}")]
    InvalidReceiver(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Transaction has no nonce")]
    MissingNonce,

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
}

/// Failures while loading a fee, signing or broadcasting.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid fee: {0}")]
    InvalidFee(String),

    #[error("Operation is not ready: {0}")]
    NotReady(String),

    #[error("Mismatched address: expected {expected}, derived {derived}")]
    MismatchedAddress { expected: String, derived: String },

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Response failed: {0}")]
    Respond(String),

    #[error("Resending is not available")]
    ResendUnavailable,

    #[error("Operation task has stopped")]
    Stopped,

    #[error("ETH: {0}")]
    Eth(#[from] EthError),

    #[error("BTC: {0}")]
    Btc(#[from] BtcError),

    #[error("SOL: {0}")]
    Sol(#[from] SolError),
}

impl OperationError {
    /// Whether the failure comes from a lookup that may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, OperationError::Network(_))
    }
}

/// Failures while decoding and routing a dapp request.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("No transaction in request")]
    NoTransaction,

    #[error("No chain for: {0}")]
    NoChain(String),

    #[error("No address for chain: {0}")]
    NoAddress(String),

    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Operation(#[from] OperationError),
}

/// Failures while pairing with a dapp.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Pairing failed: {0}")]
    Pairing(String),

    #[error("Timed out waiting for session proposal")]
    TimedOut,
}
