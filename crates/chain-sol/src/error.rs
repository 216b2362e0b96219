use thiserror::Error;

/// Solana chain operation errors.
#[derive(Debug, Error)]
pub enum SolError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    /// The key does not belong to any required signer of the message.
    #[error("{0} is not a required signer")]
    NotASigner(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("unsupported message version: {0}")]
    UnsupportedVersion(u8),
}
