use thiserror::Error;

/// Failures raised while decoding or reading RLP data.
///
/// Every decode failure is total: no partially decoded value is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RlpError {
    #[error("truncated length-of-length: need {needed} bytes, {available} available")]
    TruncatedLengthOfLength { needed: usize, available: usize },

    #[error("length exceeds input: need {needed} bytes, {available} available")]
    LengthExceedsInput { needed: usize, available: usize },

    #[error("unsupported nesting: depth exceeds {0}")]
    UnsupportedNesting(usize),

    #[error("non-canonical single byte 0x{0:02x} behind a string prefix")]
    NonCanonicalSingleByte(u8),

    #[error("non-canonical long form for a {0}-byte payload")]
    NonCanonicalLongForm(usize),

    #[error("length has a leading zero byte")]
    LeadingZeroLength,

    #[error("trailing bytes after value: {0}")]
    TrailingBytes(usize),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("address length mismatch: expected 20 bytes, got {0}")]
    AddressLength(usize),

    #[error("integer overflow: {0} bytes do not fit the target type")]
    IntegerOverflow(usize),
}

/// Ethereum chain operation errors.
#[derive(Debug, Error)]
pub enum EthError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("rlp decode error: {0}")]
    Rlp(#[from] RlpError),

    #[error("unsupported transaction type: {0}")]
    UnsupportedTransactionType(String),

    #[error("too few transaction fields: {0}")]
    TooFewFields(usize),

    #[error("access lists are not supported: {0} entries")]
    UnsupportedAccessList(usize),

    #[error("invalid typed data: {0}")]
    InvalidTypedData(String),

    #[error("unsupported chain: {0}")]
    UnsupportedChain(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_private_key() {
        let err = EthError::InvalidPrivateKey("key too short".into());
        assert_eq!(err.to_string(), "invalid private key: key too short");
    }

    #[test]
    fn display_invalid_address() {
        let err = EthError::InvalidAddress("bad checksum".into());
        assert_eq!(err.to_string(), "invalid address: bad checksum");
    }

    #[test]
    fn display_too_few_fields() {
        let err = EthError::TooFewFields(7);
        assert_eq!(err.to_string(), "too few transaction fields: 7");
    }

    #[test]
    fn display_unsupported_transaction_type() {
        let err = EthError::UnsupportedTransactionType("0x01".into());
        assert_eq!(err.to_string(), "unsupported transaction type: 0x01");
    }

    #[test]
    fn rlp_error_wraps_into_eth_error() {
        let err: EthError = RlpError::AddressLength(19).into();
        assert_eq!(
            err.to_string(),
            "rlp decode error: address length mismatch: expected 20 bytes, got 19"
        );
    }

    #[test]
    fn display_truncated_length_of_length() {
        let err = RlpError::TruncatedLengthOfLength {
            needed: 2,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "truncated length-of-length: need 2 bytes, 1 available"
        );
    }

    #[test]
    fn display_type_mismatch() {
        let err = RlpError::TypeMismatch {
            expected: "list",
            found: "bytes",
        };
        assert_eq!(err.to_string(), "type mismatch: expected list, found bytes");
    }

    #[test]
    fn error_trait_is_implemented() {
        let err: Box<dyn std::error::Error> =
            Box::new(EthError::InvalidPrivateKey("test".into()));
        assert!(err.to_string().contains("test"));
    }

    #[test]
    fn debug_format_works() {
        let err = EthError::UnsupportedChain(42);
        let debug = format!("{:?}", err);
        assert!(debug.contains("UnsupportedChain"));
    }
}
