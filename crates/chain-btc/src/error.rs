use thiserror::Error;

/// Bitcoin chain operation errors.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("insufficient outputs: fee would be {fee_sat} sat")]
    InsufficientOutputs { fee_sat: u64 },

    #[error("missing spent output: {0}")]
    MissingSpentOutput(String),

    #[error("not replaceable: {0}")]
    NotReplaceable(String),

    #[error("no output pays a third party")]
    NoTransferOutput,

    #[error("unexpected change output of {0} sat")]
    UnexpectedChangeOutput(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_insufficient_outputs() {
        let err = BtcError::InsufficientOutputs { fee_sat: 2_820 };
        assert_eq!(err.to_string(), "insufficient outputs: fee would be 2820 sat");
    }

    #[test]
    fn display_missing_spent_output() {
        let err = BtcError::MissingSpentOutput("abcd:1".into());
        assert_eq!(err.to_string(), "missing spent output: abcd:1");
    }

    #[test]
    fn display_not_replaceable() {
        let err = BtcError::NotReplaceable("3 outputs".into());
        assert_eq!(err.to_string(), "not replaceable: 3 outputs");
    }

    #[test]
    fn display_no_transfer_output() {
        assert_eq!(BtcError::NoTransferOutput.to_string(), "no output pays a third party");
    }

    #[test]
    fn display_unexpected_change_output() {
        let err = BtcError::UnexpectedChangeOutput(600);
        assert_eq!(err.to_string(), "unexpected change output of 600 sat");
    }
}
