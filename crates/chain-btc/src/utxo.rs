use serde::{Deserialize, Serialize};

/// Lifecycle of a wallet-owned output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    Unspent,
    /// Spent by a broadcast transaction that has not confirmed yet.
    Pending,
    Spent,
}

/// A transaction output owned by exactly one wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// `txid:vout`, see [`Output::output_id`].
    pub id: String,
    /// Transaction ID in display (big-endian) hex.
    pub txid: String,
    pub vout: u32,
    pub amount_sat: u64,
    pub address: String,
    pub status: OutputStatus,
}

impl Output {
    /// Creates an unspent output owned by `address`.
    pub fn unspent(txid: impl Into<String>, vout: u32, amount_sat: u64, address: impl Into<String>) -> Self {
        let txid = txid.into();
        Self {
            id: Self::output_id(&txid, vout),
            txid,
            vout,
            amount_sat,
            address: address.into(),
            status: OutputStatus::Unspent,
        }
    }

    /// Identifier of the output at `vout` of `txid`.
    pub fn output_id(txid: &str, vout: u32) -> String {
        format!("{txid}:{vout}")
    }
}

/// Sums the values of `outputs`, or `None` on overflow.
pub fn total_sat(outputs: &[Output]) -> Option<u64> {
    outputs
        .iter()
        .try_fold(0u64, |acc, output| acc.checked_add(output.amount_sat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_id_joins_txid_and_vout() {
        assert_eq!(Output::output_id("abcd", 1), "abcd:1");
        let output = Output::unspent("abcd", 3, 1_000, "bc1qxyz");
        assert_eq!(output.id, "abcd:3");
        assert_eq!(output.status, OutputStatus::Unspent);
    }

    #[test]
    fn total_sums_amounts() {
        let outputs = vec![
            Output::unspent("aa", 0, 30_000, "a"),
            Output::unspent("bb", 1, 12_000, "a"),
        ];
        assert_eq!(total_sat(&outputs), Some(42_000));
        assert_eq!(total_sat(&[]), Some(0));
    }

    #[test]
    fn total_reports_overflow() {
        let outputs = vec![
            Output::unspent("aa", 0, u64::MAX, "a"),
            Output::unspent("bb", 0, 1, "a"),
        ];
        assert_eq!(total_sat(&outputs), None);
    }
}
