//! P2WPKH size estimation and fee-driven output selection.

use crate::error::BtcError;
use crate::utxo::Output;

/// Estimated virtual size of a P2WPKH input (in vbytes).
/// 41 bytes non-witness plus ~107 witness bytes / 4.
pub const P2WPKH_INPUT_VBYTES: u64 = 68;

/// Estimated virtual size of any output (in vbytes).
pub const OUTPUT_VBYTES: u64 = 31;

/// Fixed transaction overhead (in vbytes): version, locktime, segwit
/// marker/flag and counts.
pub const TX_OVERHEAD_VBYTES: u64 = 11;

/// Estimated virtual size of a P2WPKH transaction.
pub fn vsize(num_inputs: usize, num_outputs: usize) -> u64 {
    TX_OVERHEAD_VBYTES
        + num_inputs as u64 * P2WPKH_INPUT_VBYTES
        + num_outputs as u64 * OUTPUT_VBYTES
}

/// Fee for a P2WPKH transaction at `rate_sat_vb`.
pub fn estimate_fee(num_inputs: usize, num_outputs: usize, rate_sat_vb: u64) -> u64 {
    vsize(num_inputs, num_outputs).saturating_mul(rate_sat_vb)
}

/// Outputs chosen to fund a transfer and the fee they pay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSelection {
    pub fee_sat: u64,
    pub spending: Vec<Output>,
}

/// Walks candidate outputs in order, accumulating until they cover the
/// transfer amount plus fee.
///
/// The fee is `max(minimum, vsize * rate)`. While accumulating, the fee
/// assumes a change output. When the accumulated value lands exactly on
/// `transfer + fee`, the fee is recomputed for a single output.
#[derive(Debug, Clone)]
pub struct P2wpkhFeeCalculator {
    candidates: Vec<Output>,
    rate_sat_vb: u64,
    minimum_sat: u64,
    mandatory: usize,
}

impl P2wpkhFeeCalculator {
    pub fn new(candidates: Vec<Output>, rate_sat_vb: u64, minimum_sat: u64) -> Self {
        Self {
            candidates,
            rate_sat_vb,
            minimum_sat,
            mandatory: 0,
        }
    }

    /// Requires the first `count` candidates to be spent regardless of
    /// whether fewer would cover the amount.
    pub fn with_mandatory(mut self, count: usize) -> Self {
        self.mandatory = count.min(self.candidates.len());
        self
    }

    pub fn calculate(&self, transfer_sat: u64) -> Result<FeeSelection, BtcError> {
        let mut spending = Vec::new();
        let mut utxo_sat: u64 = 0;
        let mut fee_with_change: u64 = 0;

        for output in &self.candidates {
            spending.push(output.clone());
            utxo_sat = utxo_sat.saturating_add(output.amount_sat);
            fee_with_change = self.fee_for(spending.len(), 2);
            if spending.len() < self.mandatory {
                continue;
            }

            let needed = transfer_sat.saturating_add(fee_with_change);
            if utxo_sat > needed {
                return Ok(FeeSelection {
                    fee_sat: fee_with_change,
                    spending,
                });
            }
            if utxo_sat == needed {
                return Ok(FeeSelection {
                    fee_sat: self.fee_for(spending.len(), 1),
                    spending,
                });
            }
        }

        Err(BtcError::InsufficientOutputs {
            fee_sat: fee_with_change,
        })
    }

    fn fee_for(&self, num_inputs: usize, num_outputs: usize) -> u64 {
        self.minimum_sat
            .max(estimate_fee(num_inputs, num_outputs, self.rate_sat_vb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(tag: &str, amount_sat: u64) -> Output {
        Output::unspent(tag.repeat(32), 0, amount_sat, "bc1qsender")
    }

    #[test]
    fn vsize_matches_p2wpkh_estimate() {
        // 11 + 68 + 62
        assert_eq!(vsize(1, 2), 141);
        assert_eq!(vsize(2, 1), 178);
    }

    #[test]
    fn estimate_fee_scales_with_inputs() {
        let fee_1 = estimate_fee(1, 2, 10);
        let fee_2 = estimate_fee(2, 2, 10);
        assert_eq!(fee_2 - fee_1, P2WPKH_INPUT_VBYTES * 10);
        assert_eq!(estimate_fee(5, 5, 0), 0);
    }

    #[test]
    fn single_output_with_room_for_change() {
        let calc = P2wpkhFeeCalculator::new(vec![output("aa", 100_000)], 10, 0);
        let selection = calc.calculate(50_000).unwrap();
        assert_eq!(selection.fee_sat, 1_410);
        assert_eq!(selection.spending.len(), 1);
    }

    #[test]
    fn accumulates_in_candidate_order() {
        let calc = P2wpkhFeeCalculator::new(
            vec![output("aa", 30_000), output("bb", 30_000), output("cc", 30_000)],
            1,
            0,
        );
        let selection = calc.calculate(55_000).unwrap();
        assert_eq!(selection.spending.len(), 2);
        assert_eq!(selection.spending[0].txid, "aa".repeat(32));
        assert_eq!(selection.fee_sat, 209);
    }

    #[test]
    fn minimum_fee_applies() {
        let calc = P2wpkhFeeCalculator::new(vec![output("aa", 100_000)], 1, 1_000);
        assert_eq!(calc.calculate(10_000).unwrap().fee_sat, 1_000);
    }

    #[test]
    fn exact_fit_uses_single_output_fee() {
        // 1 input, 2 outputs at 2 sat/vB = 282; 1 output = 220.
        let calc = P2wpkhFeeCalculator::new(vec![output("aa", 10_282)], 2, 0);
        let selection = calc.calculate(10_000).unwrap();
        assert_eq!(selection.fee_sat, 220);
    }

    #[test]
    fn insufficient_outputs_reports_last_fee() {
        let calc = P2wpkhFeeCalculator::new(vec![output("aa", 1_000), output("bb", 1_000)], 10, 0);
        let err = calc.calculate(500_000).unwrap_err();
        assert!(matches!(err, BtcError::InsufficientOutputs { fee_sat: 2_090 }));
    }

    #[test]
    fn empty_candidates_are_insufficient() {
        let calc = P2wpkhFeeCalculator::new(Vec::new(), 10, 0);
        assert!(matches!(
            calc.calculate(1).unwrap_err(),
            BtcError::InsufficientOutputs { fee_sat: 0 }
        ));
    }

    #[test]
    fn mandatory_prefix_is_always_spent() {
        let calc = P2wpkhFeeCalculator::new(
            vec![output("aa", 100_000), output("bb", 5_000), output("cc", 5_000)],
            1,
            0,
        )
        .with_mandatory(2);
        let selection = calc.calculate(10_000).unwrap();
        assert_eq!(selection.spending.len(), 2);
        assert_eq!(selection.fee_sat, 209);
    }
}
