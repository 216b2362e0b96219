//! Replace-by-fee planning for speeding up or cancelling a pending transfer.
//!
//! Both plans start from the prior raw transaction and the outputs it spent.
//! A speed-up keeps the transfer and raises the fee, re-spending at least the
//! original inputs. A cancellation spends all original inputs back to the
//! sender, paying at least the previous fee plus the incremental relay fee.

use crate::error::BtcError;
use crate::fee::{vsize, FeeSelection, P2wpkhFeeCalculator};
use crate::transaction::{DecodedTransaction, SignedBtcTransaction};
use crate::utxo::{total_sat, Output};

/// Current network fee conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkFee {
    pub rate_sat_vb: u64,
    pub minimum_fee_sat: u64,
    pub incremental_relay_rate_sat_vb: u64,
}

/// A pending transfer, reconstructed from its raw transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorTransfer {
    /// Outputs spent by the prior transaction, in input order.
    pub spent: Vec<Output>,
    pub receiver: String,
    pub transfer_sat: u64,
    pub previous_fee_sat: u64,
}

impl PriorTransfer {
    /// Reconstructs the transfer sent from `from_address`.
    ///
    /// `spent` must contain every output the transaction consumes. The
    /// transaction must have one or two outputs, exactly one of which pays
    /// an address other than `from_address`.
    pub fn reconstruct(
        decoded: &DecodedTransaction,
        spent: &[Output],
        from_address: &str,
    ) -> Result<Self, BtcError> {
        let (receiver, transfer_sat) = transfer_output(decoded, from_address)?;

        let ordered = decoded
            .inputs
            .iter()
            .map(|input| {
                let id = input.output_id();
                spent
                    .iter()
                    .find(|output| output.id == id)
                    .cloned()
                    .ok_or(BtcError::MissingSpentOutput(id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let inputs_sat = total_sat(&ordered)
            .ok_or_else(|| BtcError::DecodeError("input amount overflow".into()))?;
        let outputs_sat = decoded
            .outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.amount_sat))
            .ok_or_else(|| BtcError::DecodeError("output amount overflow".into()))?;
        let previous_fee_sat = inputs_sat.checked_sub(outputs_sat).ok_or_else(|| {
            BtcError::DecodeError(format!(
                "outputs of {outputs_sat} sat exceed inputs of {inputs_sat} sat"
            ))
        })?;

        Ok(Self {
            spent: ordered,
            receiver: receiver.to_owned(),
            transfer_sat,
            previous_fee_sat,
        })
    }

    pub fn inputs_sat(&self) -> u64 {
        total_sat(&self.spent).unwrap_or(u64::MAX)
    }
}

/// Finds the output of a transfer from `from_address` that pays someone
/// else, returning its address and amount.
///
/// The transaction must have one or two outputs, exactly one of which pays
/// an address other than `from_address`.
pub fn transfer_output<'a>(
    decoded: &'a DecodedTransaction,
    from_address: &str,
) -> Result<(&'a str, u64), BtcError> {
    if !(1..=2).contains(&decoded.outputs.len()) {
        return Err(BtcError::NotReplaceable(format!(
            "expected 1 or 2 outputs, found {}",
            decoded.outputs.len()
        )));
    }
    let mut transfers = decoded
        .outputs
        .iter()
        .filter(|output| output.address.as_deref() != Some(from_address));
    match (transfers.next(), transfers.next()) {
        (Some(transfer), None) => {
            let address = transfer.address.as_deref().ok_or_else(|| {
                BtcError::NotReplaceable("transfer output has no address".into())
            })?;
            Ok((address, transfer.amount_sat))
        }
        (None, _) => Err(BtcError::NoTransferOutput),
        (Some(_), Some(_)) => Err(BtcError::NotReplaceable(
            "more than one output pays a third party".into(),
        )),
    }
}

/// Fee and inputs for a replacement that keeps the original transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedUpPlan {
    pub selection: FeeSelection,
    /// The network rate does not exceed the previous rate, so there is
    /// nothing to gain by replacing.
    pub already_fast: bool,
}

/// Plans a speed-up of `prior`, previously broadcast at `previous_rate_sat_vb`.
///
/// Candidates are the originally spent outputs followed by `unspent`; the
/// original ones are always kept. The fee never drops below the previous
/// absolute fee.
pub fn plan_speed_up(
    prior: &PriorTransfer,
    previous_rate_sat_vb: u64,
    unspent: &[Output],
    network: &NetworkFee,
) -> Result<SpeedUpPlan, BtcError> {
    let mut candidates = prior.spent.clone();
    candidates.extend(
        unspent
            .iter()
            .filter(|output| !prior.spent.iter().any(|spent| spent.id == output.id))
            .cloned(),
    );

    let already_fast = network.rate_sat_vb <= previous_rate_sat_vb;
    let rate = if already_fast {
        previous_rate_sat_vb
    } else {
        network.rate_sat_vb
    };
    let minimum = network.minimum_fee_sat.max(prior.previous_fee_sat);

    let selection = P2wpkhFeeCalculator::new(candidates, rate, minimum)
        .with_mandatory(prior.spent.len())
        .calculate(prior.transfer_sat)?;

    Ok(SpeedUpPlan {
        selection,
        already_fast,
    })
}

/// A self-transfer replacing the prior transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelPlan {
    pub inputs: Vec<Output>,
    pub send_sat: u64,
    pub fee_sat: u64,
}

/// Plans a cancellation of `prior`: all original inputs, one output back to
/// the sender, fee at least `previous fee + incremental rate * vsize`.
pub fn plan_cancel(prior: &PriorTransfer, network: &NetworkFee) -> Result<CancelPlan, BtcError> {
    let size = vsize(prior.spent.len(), 1);
    let fee_sat = network
        .minimum_fee_sat
        .max(network.rate_sat_vb.saturating_mul(size))
        .max(
            prior
                .previous_fee_sat
                .saturating_add(network.incremental_relay_rate_sat_vb.saturating_mul(size)),
        );

    let inputs_sat = prior.inputs_sat();
    let send_sat = inputs_sat
        .checked_sub(fee_sat)
        .filter(|send| *send > 0)
        .ok_or(BtcError::InsufficientOutputs { fee_sat })?;

    Ok(CancelPlan {
        inputs: prior.spent.clone(),
        send_sat,
        fee_sat,
    })
}

/// Fails if a signed cancellation would return change to any address.
pub fn ensure_no_change(signed: &SignedBtcTransaction) -> Result<(), BtcError> {
    match &signed.change {
        Some(change) => Err(BtcError::UnexpectedChangeOutput(change.amount_sat)),
        None => Ok(()),
    }
}
