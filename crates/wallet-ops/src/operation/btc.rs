//! Bitcoin transfers and replace-by-fee speed-up and cancel.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::{json, Value};

use chain_btc::address::{parse_address, private_key_to_p2wpkh_address};
use chain_btc::fee::P2wpkhFeeCalculator;
use chain_btc::replacement::{
    ensure_no_change, plan_cancel, plan_speed_up, transfer_output, NetworkFee, PriorTransfer,
};
use chain_btc::transaction::{decode_transaction, sign_p2wpkh_transaction, DecodedTransaction, SignedBtcTransaction};
use chain_btc::{BtcError, BtcNetwork, Output};

use crate::amount::{from_base_u64, to_base_u64};
use crate::error::{InitError, OperationError};
use crate::services::{PostedTransaction, Services, TransactionRecord};
use crate::types::{Chain, Fee, FeeToken, Simulation};

use super::origin::Origin;
use super::{
    fee_token, FeeOptions, FeeQuote, NotActionableReason, OperationHandle, OperationSetup,
    Readiness, TransferStrategy,
};

#[derive(Debug, Clone)]
enum Mode {
    Transfer { receiver: String, amount_sat: u64 },
    SpeedUp {
        pending: DecodedTransaction,
        previous_rate_sat_vb: u64,
    },
    Cancel { pending: DecodedTransaction },
}

/// Outputs to spend and the amounts to sign with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcInputs {
    pub spending: Vec<Output>,
    pub receiver: String,
    pub send_sat: u64,
    pub fee_sat: u64,
    pub rate_sat_vb: u64,
}

#[derive(Debug, Clone)]
pub struct BtcPayload {
    pub signed: SignedBtcTransaction,
    pub spent_outputs: Vec<String>,
    pub rate_sat_vb: u64,
}

struct BtcStrategy {
    services: Services,
    chain: Chain,
    network: BtcNetwork,
    from: String,
    fee_token: FeeToken,
    mode: Mode,
}

fn network(chain: Chain) -> Result<BtcNetwork, InitError> {
    chain
        .btc_network()
        .ok_or_else(|| InitError::UnsupportedChain(chain.to_string()))
}

/// Checks that `pending` looks like a transfer from `from` and returns its
/// receiver.
fn transfer_receiver(pending: &DecodedTransaction, from: &str) -> Result<String, InitError> {
    match transfer_output(pending, from) {
        Ok((receiver, _)) => Ok(receiver.to_owned()),
        Err(err @ BtcError::NoTransferOutput) => Err(InitError::InvalidReceiver(err.to_string())),
        Err(err) => Err(InitError::InvalidTransaction(err.to_string())),
    }
}

fn decode_pending(raw_hex: &str, network: BtcNetwork, from: &str) -> Result<(DecodedTransaction, String), InitError> {
    let pending = decode_transaction(raw_hex, network)
        .map_err(|err| InitError::InvalidTransaction(err.to_string()))?;
    let receiver = transfer_receiver(&pending, from)?;
    Ok((pending, receiver))
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// Sends `amount` BTC from `from_address` to `to_address`.
pub fn transfer(
    services: &Services,
    chain: Chain,
    from_address: &str,
    to_address: &str,
    amount: &BigDecimal,
) -> Result<OperationHandle, InitError> {
    let fee_token = fee_token(services, chain)?;
    let network = network(chain)?;
    parse_address(from_address, network).map_err(|err| InitError::InvalidAddress(err.to_string()))?;
    parse_address(to_address, network).map_err(|err| InitError::InvalidReceiver(err.to_string()))?;
    let amount_sat = to_base_u64(amount, chain.native_decimals())
        .filter(|sat| *sat > 0)
        .ok_or_else(|| InitError::InvalidAmount(amount.to_string()))?;

    let simulation = Simulation::BalanceChange {
        asset_id: fee_token.asset_id.clone(),
        amount: -amount.clone(),
    };
    let mode = Mode::Transfer {
        receiver: to_address.to_owned(),
        amount_sat,
    };
    Ok(spawn(services, chain, network, from_address, Some(to_address.to_owned()), fee_token, mode, Some(simulation)))
}

/// Replaces the pending transaction `raw_hex` with one paying the current
/// network rate. `previous_rate_sat_vb` is the rate it was broadcast at.
pub fn speed_up(
    services: &Services,
    chain: Chain,
    from_address: &str,
    raw_hex: &str,
    previous_rate_sat_vb: u64,
) -> Result<OperationHandle, InitError> {
    let fee_token = fee_token(services, chain)?;
    let network = network(chain)?;
    let (pending, receiver) = decode_pending(raw_hex, network, from_address)?;
    let mode = Mode::SpeedUp {
        pending,
        previous_rate_sat_vb,
    };
    Ok(spawn(services, chain, network, from_address, Some(receiver), fee_token, mode, None))
}

/// Replaces the pending transaction `raw_hex` with a transfer of all its
/// inputs back to `from_address`.
pub fn cancel(
    services: &Services,
    chain: Chain,
    from_address: &str,
    raw_hex: &str,
) -> Result<OperationHandle, InitError> {
    let fee_token = fee_token(services, chain)?;
    let network = network(chain)?;
    let (pending, _) = decode_pending(raw_hex, network, from_address)?;
    let mode = Mode::Cancel { pending };
    Ok(spawn(
        services,
        chain,
        network,
        from_address,
        Some(from_address.to_owned()),
        fee_token,
        mode,
        Some(Simulation::Empty),
    ))
}

#[allow(clippy::too_many_arguments)]
fn spawn(
    services: &Services,
    chain: Chain,
    network: BtcNetwork,
    from_address: &str,
    to_address: Option<String>,
    fee_token: FeeToken,
    mode: Mode,
    hardcoded_simulation: Option<Simulation>,
) -> OperationHandle {
    let setup = OperationSetup {
        from_address: from_address.to_owned(),
        to_address,
        fee_token: fee_token.clone(),
        hardcoded_simulation,
    };
    let strategy = BtcStrategy {
        services: services.clone(),
        chain,
        network,
        from: from_address.to_owned(),
        fee_token,
        mode,
    };
    OperationHandle::spawn(strategy, setup, services, Origin::Wallet)
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

impl BtcStrategy {
    async fn prior_transfer(&self, pending: &DecodedTransaction) -> Result<PriorTransfer, OperationError> {
        let ids: Vec<String> = pending.inputs.iter().map(|input| input.output_id()).collect();
        let spent = self.services.store.outputs(&ids).await?;
        Ok(PriorTransfer::reconstruct(pending, &spent, &self.from)?)
    }

    fn quote(&self, inputs: BtcInputs, readiness: Readiness) -> FeeQuote<BtcInputs> {
        let amount = from_base_u64(inputs.fee_sat, self.fee_token.decimals);
        FeeQuote {
            fee: Fee::new(amount, &self.fee_token),
            inputs,
            readiness,
            low_fee_applied: false,
        }
    }

    async fn plan(&self, network_fee: NetworkFee) -> Result<FeeQuote<BtcInputs>, OperationError> {
        match &self.mode {
            Mode::Transfer {
                receiver,
                amount_sat,
            } => {
                let unspent = self.services.store.unspent_outputs(self.chain, &self.from).await?;
                let selection =
                    P2wpkhFeeCalculator::new(unspent, network_fee.rate_sat_vb, network_fee.minimum_fee_sat)
                        .calculate(*amount_sat)?;
                let inputs = BtcInputs {
                    spending: selection.spending,
                    receiver: receiver.clone(),
                    send_sat: *amount_sat,
                    fee_sat: selection.fee_sat,
                    rate_sat_vb: network_fee.rate_sat_vb,
                };
                Ok(self.quote(inputs, Readiness::Ready))
            }
            Mode::SpeedUp {
                pending,
                previous_rate_sat_vb,
            } => {
                let prior = self.prior_transfer(pending).await?;
                let unspent = self.services.store.unspent_outputs(self.chain, &self.from).await?;
                let plan = plan_speed_up(&prior, *previous_rate_sat_vb, &unspent, &network_fee)?;
                let (readiness, rate_sat_vb) = if plan.already_fast {
                    tracing::info!(
                        chain = %self.chain,
                        previous = previous_rate_sat_vb,
                        network = network_fee.rate_sat_vb,
                        "pending transaction is already fast"
                    );
                    (
                        Readiness::NotActionable(NotActionableReason::AlreadyFast),
                        *previous_rate_sat_vb,
                    )
                } else {
                    (Readiness::Ready, network_fee.rate_sat_vb)
                };
                let inputs = BtcInputs {
                    spending: plan.selection.spending,
                    receiver: prior.receiver,
                    send_sat: prior.transfer_sat,
                    fee_sat: plan.selection.fee_sat,
                    rate_sat_vb,
                };
                Ok(self.quote(inputs, readiness))
            }
            Mode::Cancel { pending } => {
                let prior = self.prior_transfer(pending).await?;
                let plan = plan_cancel(&prior, &network_fee)?;
                let inputs = BtcInputs {
                    spending: plan.inputs,
                    receiver: self.from.clone(),
                    send_sat: plan.send_sat,
                    fee_sat: plan.fee_sat,
                    rate_sat_vb: network_fee.rate_sat_vb,
                };
                Ok(self.quote(inputs, Readiness::Ready))
            }
        }
    }
}

#[async_trait]
impl TransferStrategy for BtcStrategy {
    type Inputs = BtcInputs;
    type Payload = BtcPayload;

    fn chain(&self) -> Chain {
        self.chain
    }

    fn supports_resend(&self) -> bool {
        false
    }

    fn initial_inputs(&self) -> Option<BtcInputs> {
        None
    }

    fn verify_key(&self, private_key: &[u8; 32]) -> Result<(), OperationError> {
        let derived = private_key_to_p2wpkh_address(private_key, self.network)?;
        if derived != self.from {
            return Err(OperationError::MismatchedAddress {
                expected: self.from.clone(),
                derived,
            });
        }
        Ok(())
    }

    async fn load_fee(&self, _options: FeeOptions) -> Result<FeeQuote<BtcInputs>, OperationError> {
        let network_fee = self.services.relay.bitcoin_network_fee(self.chain).await?;
        self.plan(network_fee).await
    }

    async fn simulate(&self, inputs: Option<BtcInputs>) -> Result<Simulation, OperationError> {
        let inputs = inputs.ok_or_else(|| OperationError::NotReady("fee not loaded".into()))?;
        Ok(Simulation::BalanceChange {
            asset_id: self.fee_token.asset_id.clone(),
            amount: -from_base_u64(inputs.send_sat, self.fee_token.decimals),
        })
    }

    async fn sign(&self, private_key: &[u8; 32], inputs: &BtcInputs) -> Result<BtcPayload, OperationError> {
        let cancelling = matches!(self.mode, Mode::Cancel { .. });
        sign_inputs(&self.from, self.network, private_key, inputs, cancelling)
    }

    async fn send(&self, payload: &BtcPayload, _fee: Option<&Fee>) -> Result<PostedTransaction, OperationError> {
        let posted = self
            .services
            .relay
            .post_transaction(self.chain, &self.from, &payload.signed.raw_hex, false)
            .await?;
        let record = TransactionRecord {
            chain: self.chain,
            from: self.from.clone(),
            posted: posted.clone(),
            fee: Some(from_base_u64(payload.signed.fee_sat, self.fee_token.decimals)),
            nonce: None,
            fee_rate_sat_vb: Some(payload.rate_sat_vb),
            spent_outputs: payload.spent_outputs.clone(),
            change: payload.signed.change.clone(),
        };
        if let Err(err) = self.services.store.save_transaction(record).await {
            tracing::error!(chain = %self.chain, hash = %posted.hash, error = %err, "failed to store sent transaction");
        }
        Ok(posted)
    }

    fn response(&self, posted: &PostedTransaction) -> Value {
        json!(posted.hash)
    }
}

/// Signs `inputs`. A cancellation carrying change is refused before it can
/// reach the relay.
fn sign_inputs(
    from: &str,
    network: BtcNetwork,
    private_key: &[u8; 32],
    inputs: &BtcInputs,
    cancelling: bool,
) -> Result<BtcPayload, OperationError> {
    let signed = sign_p2wpkh_transaction(
        &inputs.spending,
        from,
        &inputs.receiver,
        inputs.send_sat,
        inputs.fee_sat,
        private_key,
        network,
    )?;
    if cancelling {
        ensure_no_change(&signed)?;
    }
    Ok(BtcPayload {
        signed,
        spent_outputs: inputs.spending.iter().map(|output| output.id.clone()).collect(),
        rate_sat_vb: inputs.rate_sat_vb,
    })
}
