//! EVM transfers: dapp transactions, native and ERC-20 sends, speed-up and
//! cancel.

use std::str::FromStr;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, RoundingMode};
use serde::Deserialize;
use serde_json::{json, Value};

use chain_eth::address::{checksum_address, parse_address, private_key_to_address};
use chain_eth::{erc20, Address, Eip1559Transaction, SignedTransaction, U256};

use crate::amount::{from_base_u256, to_base_u256};
use crate::error::{InitError, OperationError};
use crate::services::{EvmFeeEstimate, PostedTransaction, Services, TransactionRecord};
use crate::types::{Chain, Fee, FeeToken, Simulation};

use super::origin::Origin;
use super::{
    fee_token, FeeOptions, FeeQuote, OperationHandle, OperationSetup, Readiness, TransferStrategy,
};

const GWEI_DECIMALS: u32 = 9;

/// Picks the nonce for a new transaction.
///
/// The locally cached maximum nonce wins when it is at least the relay's
/// pending count, so back-to-back sends do not wait for indexing. The remote
/// count wins otherwise.
pub fn select_nonce(local_max: Option<u64>, remote_pending: u64) -> u64 {
    match local_max {
        Some(local) if local >= remote_pending => local.saturating_add(1),
        _ => remote_pending,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NonceSource {
    Latest,
    /// Replacements reuse the original mempool slot.
    Pinned(u64),
}

#[derive(Debug, Clone)]
pub struct EvmPayload {
    pub signed: SignedTransaction,
    pub raw_hex: String,
    pub nonce: u64,
}

/// `eth_sendTransaction` parameter object.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalEvmTransaction {
    pub from: String,
    pub to: Option<String>,
    /// Hex quantity in wei.
    pub value: Option<String>,
    #[serde(alias = "input")]
    pub data: Option<String>,
}

/// What an address transfer moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvmAsset {
    Native,
    Erc20 {
        asset_id: String,
        contract: String,
        decimals: u32,
    },
}

struct EvmStrategy {
    services: Services,
    chain: Chain,
    from: Address,
    fee_token: FeeToken,
    transaction: Eip1559Transaction,
    nonce: NonceSource,
    fee_waived: bool,
}

fn chain_id(chain: Chain) -> Result<u64, InitError> {
    chain
        .evm_chain_id()
        .ok_or_else(|| InitError::UnsupportedChain(chain.to_string()))
}

fn parse(address: &str, invalid: fn(String) -> InitError) -> Result<Address, InitError> {
    parse_address(address).map_err(|err| invalid(err.to_string()))
}

fn decode_hex_field(value: &str) -> Result<Vec<u8>, InitError> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|err| InitError::InvalidTransaction(err.to_string()))
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// Operation for a transaction a dapp asked the wallet to send.
pub fn transfer_from_dapp(
    services: &Services,
    chain: Chain,
    from_address: &str,
    request: &ExternalEvmTransaction,
    fee_waived: bool,
    origin: Origin,
) -> Result<OperationHandle, InitError> {
    let fee_token = fee_token(services, chain)?;
    let chain_id = chain_id(chain)?;
    let from = parse(from_address, InitError::InvalidAddress)?;
    let requested = parse(&request.from, InitError::InvalidAddress)?;
    if requested != from {
        return Err(InitError::InvalidAddress(format!(
            "request is from {}, wallet is {}",
            checksum_address(&requested),
            checksum_address(&from)
        )));
    }
    let to = request
        .to
        .as_deref()
        .ok_or_else(|| InitError::InvalidReceiver("contract creation is not supported".into()))?;
    let destination = parse(to, InitError::InvalidReceiver)?;
    let amount = match request.value.as_deref() {
        Some(value) => {
            U256::from_str(value).map_err(|err| InitError::InvalidAmount(err.to_string()))?
        }
        None => U256::ZERO,
    };
    let data = match request.data.as_deref() {
        Some(data) => decode_hex_field(data)?,
        None => Vec::new(),
    };

    let transaction = Eip1559Transaction {
        chain_id,
        nonce: None,
        max_priority_fee_per_gas: None,
        max_fee_per_gas: None,
        gas_limit: None,
        destination,
        amount,
        data,
    };
    Ok(spawn(
        services,
        chain,
        from,
        fee_token,
        transaction,
        NonceSource::Latest,
        fee_waived,
        None,
        origin,
    ))
}

/// Operation sending `amount` of `asset` to `to_address`.
pub fn transfer_to_address(
    services: &Services,
    chain: Chain,
    from_address: &str,
    to_address: &str,
    amount: &BigDecimal,
    asset: &EvmAsset,
    fee_waived: bool,
) -> Result<OperationHandle, InitError> {
    let fee_token = fee_token(services, chain)?;
    let chain_id = chain_id(chain)?;
    let from = parse(from_address, InitError::InvalidAddress)?;
    let receiver = parse(to_address, InitError::InvalidReceiver)?;

    let (asset_id, decimals) = match asset {
        EvmAsset::Native => (fee_token.asset_id.clone(), chain.native_decimals()),
        EvmAsset::Erc20 {
            asset_id, decimals, ..
        } => (asset_id.clone(), *decimals),
    };
    let base_amount = to_base_u256(amount, decimals)
        .ok_or_else(|| InitError::InvalidAmount(amount.to_string()))?;

    let (destination, value, data) = match asset {
        EvmAsset::Native => (receiver, base_amount, Vec::new()),
        EvmAsset::Erc20 { contract, .. } => (
            parse(contract, InitError::InvalidAddress)?,
            U256::ZERO,
            erc20::encode_transfer(receiver, base_amount),
        ),
    };
    let transaction = Eip1559Transaction {
        chain_id,
        nonce: None,
        max_priority_fee_per_gas: None,
        max_fee_per_gas: None,
        gas_limit: None,
        destination,
        amount: value,
        data,
    };
    let simulation = Simulation::BalanceChange {
        asset_id,
        amount: -amount.clone(),
    };
    Ok(spawn(
        services,
        chain,
        from,
        fee_token,
        transaction,
        NonceSource::Latest,
        fee_waived,
        Some(simulation),
        Origin::Wallet,
    ))
}

/// Resubmits a pending transaction with a fresh fee and its original nonce.
pub fn speed_up(
    services: &Services,
    chain: Chain,
    from_address: &str,
    raw_hex: &str,
) -> Result<OperationHandle, InitError> {
    let fee_token = fee_token(services, chain)?;
    let chain_id = chain_id(chain)?;
    let from = parse(from_address, InitError::InvalidAddress)?;
    let (mut transaction, nonce) = decode_pending(raw_hex, chain_id)?;
    clear_fee(&mut transaction);
    Ok(spawn(
        services,
        chain,
        from,
        fee_token,
        transaction,
        NonceSource::Pinned(nonce),
        false,
        None,
        Origin::Wallet,
    ))
}

/// Replaces a pending transaction with an empty self-transfer at the same
/// nonce.
pub fn cancel(
    services: &Services,
    chain: Chain,
    from_address: &str,
    raw_hex: &str,
) -> Result<OperationHandle, InitError> {
    let fee_token = fee_token(services, chain)?;
    let chain_id = chain_id(chain)?;
    let from = parse(from_address, InitError::InvalidAddress)?;
    let (_, nonce) = decode_pending(raw_hex, chain_id)?;
    let transaction = Eip1559Transaction {
        chain_id,
        nonce: None,
        max_priority_fee_per_gas: None,
        max_fee_per_gas: None,
        gas_limit: None,
        destination: from,
        amount: U256::ZERO,
        data: Vec::new(),
    };
    Ok(spawn(
        services,
        chain,
        from,
        fee_token,
        transaction,
        NonceSource::Pinned(nonce),
        false,
        Some(Simulation::Empty),
        Origin::Wallet,
    ))
}

fn decode_pending(raw_hex: &str, chain_id: u64) -> Result<(Eip1559Transaction, u64), InitError> {
    let transaction = Eip1559Transaction::decode_hex(raw_hex)
        .map_err(|err| InitError::InvalidTransaction(err.to_string()))?;
    if transaction.chain_id != chain_id {
        return Err(InitError::InvalidTransaction(format!(
            "chain id {} does not match {chain_id}",
            transaction.chain_id
        )));
    }
    let nonce = transaction.nonce.ok_or(InitError::MissingNonce)?;
    Ok((transaction, nonce))
}

fn clear_fee(transaction: &mut Eip1559Transaction) {
    transaction.nonce = None;
    transaction.max_priority_fee_per_gas = None;
    transaction.max_fee_per_gas = None;
    transaction.gas_limit = None;
}

#[allow(clippy::too_many_arguments)]
fn spawn(
    services: &Services,
    chain: Chain,
    from: Address,
    fee_token: FeeToken,
    transaction: Eip1559Transaction,
    nonce: NonceSource,
    fee_waived: bool,
    hardcoded_simulation: Option<Simulation>,
    origin: Origin,
) -> OperationHandle {
    let setup = OperationSetup {
        from_address: checksum_address(&from),
        to_address: Some(checksum_address(&transaction.destination)),
        fee_token: fee_token.clone(),
        hardcoded_simulation,
    };
    let strategy = EvmStrategy {
        services: services.clone(),
        chain,
        from,
        fee_token,
        transaction,
        nonce,
        fee_waived,
    };
    OperationHandle::spawn(strategy, setup, services, origin)
}

// ---------------------------------------------------------------------------
// Fee
// ---------------------------------------------------------------------------

/// Converts a relay estimate into the displayed fee and the fee fields to
/// sign with. With `low_fee` every value is divided by `divisor`.
pub fn quote_fee(
    estimate: EvmFeeEstimate,
    token: &FeeToken,
    divisor: u64,
    low_fee: bool,
) -> Result<FeeQuote<EvmFeeEstimate>, OperationError> {
    if estimate.gas_limit.is_zero() {
        return Err(OperationError::InvalidFee("gas limit is zero".into()));
    }
    let total = estimate
        .gas_limit
        .checked_mul(estimate.max_fee_per_gas)
        .ok_or_else(|| OperationError::InvalidFee("fee overflows".into()))?;
    let mut amount = from_base_u256(total, token.decimals);
    let mut gwei = from_base_u256(estimate.max_fee_per_gas, GWEI_DECIMALS);
    let mut inputs = estimate;

    let low_fee = low_fee && divisor > 1;
    if low_fee {
        let factor = U256::from(divisor);
        inputs = EvmFeeEstimate {
            gas_limit: estimate.gas_limit / factor,
            max_fee_per_gas: estimate.max_fee_per_gas / factor,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas / factor,
        };
        let factor = BigDecimal::from(divisor);
        amount = amount / &factor;
        gwei = gwei / &factor;
    }

    let fee = Fee::new(amount, token)
        .with_gwei_per_gas(gwei.with_scale_round(2, RoundingMode::Ceiling));
    Ok(FeeQuote {
        fee,
        inputs,
        readiness: Readiness::Ready,
        low_fee_applied: low_fee,
    })
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

impl EvmStrategy {
    fn sender(&self) -> String {
        checksum_address(&self.from)
    }

    fn with_fee(&self, inputs: &EvmFeeEstimate) -> Eip1559Transaction {
        let mut transaction = self.transaction.clone();
        transaction.gas_limit = Some(inputs.gas_limit);
        transaction.max_fee_per_gas = Some(inputs.max_fee_per_gas);
        transaction.max_priority_fee_per_gas = Some(inputs.max_priority_fee_per_gas);
        transaction
    }

    async fn nonce(&self) -> Result<u64, OperationError> {
        match self.nonce {
            NonceSource::Pinned(nonce) => Ok(nonce),
            NonceSource::Latest => {
                let from = self.sender();
                let local = self.services.store.max_nonce(self.chain, &from).await?;
                let remote = self
                    .services
                    .relay
                    .evm_transaction_count(self.chain, &from)
                    .await?;
                let nonce = select_nonce(local, remote);
                tracing::debug!(chain = %self.chain, ?local, remote, nonce, "selected nonce");
                Ok(nonce)
            }
        }
    }
}

#[async_trait]
impl TransferStrategy for EvmStrategy {
    type Inputs = EvmFeeEstimate;
    type Payload = EvmPayload;

    fn chain(&self) -> Chain {
        self.chain
    }

    fn supports_resend(&self) -> bool {
        true
    }

    fn initial_inputs(&self) -> Option<EvmFeeEstimate> {
        None
    }

    fn verify_key(&self, private_key: &[u8; 32]) -> Result<(), OperationError> {
        let derived = private_key_to_address(private_key)?;
        if derived != self.from {
            return Err(OperationError::MismatchedAddress {
                expected: checksum_address(&self.from),
                derived: checksum_address(&derived),
            });
        }
        Ok(())
    }

    async fn load_fee(&self, options: FeeOptions) -> Result<FeeQuote<EvmFeeEstimate>, OperationError> {
        let estimate = self
            .services
            .relay
            .estimate_evm_fee(
                self.chain,
                &self.sender(),
                &self.transaction.destination,
                self.transaction.amount,
                &self.transaction.data,
            )
            .await?;
        quote_fee(
            estimate,
            &self.fee_token,
            self.services.config.low_fee_divisor,
            options.low_fee_once,
        )
    }

    async fn simulate(&self, inputs: Option<EvmFeeEstimate>) -> Result<Simulation, OperationError> {
        let transaction = match &inputs {
            Some(inputs) => self.with_fee(inputs),
            None => self.transaction.clone(),
        };
        let raw_hex = format!("0x{}", hex::encode(transaction.raw()));
        self.services
            .relay
            .simulate_evm(self.chain, &self.sender(), &raw_hex)
            .await
    }

    async fn sign(
        &self,
        private_key: &[u8; 32],
        inputs: &EvmFeeEstimate,
    ) -> Result<EvmPayload, OperationError> {
        let nonce = self.nonce().await?;
        let mut transaction = self.with_fee(inputs);
        transaction.nonce = Some(nonce);
        let signed = transaction.sign(private_key)?;
        let raw_hex = signed.raw_hex();
        Ok(EvmPayload {
            signed,
            raw_hex,
            nonce,
        })
    }

    async fn send(
        &self,
        payload: &EvmPayload,
        fee: Option<&Fee>,
    ) -> Result<PostedTransaction, OperationError> {
        let from = self.sender();
        let posted = self
            .services
            .relay
            .post_transaction(self.chain, &from, &payload.raw_hex, self.fee_waived)
            .await?;
        let record = TransactionRecord {
            chain: self.chain,
            from,
            posted: posted.clone(),
            fee: fee.map(|fee| fee.amount.clone()),
            nonce: Some(payload.nonce),
            fee_rate_sat_vb: None,
            spent_outputs: Vec::new(),
            change: None,
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
