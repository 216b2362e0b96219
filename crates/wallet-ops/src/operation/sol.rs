//! Solana transfers: transactions built by a dapp and native SOL sends.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::{json, Value};

use chain_sol::{
    address_to_bytes, build_sol_transfer, private_key_to_address, serialize_unsigned,
    sign_transaction, PriorityFee, WireTransaction,
};

use crate::amount::{from_base_u64, to_base_u64};
use crate::error::{InitError, OperationError};
use crate::services::{PostedTransaction, Services, TransactionRecord};
use crate::types::{Chain, ChainKind, Fee, FeeToken, Simulation};

use super::origin::Origin;
use super::{fee_token, FeeOptions, FeeQuote, OperationHandle, OperationSetup, Readiness, TransferStrategy};

const PLACEHOLDER_BLOCKHASH: [u8; 32] = [0u8; 32];

#[derive(Debug, Clone)]
enum Mode {
    /// Signed as given once its blockhash is refreshed.
    Arbitrary(WireTransaction),
    ToAddress { to: [u8; 32], lamports: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolInputs {
    pub priority: Option<PriorityFee>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolPayload {
    /// Signed wire transaction, base64.
    pub raw_base64: String,
}

struct SolStrategy {
    services: Services,
    chain: Chain,
    from: String,
    from_bytes: [u8; 32],
    fee_token: FeeToken,
    mode: Mode,
    fee_waived: bool,
}

fn solana_chain(chain: Chain) -> Result<(), InitError> {
    if chain.kind() == ChainKind::Solana {
        Ok(())
    } else {
        Err(InitError::UnsupportedChain(chain.to_string()))
    }
}

/// Operation for a base64 transaction sent by a dapp.
pub fn transfer_from_dapp(
    services: &Services,
    chain: Chain,
    from_address: &str,
    raw_base64: &str,
    fee_waived: bool,
    origin: Origin,
) -> Result<OperationHandle, InitError> {
    solana_chain(chain)?;
    let fee_token = fee_token(services, chain)?;
    let from_bytes =
        address_to_bytes(from_address).map_err(|err| InitError::InvalidAddress(err.to_string()))?;
    let wire = WireTransaction::from_base64(raw_base64)
        .map_err(|err| InitError::InvalidTransaction(err.to_string()))?;
    Ok(spawn(
        services,
        chain,
        from_address,
        from_bytes,
        None,
        fee_token,
        Mode::Arbitrary(wire),
        fee_waived,
        None,
        origin,
    ))
}

/// Sends `amount` SOL to `to_address`.
pub fn transfer_to_address(
    services: &Services,
    chain: Chain,
    from_address: &str,
    to_address: &str,
    amount: &BigDecimal,
    fee_waived: bool,
) -> Result<OperationHandle, InitError> {
    solana_chain(chain)?;
    let fee_token = fee_token(services, chain)?;
    let from_bytes =
        address_to_bytes(from_address).map_err(|err| InitError::InvalidAddress(err.to_string()))?;
    let to = address_to_bytes(to_address).map_err(|err| InitError::InvalidReceiver(err.to_string()))?;
    let lamports = to_base_u64(amount, chain.native_decimals())
        .filter(|lamports| *lamports > 0)
        .ok_or_else(|| InitError::InvalidAmount(amount.to_string()))?;
    let simulation = Simulation::BalanceChange {
        asset_id: fee_token.asset_id.clone(),
        amount: -amount.clone(),
    };
    Ok(spawn(
        services,
        chain,
        from_address,
        from_bytes,
        Some(to_address.to_owned()),
        fee_token,
        Mode::ToAddress { to, lamports },
        fee_waived,
        Some(simulation),
        Origin::Wallet,
    ))
}

#[allow(clippy::too_many_arguments)]
fn spawn(
    services: &Services,
    chain: Chain,
    from_address: &str,
    from_bytes: [u8; 32],
    to_address: Option<String>,
    fee_token: FeeToken,
    mode: Mode,
    fee_waived: bool,
    hardcoded_simulation: Option<Simulation>,
    origin: Origin,
) -> OperationHandle {
    let setup = OperationSetup {
        from_address: from_address.to_owned(),
        to_address,
        fee_token: fee_token.clone(),
        hardcoded_simulation,
    };
    let strategy = SolStrategy {
        services: services.clone(),
        chain,
        from: from_address.to_owned(),
        from_bytes,
        fee_token,
        mode,
        fee_waived,
    };
    OperationHandle::spawn(strategy, setup, services, origin)
}

impl SolStrategy {
    async fn latest_blockhash(&self) -> Result<[u8; 32], OperationError> {
        let encoded = self.services.relay.solana_latest_blockhash().await?;
        bs58::decode(&encoded)
            .into_vec()
            .ok()
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .ok_or_else(|| OperationError::Signing(format!("invalid blockhash: {encoded}")))
    }

    fn quote(&self, lamports: u64, inputs: SolInputs) -> FeeQuote<SolInputs> {
        let amount = from_base_u64(lamports, self.fee_token.decimals);
        FeeQuote {
            fee: Fee::new(amount, &self.fee_token),
            inputs,
            readiness: Readiness::Ready,
            low_fee_applied: false,
        }
    }
}

#[async_trait]
impl TransferStrategy for SolStrategy {
    type Inputs = SolInputs;
    type Payload = SolPayload;

    fn chain(&self) -> Chain {
        self.chain
    }

    fn supports_resend(&self) -> bool {
        false
    }

    fn initial_inputs(&self) -> Option<SolInputs> {
        match self.mode {
            Mode::Arbitrary(_) => Some(SolInputs::default()),
            Mode::ToAddress { .. } => None,
        }
    }

    fn verify_key(&self, private_key: &[u8; 32]) -> Result<(), OperationError> {
        let derived = private_key_to_address(private_key);
        if derived != self.from {
            return Err(OperationError::MismatchedAddress {
                expected: self.from.clone(),
                derived,
            });
        }
        Ok(())
    }

    async fn load_fee(&self, _options: FeeOptions) -> Result<FeeQuote<SolInputs>, OperationError> {
        let lamports_per_signature = self.services.config.lamports_per_signature;
        match &self.mode {
            Mode::Arbitrary(wire) => Ok(self.quote(wire.fee(lamports_per_signature), SolInputs::default())),
            Mode::ToAddress { to, lamports } => {
                let unsigned = build_sol_transfer(&self.from_bytes, to, *lamports, &PLACEHOLDER_BLOCKHASH, None)?;
                let wire = WireTransaction::parse(&serialize_unsigned(&unsigned))?;
                let priority = self.services.relay.solana_priority_fee(&wire.to_base64()).await?;
                let total = wire
                    .fee(lamports_per_signature)
                    .saturating_add(priority.lamports());
                Ok(self.quote(
                    total,
                    SolInputs {
                        priority: Some(priority),
                    },
                ))
            }
        }
    }

    async fn simulate(&self, _inputs: Option<SolInputs>) -> Result<Simulation, OperationError> {
        match &self.mode {
            Mode::Arbitrary(wire) => self.services.relay.simulate_solana(&wire.to_base64()).await,
            Mode::ToAddress { .. } => Err(OperationError::NotReady("no simulation for transfer".into())),
        }
    }

    async fn sign(&self, private_key: &[u8; 32], inputs: &SolInputs) -> Result<SolPayload, OperationError> {
        let blockhash = self.latest_blockhash().await?;
        let raw_base64 = match &self.mode {
            Mode::Arbitrary(wire) => {
                let mut wire = wire.clone();
                wire.set_recent_blockhash(&blockhash);
                wire.sign(private_key)?;
                wire.to_base64()
            }
            Mode::ToAddress { to, lamports } => {
                let transaction = build_sol_transfer(&self.from_bytes, to, *lamports, &blockhash, inputs.priority)?;
                let signed = sign_transaction(&transaction, private_key)?;
                WireTransaction::parse(&signed)?.to_base64()
            }
        };
        Ok(SolPayload { raw_base64 })
    }

    async fn send(&self, payload: &SolPayload, fee: Option<&Fee>) -> Result<PostedTransaction, OperationError> {
        let posted = self
            .services
            .relay
            .post_transaction(self.chain, &self.from, &payload.raw_base64, self.fee_waived)
            .await?;
        let record = TransactionRecord {
            chain: self.chain,
            from: self.from.clone(),
            posted: posted.clone(),
            fee: fee.map(|fee| fee.amount.clone()),
            nonce: None,
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
        json!({ "signature": posted.hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_solana_chains_are_accepted() {
        assert!(solana_chain(Chain::Solana).is_ok());
        assert!(solana_chain(Chain::SolanaDevnet).is_ok());
        assert!(matches!(
            solana_chain(Chain::Ethereum),
            Err(InitError::UnsupportedChain(_))
        ));
    }

    #[test]
    fn default_inputs_have_no_priority_fee() {
        assert_eq!(SolInputs::default().priority, None);
    }
}
