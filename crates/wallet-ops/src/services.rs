//! Collaborators the operations depend on: key derivation, the relay API,
//! local persistence, the dapp peer connection and the UI.

use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use secrecy::SecretString;
use zeroize::Zeroizing;

use chain_btc::replacement::NetworkFee;
use chain_btc::Output;
use chain_eth::{Address, U256};
use chain_sol::PriorityFee;

use crate::config::OperationConfig;
use crate::error::{ConnectError, OperationError};
use crate::operation::sign::SignHandle;
use crate::operation::OperationHandle;
use crate::router::connect::{SessionProposal, RejectReason};
use crate::router::Proposer;
use crate::rpc::RpcResponse;
use crate::types::{BalanceRequirement, Chain, FeeToken, Simulation};

/// Collaborators shared by every operation.
#[derive(Clone)]
pub struct Services {
    pub keys: Arc<dyn KeyProvider>,
    pub relay: Arc<dyn RelayApi>,
    pub store: Arc<dyn WalletStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub config: OperationConfig,
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Derives the private key controlling `address` on `chain`.
    async fn private_key(
        &self,
        pin: &SecretString,
        chain: Chain,
        address: &str,
    ) -> Result<Zeroizing<[u8; 32]>, OperationError>;
}

// ---------------------------------------------------------------------------
// Relay API
// ---------------------------------------------------------------------------

/// Raw EVM fee estimate in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmFeeEstimate {
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Transaction record assigned by the relay after a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedTransaction {
    pub hash: String,
    pub raw: String,
    /// Bitcoin replacement bookkeeping.
    pub replacement_nonce: Option<String>,
}

#[async_trait]
pub trait RelayApi: Send + Sync {
    async fn post_transaction(
        &self,
        chain: Chain,
        from: &str,
        raw: &str,
        fee_waived: bool,
    ) -> Result<PostedTransaction, OperationError>;

    async fn estimate_evm_fee(
        &self,
        chain: Chain,
        from: &str,
        to: &Address,
        value: U256,
        data: &[u8],
    ) -> Result<EvmFeeEstimate, OperationError>;

    /// Count of transactions sent from `address`, including pending ones.
    async fn evm_transaction_count(&self, chain: Chain, address: &str) -> Result<u64, OperationError>;

    async fn simulate_evm(&self, chain: Chain, from: &str, raw_hex: &str) -> Result<Simulation, OperationError>;

    async fn simulate_solana(&self, raw_base64: &str) -> Result<Simulation, OperationError>;

    /// Base58 blockhash.
    async fn solana_latest_blockhash(&self) -> Result<String, OperationError>;

    async fn solana_priority_fee(&self, raw_base64: &str) -> Result<PriorityFee, OperationError>;

    async fn bitcoin_network_fee(&self, chain: Chain) -> Result<NetworkFee, OperationError>;
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Everything stored together with a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub chain: Chain,
    pub from: String,
    pub posted: PostedTransaction,
    pub fee: Option<BigDecimal>,
    pub nonce: Option<u64>,
    pub fee_rate_sat_vb: Option<u64>,
    /// Outputs to mark pending.
    pub spent_outputs: Vec<String>,
    /// New unspent output returned to the sender.
    pub change: Option<Output>,
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn unspent_outputs(&self, chain: Chain, address: &str) -> Result<Vec<Output>, OperationError>;

    /// Outputs by id regardless of status.
    async fn outputs(&self, ids: &[String]) -> Result<Vec<Output>, OperationError>;

    async fn max_nonce(&self, chain: Chain, address: &str) -> Result<Option<u64>, OperationError>;

    /// Saves the transaction and updates output state in one transaction.
    async fn save_transaction(&self, record: TransactionRecord) -> Result<(), OperationError>;
}

/// Local token metadata; reads are synchronous.
pub trait TokenStore: Send + Sync {
    fn fee_token(&self, chain: Chain) -> Option<FeeToken>;
}

/// Addresses of the selected wallet.
pub trait AddressBook: Send + Sync {
    fn address(&self, chain: Chain) -> Option<String>;

    fn addresses(&self) -> Vec<(Chain, String)>;
}

// ---------------------------------------------------------------------------
// Dapp peer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn respond(&self, topic: &str, request_id: u64, response: RpcResponse) -> Result<(), OperationError>;

    async fn pair(&self, uri: &str) -> Result<(), ConnectError>;

    /// `accounts` are CAIP-10 identifiers.
    async fn approve_session(&self, proposal_id: u64, accounts: Vec<String>) -> Result<(), OperationError>;

    async fn reject_session(&self, proposal_id: u64, reason: RejectReason) -> Result<(), OperationError>;
}

// ---------------------------------------------------------------------------
// UI
// ---------------------------------------------------------------------------

pub trait Presenter: Send + Sync {
    fn present_transfer(&self, operation: OperationHandle, proposer: Proposer);

    fn present_signing(&self, operation: SignHandle, proposer: Proposer);

    fn present_insufficient_balance(&self, requirement: BalanceRequirement);

    fn present_rejection(&self, title: &str, message: &str);

    /// Asks the user to approve `proposal` with `accounts`.
    fn present_proposal(&self, proposal: SessionProposal, accounts: Vec<String>);
}
