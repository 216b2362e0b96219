//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use chain_btc::replacement::NetworkFee;
use chain_btc::{BtcNetwork, Output};
use chain_eth::{Address, U256};
use chain_sol::PriorityFee;

use wallet_ops::error::{ConnectError, OperationError};
use wallet_ops::services::{
    AddressBook, EvmFeeEstimate, KeyProvider, PeerClient, PostedTransaction, Presenter, RelayApi,
    TokenStore, TransactionRecord, WalletStore,
};
use wallet_ops::{
    BalanceRequirement, Chain, ChainKind, FeeToken, OperationConfig, OperationHandle, Proposer,
    RejectReason, RouterContext, RpcResponse, Services, SessionProposal, SignHandle, Simulation,
};

pub const PIN: &str = "123456";
pub const EVM_KEY: [u8; 32] = [0x11; 32];
pub const BTC_KEY: [u8; 32] = [0x22; 32];
pub const SOL_KEY: [u8; 32] = [0x33; 32];

pub fn pin() -> SecretString {
    SecretString::from(PIN)
}

pub fn evm_address() -> String {
    let address = chain_eth::address::private_key_to_address(&EVM_KEY).unwrap();
    chain_eth::address::checksum_address(&address)
}

pub fn btc_address() -> String {
    chain_btc::address::private_key_to_p2wpkh_address(&BTC_KEY, BtcNetwork::Mainnet).unwrap()
}

pub fn sol_address() -> String {
    chain_sol::private_key_to_address(&SOL_KEY)
}

pub fn decimal(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ─── Keys ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeKeys {
    /// Returns this key for every chain when set.
    pub override_key: Mutex<Option<[u8; 32]>>,
    /// Holds every key lookup for this long, keeping the operation in
    /// `Signing`.
    pub delay: Mutex<Option<Duration>>,
}

#[async_trait]
impl KeyProvider for FakeKeys {
    async fn private_key(
        &self,
        pin: &SecretString,
        chain: Chain,
        _address: &str,
    ) -> Result<Zeroizing<[u8; 32]>, OperationError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if pin.expose_secret() != PIN {
            return Err(OperationError::KeyDerivation("incorrect PIN".into()));
        }
        if let Some(key) = *self.override_key.lock().unwrap() {
            return Ok(Zeroizing::new(key));
        }
        let key = match chain.kind() {
            ChainKind::Evm => EVM_KEY,
            ChainKind::Bitcoin => BTC_KEY,
            ChainKind::Solana => SOL_KEY,
        };
        Ok(Zeroizing::new(key))
    }
}

// ─── Relay ──────────────────────────────────────────────────────────

pub struct RelayState {
    pub evm_estimate: EvmFeeEstimate,
    pub transaction_count: u64,
    /// Fee lookups that fail with a network error before one succeeds.
    pub fee_failures: usize,
    pub fee_calls: usize,
    /// Broadcasts that fail before one succeeds.
    pub post_failures: usize,
    pub posted: Vec<(Chain, String, bool)>,
    pub network_fee: NetworkFee,
    pub blockhash: [u8; 32],
    pub priority_fee: PriorityFee,
}

pub struct FakeRelay {
    pub state: Mutex<RelayState>,
}

impl Default for FakeRelay {
    fn default() -> Self {
        Self {
            state: Mutex::new(RelayState {
                evm_estimate: EvmFeeEstimate {
                    gas_limit: U256::from(21_000u64),
                    max_fee_per_gas: U256::from(30_000_000_000u64),
                    max_priority_fee_per_gas: U256::from(1_000_000_000u64),
                },
                transaction_count: 4,
                fee_failures: 0,
                fee_calls: 0,
                post_failures: 0,
                posted: Vec::new(),
                network_fee: NetworkFee {
                    rate_sat_vb: 10,
                    minimum_fee_sat: 1_000,
                    incremental_relay_rate_sat_vb: 1,
                },
                blockhash: [0x5a; 32],
                priority_fee: PriorityFee {
                    unit_price_micro_lamports: 1_000_000,
                    unit_limit: 200_000,
                },
            }),
        }
    }
}

impl FakeRelay {
    pub fn posted(&self) -> Vec<(Chain, String, bool)> {
        self.state.lock().unwrap().posted.clone()
    }

    fn fee_attempt(&self) -> Result<(), OperationError> {
        let mut state = self.state.lock().unwrap();
        state.fee_calls += 1;
        if state.fee_failures > 0 {
            state.fee_failures -= 1;
            return Err(OperationError::Network("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RelayApi for FakeRelay {
    async fn post_transaction(
        &self,
        chain: Chain,
        _from: &str,
        raw: &str,
        fee_waived: bool,
    ) -> Result<PostedTransaction, OperationError> {
        let mut state = self.state.lock().unwrap();
        if state.post_failures > 0 {
            state.post_failures -= 1;
            return Err(OperationError::Broadcast("relay unavailable".into()));
        }
        state.posted.push((chain, raw.to_owned(), fee_waived));
        Ok(PostedTransaction {
            hash: format!("hash-{}", state.posted.len()),
            raw: raw.to_owned(),
            replacement_nonce: None,
        })
    }

    async fn estimate_evm_fee(
        &self,
        _chain: Chain,
        _from: &str,
        _to: &Address,
        _value: U256,
        _data: &[u8],
    ) -> Result<EvmFeeEstimate, OperationError> {
        self.fee_attempt()?;
        Ok(self.state.lock().unwrap().evm_estimate)
    }

    async fn evm_transaction_count(&self, _chain: Chain, _address: &str) -> Result<u64, OperationError> {
        Ok(self.state.lock().unwrap().transaction_count)
    }

    async fn simulate_evm(&self, _chain: Chain, _from: &str, raw_hex: &str) -> Result<Simulation, OperationError> {
        Ok(Simulation::Remote(serde_json::json!({ "raw": raw_hex })))
    }

    async fn simulate_solana(&self, raw_base64: &str) -> Result<Simulation, OperationError> {
        Ok(Simulation::Remote(serde_json::json!({ "raw": raw_base64 })))
    }

    async fn solana_latest_blockhash(&self) -> Result<String, OperationError> {
        Ok(bs58::encode(self.state.lock().unwrap().blockhash).into_string())
    }

    async fn solana_priority_fee(&self, _raw_base64: &str) -> Result<PriorityFee, OperationError> {
        self.fee_attempt()?;
        Ok(self.state.lock().unwrap().priority_fee)
    }

    async fn bitcoin_network_fee(&self, _chain: Chain) -> Result<NetworkFee, OperationError> {
        self.fee_attempt()?;
        Ok(self.state.lock().unwrap().network_fee)
    }
}

// ─── Storage ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StoreState {
    pub unspent: Vec<Output>,
    /// Every known output, regardless of status.
    pub outputs: Vec<Output>,
    pub max_nonce: Option<u64>,
    pub saved: Vec<TransactionRecord>,
}

#[derive(Default)]
pub struct FakeStore {
    pub state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn saved(&self) -> Vec<TransactionRecord> {
        self.state.lock().unwrap().saved.clone()
    }
}

#[async_trait]
impl WalletStore for FakeStore {
    async fn unspent_outputs(&self, _chain: Chain, _address: &str) -> Result<Vec<Output>, OperationError> {
        Ok(self.state.lock().unwrap().unspent.clone())
    }

    async fn outputs(&self, ids: &[String]) -> Result<Vec<Output>, OperationError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .outputs
            .iter()
            .filter(|output| ids.contains(&output.id))
            .cloned()
            .collect())
    }

    async fn max_nonce(&self, _chain: Chain, _address: &str) -> Result<Option<u64>, OperationError> {
        Ok(self.state.lock().unwrap().max_nonce)
    }

    async fn save_transaction(&self, record: TransactionRecord) -> Result<(), OperationError> {
        self.state.lock().unwrap().saved.push(record);
        Ok(())
    }
}

pub struct FakeTokens {
    pub balance: Mutex<BigDecimal>,
}

impl Default for FakeTokens {
    fn default() -> Self {
        Self {
            balance: Mutex::new(BigDecimal::from(10)),
        }
    }
}

impl TokenStore for FakeTokens {
    fn fee_token(&self, chain: Chain) -> Option<FeeToken> {
        let (asset_id, symbol) = match chain.kind() {
            ChainKind::Evm => ("eth", "ETH"),
            ChainKind::Bitcoin => ("btc", "BTC"),
            ChainKind::Solana => ("sol", "SOL"),
        };
        Some(FeeToken {
            asset_id: asset_id.into(),
            symbol: symbol.into(),
            decimals: chain.native_decimals(),
            fiat_price: BigDecimal::from(100),
            balance: self.balance.lock().unwrap().clone(),
        })
    }
}

pub struct FakeAddresses {
    pub addresses: Vec<(Chain, String)>,
}

impl Default for FakeAddresses {
    fn default() -> Self {
        Self {
            addresses: vec![
                (Chain::Ethereum, evm_address()),
                (Chain::Polygon, evm_address()),
                (Chain::Bitcoin, btc_address()),
                (Chain::Solana, sol_address()),
            ],
        }
    }
}

impl AddressBook for FakeAddresses {
    fn address(&self, chain: Chain) -> Option<String> {
        self.addresses
            .iter()
            .find(|(candidate, _)| *candidate == chain)
            .map(|(_, address)| address.clone())
    }

    fn addresses(&self) -> Vec<(Chain, String)> {
        self.addresses.clone()
    }
}

// ─── Peer ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakePeer {
    pub responses: Mutex<Vec<(String, u64, RpcResponse)>>,
    pub approved: Mutex<Vec<(u64, Vec<String>)>>,
    pub rejected: Mutex<Vec<(u64, RejectReason)>>,
    pub paired: Mutex<Vec<String>>,
}

impl FakePeer {
    pub fn responses(&self) -> Vec<(String, u64, RpcResponse)> {
        self.responses.lock().unwrap().clone()
    }

    pub fn response_count(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl PeerClient for FakePeer {
    async fn respond(&self, topic: &str, request_id: u64, response: RpcResponse) -> Result<(), OperationError> {
        self.responses
            .lock()
            .unwrap()
            .push((topic.to_owned(), request_id, response));
        Ok(())
    }

    async fn pair(&self, uri: &str) -> Result<(), ConnectError> {
        if !uri.starts_with("wc:") {
            return Err(ConnectError::Pairing(format!("invalid uri: {uri}")));
        }
        self.paired.lock().unwrap().push(uri.to_owned());
        Ok(())
    }

    async fn approve_session(&self, proposal_id: u64, accounts: Vec<String>) -> Result<(), OperationError> {
        self.approved.lock().unwrap().push((proposal_id, accounts));
        Ok(())
    }

    async fn reject_session(&self, proposal_id: u64, reason: RejectReason) -> Result<(), OperationError> {
        self.rejected.lock().unwrap().push((proposal_id, reason));
        Ok(())
    }
}

// ─── UI ─────────────────────────────────────────────────────────────

pub enum Presented {
    Transfer(OperationHandle, Proposer),
    Signing(SignHandle, Proposer),
    InsufficientBalance(BalanceRequirement),
    Rejection(String, String),
    Proposal(SessionProposal, Vec<String>),
}

#[derive(Default)]
pub struct FakePresenter {
    pub presented: Mutex<Vec<Presented>>,
}

impl FakePresenter {
    pub fn take(&self) -> Vec<Presented> {
        std::mem::take(&mut *self.presented.lock().unwrap())
    }
}

impl Presenter for FakePresenter {
    fn present_transfer(&self, operation: OperationHandle, proposer: Proposer) {
        self.presented.lock().unwrap().push(Presented::Transfer(operation, proposer));
    }

    fn present_signing(&self, operation: SignHandle, proposer: Proposer) {
        self.presented.lock().unwrap().push(Presented::Signing(operation, proposer));
    }

    fn present_insufficient_balance(&self, requirement: BalanceRequirement) {
        self.presented
            .lock()
            .unwrap()
            .push(Presented::InsufficientBalance(requirement));
    }

    fn present_rejection(&self, title: &str, message: &str) {
        self.presented
            .lock()
            .unwrap()
            .push(Presented::Rejection(title.to_owned(), message.to_owned()));
    }

    fn present_proposal(&self, proposal: SessionProposal, accounts: Vec<String>) {
        self.presented
            .lock()
            .unwrap()
            .push(Presented::Proposal(proposal, accounts));
    }
}

// ─── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub keys: Arc<FakeKeys>,
    pub relay: Arc<FakeRelay>,
    pub store: Arc<FakeStore>,
    pub tokens: Arc<FakeTokens>,
    pub addresses: Arc<FakeAddresses>,
    pub peer: Arc<FakePeer>,
    pub presenter: Arc<FakePresenter>,
    pub config: OperationConfig,
}

impl Default for Harness {
    fn default() -> Self {
        wallet_ops::logging::init_logging();
        Self {
            keys: Arc::default(),
            relay: Arc::default(),
            store: Arc::default(),
            tokens: Arc::default(),
            addresses: Arc::default(),
            peer: Arc::default(),
            presenter: Arc::default(),
            config: OperationConfig::default(),
        }
    }
}

impl Harness {
    pub fn services(&self) -> Services {
        Services {
            keys: self.keys.clone(),
            relay: self.relay.clone(),
            store: self.store.clone(),
            tokens: self.tokens.clone(),
            config: self.config.clone(),
        }
    }

    pub fn context(&self) -> RouterContext {
        RouterContext {
            services: self.services(),
            addresses: self.addresses.clone(),
            client: self.peer.clone(),
            presenter: self.presenter.clone(),
        }
    }
}
