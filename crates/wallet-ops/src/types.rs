use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use chain_btc::BtcNetwork;

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    Bitcoin,
    BitcoinTestnet,
    Ethereum,
    Polygon,
    Arbitrum,
    Base,
    Optimism,
    Bsc,
    Avalanche,
    Solana,
    SolanaDevnet,
    // Testnets
    Sepolia,
    PolygonAmoy,
}

/// Transaction model family a chain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Bitcoin,
    Evm,
    Solana,
}

impl Chain {
    pub const ALL: [Chain; 13] = [
        Chain::Bitcoin,
        Chain::BitcoinTestnet,
        Chain::Ethereum,
        Chain::Polygon,
        Chain::Arbitrum,
        Chain::Base,
        Chain::Optimism,
        Chain::Bsc,
        Chain::Avalanche,
        Chain::Solana,
        Chain::SolanaDevnet,
        Chain::Sepolia,
        Chain::PolygonAmoy,
    ];

    pub fn kind(&self) -> ChainKind {
        match self {
            Chain::Bitcoin | Chain::BitcoinTestnet => ChainKind::Bitcoin,
            Chain::Solana | Chain::SolanaDevnet => ChainKind::Solana,
            _ => ChainKind::Evm,
        }
    }

    /// EIP-155 chain ID, for EVM chains only.
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self {
            Chain::Ethereum => Some(1),
            Chain::Optimism => Some(10),
            Chain::Bsc => Some(56),
            Chain::Polygon => Some(137),
            Chain::Base => Some(8453),
            Chain::Arbitrum => Some(42161),
            Chain::Avalanche => Some(43114),
            Chain::PolygonAmoy => Some(80002),
            Chain::Sepolia => Some(11155111),
            _ => None,
        }
    }

    pub fn btc_network(&self) -> Option<BtcNetwork> {
        match self {
            Chain::Bitcoin => Some(BtcNetwork::Mainnet),
            Chain::BitcoinTestnet => Some(BtcNetwork::Testnet),
            _ => None,
        }
    }

    /// CAIP-2 blockchain identifier used by dapp sessions.
    pub fn caip2(&self) -> String {
        match self {
            Chain::Bitcoin => format!("bip122:{}", BtcNetwork::Mainnet.genesis_reference()),
            Chain::BitcoinTestnet => format!("bip122:{}", BtcNetwork::Testnet.genesis_reference()),
            Chain::Solana => "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp".into(),
            Chain::SolanaDevnet => "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1".into(),
            evm => format!("eip155:{}", evm.evm_chain_id().unwrap_or_default()),
        }
    }

    pub fn from_caip2(caip2: &str) -> Option<Chain> {
        if let Some(reference) = caip2.strip_prefix("bip122:") {
            return match BtcNetwork::from_genesis_reference(reference)? {
                BtcNetwork::Mainnet => Some(Chain::Bitcoin),
                BtcNetwork::Testnet => Some(Chain::BitcoinTestnet),
            };
        }
        Chain::ALL.into_iter().find(|chain| chain.caip2() == caip2)
    }

    /// Display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "Bitcoin",
            Chain::BitcoinTestnet => "Bitcoin Testnet",
            Chain::Ethereum => "Ethereum",
            Chain::Polygon => "Polygon",
            Chain::Arbitrum => "Arbitrum One",
            Chain::Base => "Base",
            Chain::Optimism => "Optimism",
            Chain::Bsc => "BNB Smart Chain",
            Chain::Avalanche => "Avalanche C-Chain",
            Chain::Solana => "Solana",
            Chain::SolanaDevnet => "Solana Devnet",
            Chain::Sepolia => "Sepolia Testnet",
            Chain::PolygonAmoy => "Polygon Amoy Testnet",
        }
    }

    /// Decimals of the native token.
    pub fn native_decimals(&self) -> u32 {
        match self.kind() {
            ChainKind::Bitcoin => 8,
            ChainKind::Evm => 18,
            ChainKind::Solana => 9,
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// The token network fees are paid in, with its price and the wallet's
/// current balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeToken {
    pub asset_id: String,
    pub symbol: String,
    pub decimals: u32,
    /// Price of one token in the display currency.
    pub fiat_price: BigDecimal,
    pub balance: BigDecimal,
}

/// Fee in token units with its fiat estimate. Replaced as a whole on every
/// successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fee {
    pub amount: BigDecimal,
    pub fiat: BigDecimal,
    /// EVM only: max fee per gas in gwei, rounded up to 2 decimals.
    pub gwei_per_gas: Option<BigDecimal>,
}

impl Fee {
    pub fn new(amount: BigDecimal, token: &FeeToken) -> Self {
        let fiat = &amount * &token.fiat_price;
        Self {
            amount,
            fiat,
            gwei_per_gas: None,
        }
    }

    pub fn with_gwei_per_gas(mut self, gwei: BigDecimal) -> Self {
        self.gwei_per_gas = Some(gwei);
        self
    }
}

/// An amount of a token the wallet must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRequirement {
    pub token: FeeToken,
    pub amount: BigDecimal,
}

impl BalanceRequirement {
    pub fn is_sufficient(&self) -> bool {
        self.token.balance >= self.amount
    }
}

/// Expected effect of a transaction on the wallet's balances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Simulation {
    BalanceChange { asset_id: String, amount: BigDecimal },
    Empty,
    /// Returned by the relay for transactions the wallet did not build.
    Remote(serde_json::Value),
}
