use bitcoin::Network;

/// Bitcoin network a wallet address lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
}

impl BtcNetwork {
    pub const ALL: [BtcNetwork; 2] = [BtcNetwork::Mainnet, BtcNetwork::Testnet];

    pub fn to_bitcoin_network(self) -> Network {
        match self {
            BtcNetwork::Mainnet => Network::Bitcoin,
            BtcNetwork::Testnet => Network::Testnet,
        }
    }

    /// Leading 32 hex digits of the genesis block hash, the reference part
    /// of a `bip122:` CAIP-2 identifier.
    pub fn genesis_reference(self) -> &'static str {
        match self {
            BtcNetwork::Mainnet => "000000000019d6689c085ae165831e93",
            BtcNetwork::Testnet => "000000000933ea01ad0ee984209779ba",
        }
    }

    pub fn from_genesis_reference(reference: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|network| network.genesis_reference() == reference)
    }
}
