use std::fmt;
use std::str::FromStr;

/// JSON-RPC methods a dapp may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    PersonalSign,
    /// Always refused.
    EthSign,
    EthSignTypedData,
    EthSignTypedDataV4,
    /// Always refused.
    EthSignTransaction,
    EthSendTransaction,
    SolanaSignMessage,
    SolanaSignTransaction,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::PersonalSign,
        Method::EthSign,
        Method::EthSignTypedData,
        Method::EthSignTypedDataV4,
        Method::EthSignTransaction,
        Method::EthSendTransaction,
        Method::SolanaSignMessage,
        Method::SolanaSignTransaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::PersonalSign => "personal_sign",
            Method::EthSign => "eth_sign",
            Method::EthSignTypedData => "eth_signTypedData",
            Method::EthSignTypedDataV4 => "eth_signTypedData_v4",
            Method::EthSignTransaction => "eth_signTransaction",
            Method::EthSendTransaction => "eth_sendTransaction",
            Method::SolanaSignMessage => "solana_signMessage",
            Method::SolanaSignTransaction => "solana_signTransaction",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| UnknownMethod(s.to_owned()))
    }
}
