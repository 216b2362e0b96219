//! Dapp sessions: pairing, proposals and JSON-RPC request dispatch.

pub mod connect;
pub mod method;
pub mod request;
pub mod session;

use serde::{Deserialize, Serialize};
use url::Url;

/// Metadata a dapp publishes about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMetadata {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

impl PeerMetadata {
    /// Host part of the dapp URL, or the whole URL when it has none.
    pub fn host(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
            .unwrap_or_else(|| self.url.clone())
    }
}

/// Who is asking, as shown on confirmation screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposer {
    pub name: String,
    pub host: String,
}

impl From<&PeerMetadata> for Proposer {
    fn from(peer: &PeerMetadata) -> Self {
        Self {
            name: peer.name.clone(),
            host: peer.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(url: &str) -> PeerMetadata {
        PeerMetadata {
            name: "Swap".into(),
            url: url.into(),
            icons: Vec::new(),
        }
    }

    #[test]
    fn host_strips_scheme_and_path() {
        assert_eq!(peer("https://app.example.org/swap?x=1").host(), "app.example.org");
        assert_eq!(peer("app.example.org").host(), "app.example.org");
    }

    #[test]
    fn host_drops_port_and_userinfo() {
        assert_eq!(peer("https://app.example.org:8443/x").host(), "app.example.org");
        assert_eq!(peer("https://user@app.example.org/").host(), "app.example.org");
    }

    #[test]
    fn host_falls_back_to_url() {
        assert_eq!(peer("https://").host(), "https://");
    }

    #[test]
    fn proposer_from_peer() {
        let proposer = Proposer::from(&peer("https://dapp.io/"));
        assert_eq!(proposer.name, "Swap");
        assert_eq!(proposer.host, "dapp.io");
    }
}
