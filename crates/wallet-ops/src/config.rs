//! Tunables for operations and dapp sessions, loadable from TOML.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperationConfig {
    /// Delay between fee-quote attempts after a transient failure.
    pub fee_retry_delay_secs: u64,
    /// How long to wait for a session proposal after pairing.
    pub pairing_timeout_secs: u64,
    pub lamports_per_signature: u64,
    /// Divisor applied to EVM fee values when a low fee is requested once.
    pub low_fee_divisor: u64,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            fee_retry_delay_secs: 3,
            pairing_timeout_secs: 5,
            lamports_per_signature: 5_000,
            low_fee_divisor: 3,
        }
    }
}

impl OperationConfig {
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        if config.low_fee_divisor == 0 {
            return Err(ConfigError::Invalid("low_fee_divisor must be > 0".into()));
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn fee_retry_delay(&self) -> Duration {
        Duration::from_secs(self.fee_retry_delay_secs)
    }

    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_secs(self.pairing_timeout_secs)
    }
}
