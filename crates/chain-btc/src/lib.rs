//! Bitcoin chain support for wallet operations.
//!
//! Provides P2WPKH address derivation, fee-driven output selection,
//! transaction signing with change tracking, raw transaction decoding, and
//! replace-by-fee planning for speed-up and cancellation.

pub mod address;
pub mod error;
pub mod fee;
pub mod network;
pub mod replacement;
pub mod transaction;
pub mod utxo;

pub use error::BtcError;
pub use network::BtcNetwork;
pub use utxo::{Output, OutputStatus};
