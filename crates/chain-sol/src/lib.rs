//! Solana chain support.
//!
//! Transactions are built and serialized by hand with `ed25519-dalek` for
//! signing and `bs58` for addresses. No `solana-sdk` dependency.
//!
//! - [`transaction`]: native transfers with optional compute-budget fees
//! - [`wire`]: signing dapp-supplied legacy and v0 transactions
//! - [`address`]: Base58 addresses and off-chain message signing

pub mod address;
pub mod error;
pub mod transaction;
pub mod wire;

pub use address::{address_to_bytes, bytes_to_address, private_key_to_address, public_key, sign_message};
pub use error::SolError;
pub use transaction::{build_sol_transfer, serialize_unsigned, sign_transaction, PriorityFee, SolTransaction};
pub use wire::{MessageVersion, WireTransaction};
