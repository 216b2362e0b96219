//! Ethereum/EVM chain support for wallet operations.
//!
//! This crate provides:
//! - A Recursive Length Prefix codec over byte strings and nested lists
//! - The EIP-1559 transaction model: encoding, decoding, signing and hashing
//! - EIP-55 address parsing and key-to-address derivation
//! - EIP-191 personal-message and EIP-712 typed-data signing
//! - ERC-20 `transfer` calldata encoding

pub mod address;
pub mod erc20;
pub mod error;
pub mod rlp;
pub mod signer;
pub mod transaction;

pub use alloy_primitives::{Address, B256, U256};
pub use error::{EthError, RlpError};
pub use rlp::RlpValue;
pub use transaction::{Eip1559Transaction, SignedTransaction};
