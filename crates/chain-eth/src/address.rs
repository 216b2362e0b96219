use alloy_primitives::Address;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use sha3::{Digest, Keccak256};

use crate::error::EthError;

/// Parses a 0x-prefixed 40-hex-digit account address.
///
/// Mixed-case input must carry a valid EIP-55 checksum; all-lowercase and
/// all-uppercase input is accepted as is.
pub fn parse_address(address: &str) -> Result<Address, EthError> {
    let hex_part = strip_prefix(address)?;
    if hex_part.len() != 40 {
        return Err(EthError::InvalidAddress(format!(
            "expected 40 hex characters, got {}",
            hex_part.len()
        )));
    }
    let bytes = hex::decode(hex_part)
        .map_err(|e| EthError::InvalidAddress(format!("invalid hex: {e}")))?;
    let parsed = Address::from_slice(&bytes);

    let is_all_lower = hex_part.chars().all(|c| !c.is_ascii_uppercase());
    let is_all_upper = hex_part.chars().all(|c| !c.is_ascii_lowercase());
    if !is_all_lower && !is_all_upper && checksum_address(&parsed) != address {
        return Err(EthError::InvalidAddress(format!(
            "checksum mismatch for {address}"
        )));
    }
    Ok(parsed)
}

/// Renders an address with the EIP-55 mixed-case checksum.
pub fn checksum_address(address: &Address) -> String {
    let hex_part = hex::encode(address.as_slice());
    let hash = Keccak256::digest(hex_part.as_bytes());

    let mut checksummed = String::with_capacity(42);
    checksummed.push_str("0x");
    for (i, c) in hex_part.chars().enumerate() {
        // Each hex character maps to one nibble of the hash.
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            checksummed.push(c.to_ascii_uppercase());
        } else {
            checksummed.push(c);
        }
    }
    checksummed
}

/// Derives the account address controlled by a secp256k1 private key.
pub fn private_key_to_address(private_key: &[u8; 32]) -> Result<Address, EthError> {
    let signing_key = SigningKey::from_bytes(private_key.into())
        .map_err(|e| EthError::InvalidPrivateKey(e.to_string()))?;
    let uncompressed = PublicKey::from(signing_key.verifying_key()).to_encoded_point(false);
    pubkey_to_address(uncompressed.as_bytes())
}

/// Derives an address from an uncompressed (0x04-prefixed, 65-byte) public key.
///
/// The address is the last 20 bytes of Keccak-256 over the 64-byte key body.
pub fn pubkey_to_address(uncompressed_pubkey: &[u8]) -> Result<Address, EthError> {
    if uncompressed_pubkey.len() != 65 || uncompressed_pubkey[0] != 0x04 {
        return Err(EthError::InvalidPublicKey(
            "uncompressed key must be 65 bytes starting with 0x04".into(),
        ));
    }
    let hash = Keccak256::digest(&uncompressed_pubkey[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

fn strip_prefix(address: &str) -> Result<&str, EthError> {
    address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| EthError::InvalidAddress("address must start with 0x".into()))
}
