//! Solana addresses and Ed25519 keys.
//!
//! A Solana address is the Base58 encoding of a raw 32-byte Ed25519 public
//! key. There is no hashing step.

use ed25519_dalek::{Signer, SigningKey};

use crate::error::SolError;

/// Encode 32 bytes as a Solana address (Base58 string).
pub fn bytes_to_address(bytes: &[u8; 32]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode a Solana address string to its 32-byte representation.
pub fn address_to_bytes(address: &str) -> Result<[u8; 32], SolError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| SolError::InvalidAddress(format!("base58 decode failed: {e}")))?;

    bytes.try_into().map_err(|v: Vec<u8>| {
        SolError::InvalidAddress(format!("expected 32 bytes, got {}", v.len()))
    })
}

/// Public key of a 32-byte Ed25519 seed.
pub fn public_key(private_key: &[u8; 32]) -> [u8; 32] {
    SigningKey::from_bytes(private_key).verifying_key().to_bytes()
}

/// Address controlled by a 32-byte Ed25519 seed.
pub fn private_key_to_address(private_key: &[u8; 32]) -> String {
    bytes_to_address(&public_key(private_key))
}

/// Signs an off-chain message (`solana_signMessage`), returning the
/// signature as Base58.
pub fn sign_message(message: &[u8], private_key: &[u8; 32]) -> String {
    let signature = SigningKey::from_bytes(private_key).sign(message);
    bs58::encode(signature.to_bytes()).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, VerifyingKey};

    #[test]
    fn system_program_address() {
        assert_eq!(bytes_to_address(&[0u8; 32]), "11111111111111111111111111111111");
    }

    #[test]
    fn roundtrip_encode_decode() {
        let address = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
        let bytes = address_to_bytes(address).unwrap();
        assert_eq!(bytes_to_address(&bytes), address);
    }

    #[test]
    fn garbage_address_is_rejected() {
        assert!(address_to_bytes("###invalid###").is_err());
    }

    #[test]
    fn short_address_is_rejected() {
        // "1" decodes to a single zero byte.
        assert!(address_to_bytes("1").is_err());
    }

    #[test]
    fn private_key_address_matches_public_key() {
        let key = [0x42u8; 32];
        let address = private_key_to_address(&key);
        assert_eq!(address_to_bytes(&address).unwrap(), public_key(&key));
    }

    #[test]
    fn message_signature_verifies() {
        let key = [0x42u8; 32];
        let encoded = sign_message(b"hello solana", &key);
        let bytes: [u8; 64] = bs58::decode(&encoded).into_vec().unwrap().try_into().unwrap();
        let verifying = VerifyingKey::from_bytes(&public_key(&key)).unwrap();
        assert!(verifying
            .verify_strict(b"hello solana", &Signature::from_bytes(&bytes))
            .is_ok());
    }
}
