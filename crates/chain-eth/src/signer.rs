//! secp256k1 signing for transactions, personal messages and EIP-712 data.

use alloy_dyn_abi::eip712::TypedData;
use alloy_primitives::B256;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use sha3::{Digest, Keccak256};

use crate::error::EthError;

/// Signs a 32-byte digest, returning `r || s || recovery_id` with the
/// recovery id as 0 or 1.
pub fn sign_hash(hash: &B256, private_key: &[u8; 32]) -> Result<[u8; 65], EthError> {
    let signing_key = SigningKey::from_bytes(private_key.into())
        .map_err(|e| EthError::InvalidPrivateKey(e.to_string()))?;

    let (signature, recovery_id): (Signature, RecoveryId) = signing_key
        .sign_prehash(hash.as_slice())
        .map_err(|e| EthError::SigningError(e.to_string()))?;

    let mut out = [0u8; 65];
    out[..32].copy_from_slice(&signature.r().to_bytes());
    out[32..64].copy_from_slice(&signature.s().to_bytes());
    out[64] = recovery_id.is_y_odd() as u8;
    Ok(out)
}

/// Hashes a message with the EIP-191 personal-message prefix.
pub fn personal_message_hash(message: &[u8]) -> B256 {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message);
    B256::from_slice(&hasher.finalize())
}

/// Signs a message using EIP-191 `personal_sign`.
///
/// Returns the 65-byte signature with `v` as 27 or 28.
pub fn sign_personal_message(message: &[u8], private_key: &[u8; 32]) -> Result<[u8; 65], EthError> {
    let mut signature = sign_hash(&personal_message_hash(message), private_key)?;
    signature[64] += 27;
    Ok(signature)
}

/// Computes the EIP-712 signing hash of a JSON typed-data document.
pub fn typed_data_hash(json: &str) -> Result<B256, EthError> {
    let typed: TypedData =
        serde_json::from_str(json).map_err(|e| EthError::InvalidTypedData(e.to_string()))?;
    typed
        .eip712_signing_hash()
        .map_err(|e| EthError::InvalidTypedData(e.to_string()))
}

/// Signs a JSON typed-data document (`eth_signTypedData_v4`).
///
/// Returns the 65-byte signature with `v` as 27 or 28.
pub fn sign_typed_data(json: &str, private_key: &[u8; 32]) -> Result<[u8; 65], EthError> {
    let mut signature = sign_hash(&typed_data_hash(json)?, private_key)?;
    signature[64] += 27;
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;

    const KEY_ONE: [u8; 32] = {
        let mut key = [0u8; 32];
        key[31] = 1;
        key
    };

    const MAIL: &str = r#"{
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"}
            ],
            "Person": [
                {"name": "name", "type": "string"},
                {"name": "wallet", "type": "address"}
            ],
            "Mail": [
                {"name": "from", "type": "Person"},
                {"name": "to", "type": "Person"},
                {"name": "contents", "type": "string"}
            ]
        },
        "primaryType": "Mail",
        "domain": {
            "name": "Ether Mail",
            "version": "1",
            "chainId": 1,
            "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
        },
        "message": {
            "from": {"name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"},
            "to": {"name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"},
            "contents": "Hello, Bob!"
        }
    }"#;

    #[test]
    fn personal_hash_matches_known_vector() {
        // keccak256("\x19Ethereum Signed Message:\n5hello")
        let hash = personal_message_hash(b"hello");
        assert_eq!(
            hash,
            B256::from(hex!(
                "50b2c43fd39106bafbba0da34fc430e1f91e3c96ea2acee2bc34119f92b37750"
            ))
        );
    }

    #[test]
    fn personal_signature_has_legacy_v() {
        let sig = sign_personal_message(b"hello", &KEY_ONE).unwrap();
        assert!(sig[64] == 27 || sig[64] == 28);
    }

    #[test]
    fn sign_hash_is_deterministic() {
        let hash = B256::repeat_byte(0x11);
        assert_eq!(sign_hash(&hash, &KEY_ONE).unwrap(), sign_hash(&hash, &KEY_ONE).unwrap());
    }

    #[test]
    fn sign_hash_rejects_zero_key() {
        assert!(sign_hash(&B256::ZERO, &[0u8; 32]).is_err());
    }

    #[test]
    fn typed_data_hash_matches_eip712_example() {
        let hash = typed_data_hash(MAIL).unwrap();
        assert_eq!(
            hash,
            B256::from(hex!(
                "be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
            ))
        );
    }

    #[test]
    fn malformed_typed_data_is_rejected() {
        let err = typed_data_hash("{\"types\": 1}").unwrap_err();
        assert!(matches!(err, EthError::InvalidTypedData(_)));
    }

    #[test]
    fn typed_data_signature_has_legacy_v() {
        let sig = sign_typed_data(MAIL, &KEY_ONE).unwrap();
        assert!(sig[64] == 27 || sig[64] == 28);
    }
}
