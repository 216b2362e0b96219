//! Externally built transactions received as serialized wire bytes.
//!
//! Supports legacy and v0 messages. Only the parts needed to sign and
//! re-anchor the transaction are interpreted: the signature slots, the
//! header, the static account keys and the recent blockhash.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::{Signer, SigningKey};

use crate::address::bytes_to_address;
use crate::error::SolError;
use crate::transaction::decode_compact_u16;

const VERSION_PREFIX_MASK: u8 = 0x80;
const SIGNATURE_LEN: usize = 64;
const KEY_LEN: usize = 32;

/// Message format of a wire transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageVersion {
    Legacy,
    V0,
}

#[derive(Debug, Clone)]
pub struct WireTransaction {
    signatures: Vec<[u8; SIGNATURE_LEN]>,
    message: Vec<u8>,
    version: MessageVersion,
    num_required_signatures: u8,
    account_keys: Vec<[u8; KEY_LEN]>,
    blockhash_offset: usize,
}

impl WireTransaction {
    pub fn parse(bytes: &[u8]) -> Result<Self, SolError> {
        let (num_signatures, mut offset) = decode_compact_u16(bytes)?;
        let mut signatures = Vec::with_capacity(num_signatures as usize);
        for _ in 0..num_signatures {
            let slot = take(bytes, offset, SIGNATURE_LEN)?;
            let mut signature = [0u8; SIGNATURE_LEN];
            signature.copy_from_slice(slot);
            signatures.push(signature);
            offset += SIGNATURE_LEN;
        }
        let message = bytes[offset..].to_vec();

        let mut cursor = 0;
        let first = *take(&message, cursor, 1)?.first().unwrap_or(&0);
        let version = if first & VERSION_PREFIX_MASK != 0 {
            let version = first & !VERSION_PREFIX_MASK;
            if version != 0 {
                return Err(SolError::UnsupportedVersion(version));
            }
            cursor += 1;
            MessageVersion::V0
        } else {
            MessageVersion::Legacy
        };

        let header = take(&message, cursor, 3)?;
        let num_required_signatures = header[0];
        cursor += 3;

        let (num_keys, used) = decode_compact_u16(message.get(cursor..).unwrap_or_default())?;
        cursor += used;
        let mut account_keys = Vec::with_capacity(num_keys as usize);
        for _ in 0..num_keys {
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(take(&message, cursor, KEY_LEN)?);
            account_keys.push(key);
            cursor += KEY_LEN;
        }

        take(&message, cursor, KEY_LEN)?;
        let blockhash_offset = cursor;

        if signatures.len() != num_required_signatures as usize {
            return Err(SolError::MalformedTransaction(format!(
                "{} signature slots for {} required signers",
                signatures.len(),
                num_required_signatures
            )));
        }
        if account_keys.len() < num_required_signatures as usize {
            return Err(SolError::MalformedTransaction(
                "fewer account keys than signers".into(),
            ));
        }

        Ok(Self {
            signatures,
            message,
            version,
            num_required_signatures,
            account_keys,
            blockhash_offset,
        })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, SolError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| SolError::InvalidBase64(e.to_string()))?;
        Self::parse(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = crate::transaction::encode_compact_u16(self.signatures.len() as u16);
        for signature in &self.signatures {
            out.extend_from_slice(signature);
        }
        out.extend_from_slice(&self.message);
        out
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    pub fn version(&self) -> MessageVersion {
        self.version
    }

    pub fn num_required_signatures(&self) -> u8 {
        self.num_required_signatures
    }

    /// Signature fee: one `lamports_per_signature` per required signer.
    pub fn fee(&self, lamports_per_signature: u64) -> u64 {
        (self.num_required_signatures as u64).saturating_mul(lamports_per_signature)
    }

    pub fn recent_blockhash(&self) -> [u8; KEY_LEN] {
        let mut hash = [0u8; KEY_LEN];
        hash.copy_from_slice(&self.message[self.blockhash_offset..self.blockhash_offset + KEY_LEN]);
        hash
    }

    /// Replaces the recent blockhash. Existing signatures become invalid
    /// and are cleared.
    pub fn set_recent_blockhash(&mut self, blockhash: &[u8; KEY_LEN]) {
        self.message[self.blockhash_offset..self.blockhash_offset + KEY_LEN]
            .copy_from_slice(blockhash);
        for signature in &mut self.signatures {
            *signature = [0u8; SIGNATURE_LEN];
        }
    }

    /// Signs the message into the slot belonging to `private_key`.
    pub fn sign(&mut self, private_key: &[u8; 32]) -> Result<[u8; SIGNATURE_LEN], SolError> {
        let signing_key = SigningKey::from_bytes(private_key);
        let public = signing_key.verifying_key().to_bytes();
        let slot = self.account_keys[..self.num_required_signatures as usize]
            .iter()
            .position(|key| *key == public)
            .ok_or_else(|| SolError::NotASigner(bytes_to_address(&public)))?;

        let signature = signing_key.sign(&self.message).to_bytes();
        self.signatures[slot] = signature;
        Ok(signature)
    }
}

fn take(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], SolError> {
    bytes
        .get(offset..offset + len)
        .ok_or_else(|| SolError::MalformedTransaction("unexpected end of transaction".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::public_key;
    use crate::transaction::{build_sol_transfer, serialize_message, sign_transaction};

    const SEED: [u8; 32] = [7u8; 32];

    fn unsigned_legacy() -> Vec<u8> {
        let tx = build_sol_transfer(&public_key(&SEED), &[2u8; 32], 10, &[0xab; 32], None).unwrap();
        let mut wire = vec![1u8];
        wire.extend_from_slice(&[0u8; 64]);
        wire.extend_from_slice(&serialize_message(&tx));
        wire
    }

    fn v0_from_legacy(legacy: &[u8]) -> Vec<u8> {
        let mut wire = legacy[..65].to_vec();
        wire.push(0x80);
        wire.extend_from_slice(&legacy[65..]);
        // empty address table lookups
        wire.push(0);
        wire
    }

    #[test]
    fn parses_legacy_message() {
        let tx = WireTransaction::parse(&unsigned_legacy()).unwrap();
        assert_eq!(tx.version(), MessageVersion::Legacy);
        assert_eq!(tx.num_required_signatures(), 1);
        assert_eq!(tx.recent_blockhash(), [0xab; 32]);
        assert_eq!(tx.fee(5_000), 5_000);
    }

    #[test]
    fn parses_v0_message() {
        let tx = WireTransaction::parse(&v0_from_legacy(&unsigned_legacy())).unwrap();
        assert_eq!(tx.version(), MessageVersion::V0);
        assert_eq!(tx.recent_blockhash(), [0xab; 32]);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut wire = v0_from_legacy(&unsigned_legacy());
        wire[65] = 0x81;
        assert!(matches!(
            WireTransaction::parse(&wire).unwrap_err(),
            SolError::UnsupportedVersion(1)
        ));
    }

    #[test]
    fn rejects_mismatched_signature_count() {
        let mut wire = unsigned_legacy();
        wire[0] = 0;
        wire.drain(1..65);
        assert!(matches!(
            WireTransaction::parse(&wire),
            Err(SolError::MalformedTransaction(_))
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        let wire = unsigned_legacy();
        assert!(WireTransaction::parse(&wire[..100]).is_err());
    }

    #[test]
    fn signing_matches_builder_output() {
        let tx = build_sol_transfer(&public_key(&SEED), &[2u8; 32], 10, &[0xab; 32], None).unwrap();
        let expected = sign_transaction(&tx, &SEED).unwrap();

        let mut wire = WireTransaction::parse(&unsigned_legacy()).unwrap();
        wire.sign(&SEED).unwrap();
        assert_eq!(wire.to_bytes(), expected);
    }

    #[test]
    fn blockhash_replacement_clears_signatures() {
        let mut wire = WireTransaction::parse(&unsigned_legacy()).unwrap();
        wire.sign(&SEED).unwrap();
        wire.set_recent_blockhash(&[0xcd; 32]);
        assert_eq!(wire.recent_blockhash(), [0xcd; 32]);
        assert_eq!(&wire.to_bytes()[1..65], &[0u8; 64]);
    }

    #[test]
    fn foreign_key_cannot_sign() {
        let mut wire = WireTransaction::parse(&unsigned_legacy()).unwrap();
        assert!(matches!(wire.sign(&[9u8; 32]), Err(SolError::NotASigner(_))));
    }

    #[test]
    fn base64_roundtrip() {
        let wire = WireTransaction::parse(&unsigned_legacy()).unwrap();
        let again = WireTransaction::from_base64(&wire.to_base64()).unwrap();
        assert_eq!(again.to_bytes(), wire.to_bytes());
        assert!(matches!(
            WireTransaction::from_base64("not base64!"),
            Err(SolError::InvalidBase64(_))
        ));
    }
}
