use alloy_primitives::{keccak256, Address, B256, U256};

use crate::error::EthError;
use crate::rlp::{self, RlpValue};
use crate::signer;

/// EIP-2718 type byte of a dynamic-fee transaction.
pub const EIP1559_TX_TYPE: u8 = 0x02;

/// Number of leading fields that must be present in a decoded envelope.
const REQUIRED_FIELDS: usize = 8;

/// An EIP-1559 (type 2) transaction.
///
/// Fee fields and the nonce stay `None` until the fee quote and nonce are
/// known; missing values encode as the RLP integer zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Transaction {
    pub chain_id: u64,
    pub nonce: Option<u64>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub gas_limit: Option<U256>,
    pub destination: Address,
    /// Value in wei.
    pub amount: U256,
    pub data: Vec<u8>,
}

/// A transaction together with its signature components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: Eip1559Transaction,
    /// Recovery bit, 0 or 1.
    pub y_parity: u8,
    /// Minimal big-endian `r`, no leading zero bytes.
    pub r: Vec<u8>,
    /// Minimal big-endian `s`, no leading zero bytes.
    pub s: Vec<u8>,
}

impl Eip1559Transaction {
    /// Returns the nine unsigned fields in canonical order:
    /// `[chain_id, nonce, max_priority_fee_per_gas, max_fee_per_gas,
    /// gas_limit, destination, amount, data, access_list]`.
    pub fn rlp_fields(&self) -> Vec<RlpValue> {
        vec![
            RlpValue::from(self.chain_id),
            RlpValue::from(self.nonce.unwrap_or_default()),
            RlpValue::from(self.max_priority_fee_per_gas.unwrap_or_default()),
            RlpValue::from(self.max_fee_per_gas.unwrap_or_default()),
            RlpValue::from(self.gas_limit.unwrap_or_default()),
            RlpValue::from(self.destination),
            RlpValue::from(self.amount),
            RlpValue::Bytes(self.data.clone()),
            RlpValue::List(Vec::new()),
        ]
    }

    /// Encodes the unsigned envelope `0x02 || rlp(fields)`.
    pub fn raw(&self) -> Vec<u8> {
        envelope(self.rlp_fields())
    }

    /// Keccak-256 of [`raw`](Self::raw), the digest a signer commits to.
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.raw())
    }

    /// Decodes a `0x02`-prefixed hex envelope.
    ///
    /// Any access-list entries are rejected since they cannot be carried
    /// through re-encoding. Signature fields of a signed envelope are ignored.
    pub fn decode_hex(input: &str) -> Result<Self, EthError> {
        let body = input.strip_prefix("0x02").ok_or_else(|| {
            EthError::UnsupportedTransactionType(input.chars().take(4).collect())
        })?;
        let bytes = hex::decode(body).map_err(|e| EthError::EncodingError(e.to_string()))?;
        Self::decode_fields(&bytes)
    }

    /// Decodes a binary envelope starting with the type byte.
    pub fn decode(raw: &[u8]) -> Result<Self, EthError> {
        match raw.split_first() {
            Some((&EIP1559_TX_TYPE, body)) => Self::decode_fields(body),
            Some((other, _)) => Err(EthError::UnsupportedTransactionType(format!("0x{other:02x}"))),
            None => Err(EthError::UnsupportedTransactionType("empty input".into())),
        }
    }

    fn decode_fields(body: &[u8]) -> Result<Self, EthError> {
        let decoded = rlp::decode(body)?;
        let fields = decoded.as_list()?;
        if fields.len() < REQUIRED_FIELDS {
            return Err(EthError::TooFewFields(fields.len()));
        }
        if let Some(access_list) = fields.get(8) {
            let entries = access_list.as_list()?.len();
            if entries > 0 {
                return Err(EthError::UnsupportedAccessList(entries));
            }
        }
        Ok(Self {
            chain_id: fields[0].as_u64()?,
            nonce: Some(fields[1].as_u64()?),
            max_priority_fee_per_gas: Some(fields[2].as_u256()?),
            max_fee_per_gas: Some(fields[3].as_u256()?),
            gas_limit: Some(fields[4].as_u256()?),
            destination: fields[5].as_address()?,
            amount: fields[6].as_u256()?,
            data: fields[7].as_bytes()?.to_vec(),
        })
    }

    /// Attaches a 65-byte recoverable signature `r || s || v`.
    ///
    /// `v` may be the raw recovery bit (0/1) or its legacy form (27/28).
    pub fn with_signature(self, signature: &[u8; 65]) -> Result<SignedTransaction, EthError> {
        let y_parity = match signature[64] {
            0 | 27 => 0,
            1 | 28 => 1,
            other => {
                return Err(EthError::InvalidSignature(format!(
                    "recovery byte {other} is not a parity bit"
                )))
            }
        };
        Ok(SignedTransaction {
            transaction: self,
            y_parity,
            r: strip_leading_zeros(&signature[..32]),
            s: strip_leading_zeros(&signature[32..64]),
        })
    }

    /// Signs the transaction with a secp256k1 private key.
    pub fn sign(self, private_key: &[u8; 32]) -> Result<SignedTransaction, EthError> {
        let signature = signer::sign_hash(&self.signing_hash(), private_key)?;
        self.with_signature(&signature)
    }
}

impl SignedTransaction {
    /// Encodes `0x02 || rlp(unsigned fields ++ [y_parity, r, s])`.
    pub fn raw(&self) -> Vec<u8> {
        let mut fields = self.transaction.rlp_fields();
        fields.push(RlpValue::from(u64::from(self.y_parity)));
        fields.push(RlpValue::Bytes(self.r.clone()));
        fields.push(RlpValue::Bytes(self.s.clone()));
        envelope(fields)
    }

    /// `0x`-prefixed hex of [`raw`](Self::raw), the form relays accept.
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(self.raw()))
    }

    /// Transaction hash, Keccak-256 of the signed envelope.
    pub fn hash(&self) -> B256 {
        keccak256(self.raw())
    }
}

fn envelope(fields: Vec<RlpValue>) -> Vec<u8> {
    let encoded = RlpValue::List(fields).encoded();
    let mut out = Vec::with_capacity(1 + encoded.len());
    out.push(EIP1559_TX_TYPE);
    out.extend_from_slice(&encoded);
    out
}

fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}
