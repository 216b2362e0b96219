//! Recursive Length Prefix codec for byte strings and nested lists.
//!
//! Encoding goes through [`alloy_rlp::Encodable`] so an [`RlpValue`] can be
//! mixed freely with other alloy encoders. Decoding is hand written: every
//! element's size is taken from its own header, so list decoding is a single
//! linear pass over the input.

use alloy_primitives::{Address, U256};
use alloy_rlp::{BufMut, Encodable, Header};

use crate::error::RlpError;

/// Maximum list nesting accepted by [`decode`].
pub const MAX_DEPTH: usize = 64;

const SHORT_STRING: u8 = 0x80;
const LONG_STRING: u8 = 0xb7;
const SHORT_LIST: u8 = 0xc0;
const LONG_LIST: u8 = 0xf7;
/// Longest payload that fits the single-byte-prefix forms.
const SHORT_MAX: usize = 55;

/// A decoded or to-be-encoded RLP tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpValue {
    /// Absence of a value. Encodes to zero bytes and is what empty input
    /// decodes to.
    Empty,
    Bytes(Vec<u8>),
    List(Vec<RlpValue>),
}

impl RlpValue {
    /// Encodes the value into a fresh buffer.
    pub fn encoded(&self) -> Vec<u8> {
        alloy_rlp::encode(self)
    }

    fn kind(&self) -> &'static str {
        match self {
            RlpValue::Empty => "empty",
            RlpValue::Bytes(_) => "bytes",
            RlpValue::List(_) => "list",
        }
    }

    fn payload_length(&self) -> usize {
        match self {
            RlpValue::Empty => 0,
            RlpValue::Bytes(bytes) => bytes.len(),
            RlpValue::List(items) => items.iter().map(Encodable::length).sum(),
        }
    }

    // -----------------------------------------------------------------------
    // Typed accessors
    // -----------------------------------------------------------------------

    /// Returns the raw bytes of a `Bytes` leaf.
    pub fn as_bytes(&self) -> Result<&[u8], RlpError> {
        match self {
            RlpValue::Bytes(bytes) => Ok(bytes),
            other => Err(RlpError::TypeMismatch {
                expected: "bytes",
                found: other.kind(),
            }),
        }
    }

    /// Interprets a `Bytes` leaf as a big-endian `u64`.
    pub fn as_u64(&self) -> Result<u64, RlpError> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 8 {
            return Err(RlpError::IntegerOverflow(bytes.len()));
        }
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    /// Interprets a `Bytes` leaf as a big-endian unsigned 256-bit integer.
    pub fn as_u256(&self) -> Result<U256, RlpError> {
        let bytes = self.as_bytes()?;
        U256::try_from_be_slice(bytes).ok_or(RlpError::IntegerOverflow(bytes.len()))
    }

    /// Interprets a `Bytes` leaf as a 20-byte account address.
    pub fn as_address(&self) -> Result<Address, RlpError> {
        let bytes = self.as_bytes()?;
        if bytes.len() != 20 {
            return Err(RlpError::AddressLength(bytes.len()));
        }
        Ok(Address::from_slice(bytes))
    }

    /// Returns the elements of a `List`.
    pub fn as_list(&self) -> Result<&[RlpValue], RlpError> {
        match self {
            RlpValue::List(items) => Ok(items),
            other => Err(RlpError::TypeMismatch {
                expected: "list",
                found: other.kind(),
            }),
        }
    }

    /// Applies `transform` to every element of a `List`.
    pub fn map<T, E, F>(&self, transform: F) -> Result<Vec<T>, E>
    where
        F: FnMut(&RlpValue) -> Result<T, E>,
        E: From<RlpError>,
    {
        self.as_list()?.iter().map(transform).collect()
    }
}

impl Encodable for RlpValue {
    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            RlpValue::Empty => {}
            RlpValue::Bytes(bytes) => bytes.as_slice().encode(out),
            RlpValue::List(items) => {
                Header {
                    list: true,
                    payload_length: self.payload_length(),
                }
                .encode(out);
                for item in items {
                    item.encode(out);
                }
            }
        }
    }

    fn length(&self) -> usize {
        match self {
            RlpValue::Empty => 0,
            RlpValue::Bytes(bytes) => bytes.as_slice().length(),
            RlpValue::List(_) => {
                let payload = self.payload_length();
                Header {
                    list: true,
                    payload_length: payload,
                }
                .length()
                    + payload
            }
        }
    }
}

impl From<u64> for RlpValue {
    fn from(value: u64) -> Self {
        let bytes = value.to_be_bytes();
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        RlpValue::Bytes(bytes[start..].to_vec())
    }
}

impl From<U256> for RlpValue {
    fn from(value: U256) -> Self {
        RlpValue::Bytes(value.to_be_bytes_trimmed_vec())
    }
}

impl From<Address> for RlpValue {
    fn from(value: Address) -> Self {
        RlpValue::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for RlpValue {
    fn from(value: Vec<u8>) -> Self {
        RlpValue::Bytes(value)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes exactly one RLP value spanning the whole input.
///
/// Empty input decodes to [`RlpValue::Empty`]. Bytes left over after the
/// first value are rejected.
pub fn decode(input: &[u8]) -> Result<RlpValue, RlpError> {
    if input.is_empty() {
        return Ok(RlpValue::Empty);
    }
    let (value, consumed) = decode_item(input, 0)?;
    if consumed != input.len() {
        return Err(RlpError::TrailingBytes(input.len() - consumed));
    }
    Ok(value)
}

/// Decodes the item at the head of `input`, returning it together with the
/// number of bytes its header and payload occupy.
fn decode_item(input: &[u8], depth: usize) -> Result<(RlpValue, usize), RlpError> {
    let Some(&first) = input.first() else {
        return Err(RlpError::LengthExceedsInput {
            needed: 1,
            available: 0,
        });
    };

    match first {
        0x00..=0x7f => Ok((RlpValue::Bytes(vec![first]), 1)),
        0x80..=0xb7 => {
            let len = usize::from(first - SHORT_STRING);
            let body = slice(input, 1, len)?;
            if let [byte @ 0x00..=0x7f] = body {
                return Err(RlpError::NonCanonicalSingleByte(*byte));
            }
            Ok((RlpValue::Bytes(body.to_vec()), 1 + len))
        }
        0xb8..=0xbf => {
            let len_of_len = usize::from(first - LONG_STRING);
            let len = read_length(input, len_of_len)?;
            let body = slice(input, 1 + len_of_len, len)?;
            Ok((RlpValue::Bytes(body.to_vec()), 1 + len_of_len + len))
        }
        0xc0..=0xf7 => {
            let len = usize::from(first - SHORT_LIST);
            let body = slice(input, 1, len)?;
            Ok((decode_list(body, depth + 1)?, 1 + len))
        }
        0xf8..=0xff => {
            let len_of_len = usize::from(first - LONG_LIST);
            let len = read_length(input, len_of_len)?;
            let body = slice(input, 1 + len_of_len, len)?;
            Ok((decode_list(body, depth + 1)?, 1 + len_of_len + len))
        }
    }
}

fn decode_list(mut body: &[u8], depth: usize) -> Result<RlpValue, RlpError> {
    if depth > MAX_DEPTH {
        return Err(RlpError::UnsupportedNesting(MAX_DEPTH));
    }
    let mut items = Vec::new();
    while !body.is_empty() {
        let (item, consumed) = decode_item(body, depth)?;
        items.push(item);
        body = &body[consumed..];
    }
    Ok(RlpValue::List(items))
}

/// Reads the big-endian length that follows a long-form prefix byte. The
/// length must be minimal and too large for the short form.
fn read_length(input: &[u8], len_of_len: usize) -> Result<usize, RlpError> {
    let bytes = input
        .get(1..1 + len_of_len)
        .ok_or(RlpError::TruncatedLengthOfLength {
            needed: len_of_len,
            available: input.len().saturating_sub(1),
        })?;
    if bytes.first() == Some(&0) {
        return Err(RlpError::LeadingZeroLength);
    }
    if bytes.len() > std::mem::size_of::<usize>() {
        return Err(RlpError::IntegerOverflow(bytes.len()));
    }
    let len = bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
    if len <= SHORT_MAX {
        return Err(RlpError::NonCanonicalLongForm(len));
    }
    Ok(len)
}

fn slice(input: &[u8], start: usize, len: usize) -> Result<&[u8], RlpError> {
    let available = input.len().saturating_sub(start);
    start
        .checked_add(len)
        .and_then(|end| input.get(start..end))
        .ok_or(RlpError::LengthExceedsInput {
            needed: len,
            available,
        })
}
