//! Solana legacy transaction building and signing.
//!
//! Wire layout:
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```

use ed25519_dalek::{Signer, SigningKey};

use crate::address::{address_to_bytes, bytes_to_address};
use crate::error::SolError;

// ---------------------------------------------------------------------------
// Programs
// ---------------------------------------------------------------------------

/// The System Program public key: 32 zero bytes.
pub const SYSTEM_PROGRAM_ID: [u8; 32] = [0u8; 32];

/// Base58 id of the Compute Budget program.
pub const COMPUTE_BUDGET_PROGRAM: &str = "ComputeBudget111111111111111111111111111111";

const SYSTEM_TRANSFER_IX_INDEX: u32 = 2;
const SET_COMPUTE_UNIT_LIMIT_IX: u8 = 0x02;
const SET_COMPUTE_UNIT_PRICE_IX: u8 = 0x03;

const MICRO_LAMPORTS_PER_LAMPORT: u128 = 1_000_000;

// ---------------------------------------------------------------------------
// Compact-u16
// ---------------------------------------------------------------------------

/// Encode a `u16` in Solana's compact-u16 format (1 to 3 bytes).
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16 from the front of `data`, returning the value and
/// the number of bytes consumed.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    for (i, byte) in data.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return u16::try_from(value)
                .map(|v| (v, i + 1))
                .map_err(|_| SolError::SerializationError("compact-u16 overflow".into()));
        }
    }
    Err(SolError::SerializationError(
        "truncated compact-u16".into(),
    ))
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SolAccountMeta {
    pub pubkey: [u8; 32],
    pub is_signer: bool,
    pub is_writable: bool,
}

#[derive(Debug, Clone)]
pub struct SolInstruction {
    pub program_id: [u8; 32],
    pub accounts: Vec<SolAccountMeta>,
    pub data: Vec<u8>,
}

/// A compiled legacy transaction message.
#[derive(Debug, Clone)]
pub struct SolTransaction {
    /// Writable signers, read-only signers, writable non-signers, then
    /// read-only non-signers. The fee payer is always first.
    pub account_keys: Vec<[u8; 32]>,
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
    pub recent_blockhash: [u8; 32],
    pub compiled_instructions: Vec<CompiledInstruction>,
}

#[derive(Debug, Clone)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

/// Compute-unit price and limit attached to a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFee {
    pub unit_price_micro_lamports: u64,
    pub unit_limit: u32,
}

impl PriorityFee {
    /// Lamports paid on top of the signature fee, rounded up.
    pub fn lamports(&self) -> u64 {
        let micro = self.unit_price_micro_lamports as u128 * self.unit_limit as u128;
        let lamports = micro.div_ceil(MICRO_LAMPORTS_PER_LAMPORT);
        u64::try_from(lamports).unwrap_or(u64::MAX)
    }
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Build a native SOL transfer, optionally preceded by compute-budget
/// instructions.
pub fn build_sol_transfer(
    from_pubkey: &[u8; 32],
    to_pubkey: &[u8; 32],
    lamports: u64,
    recent_blockhash: &[u8; 32],
    priority: Option<PriorityFee>,
) -> Result<SolTransaction, SolError> {
    if lamports == 0 {
        return Err(SolError::TransactionBuildError(
            "lamports must be > 0".into(),
        ));
    }

    let mut instructions = Vec::with_capacity(3);
    if let Some(priority) = priority {
        instructions.extend(compute_budget_instructions(&priority)?);
    }
    instructions.push(build_system_transfer_instruction(from_pubkey, to_pubkey, lamports));
    compile_transaction(&instructions, from_pubkey, recent_blockhash)
}

fn compute_budget_instructions(priority: &PriorityFee) -> Result<[SolInstruction; 2], SolError> {
    let program_id = address_to_bytes(COMPUTE_BUDGET_PROGRAM)?;

    let mut limit = vec![SET_COMPUTE_UNIT_LIMIT_IX];
    limit.extend_from_slice(&priority.unit_limit.to_le_bytes());

    let mut price = vec![SET_COMPUTE_UNIT_PRICE_IX];
    price.extend_from_slice(&priority.unit_price_micro_lamports.to_le_bytes());

    Ok([
        SolInstruction {
            program_id,
            accounts: Vec::new(),
            data: limit,
        },
        SolInstruction {
            program_id,
            accounts: Vec::new(),
            data: price,
        },
    ])
}

/// Compile instructions into a message with a single fee payer at index 0.
pub fn compile_transaction(
    instructions: &[SolInstruction],
    fee_payer: &[u8; 32],
    recent_blockhash: &[u8; 32],
) -> Result<SolTransaction, SolError> {
    struct AccountEntry {
        pubkey: [u8; 32],
        is_signer: bool,
        is_writable: bool,
    }

    let mut entries: Vec<AccountEntry> = Vec::new();
    let mut upsert = |pubkey: [u8; 32], signer: bool, writable: bool| {
        if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
        } else {
            entries.push(AccountEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
            });
        }
    };

    upsert(*fee_payer, true, true);
    for ix in instructions {
        for meta in &ix.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        upsert(ix.program_id, false, false);
    }

    // Stable sort keeps the fee payer ahead of other writable signers.
    entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    let num_signers = entries.iter().filter(|e| e.is_signer).count() as u8;
    let num_readonly_signed = entries
        .iter()
        .filter(|e| e.is_signer && !e.is_writable)
        .count() as u8;
    let num_readonly_unsigned = entries
        .iter()
        .filter(|e| !e.is_signer && !e.is_writable)
        .count() as u8;

    let account_keys: Vec<[u8; 32]> = entries.iter().map(|e| e.pubkey).collect();
    let index_of = |key: &[u8; 32]| -> Result<u8, SolError> {
        account_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i as u8)
            .ok_or_else(|| SolError::TransactionBuildError("account not in account keys".into()))
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let program_id_index = index_of(&ix.program_id)?;
        let account_indices = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey))
            .collect::<Result<Vec<_>, _>>()?;
        compiled.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data: ix.data.clone(),
        });
    }

    Ok(SolTransaction {
        account_keys,
        num_required_signatures: num_signers,
        num_readonly_signed,
        num_readonly_unsigned,
        recent_blockhash: *recent_blockhash,
        compiled_instructions: compiled,
    })
}

/// Serialize the message (the bytes that get signed).
pub fn serialize_message(tx: &SolTransaction) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    buf.push(tx.num_required_signatures);
    buf.push(tx.num_readonly_signed);
    buf.push(tx.num_readonly_unsigned);

    buf.extend_from_slice(&encode_compact_u16(tx.account_keys.len() as u16));
    for key in &tx.account_keys {
        buf.extend_from_slice(key);
    }

    buf.extend_from_slice(&tx.recent_blockhash);

    buf.extend_from_slice(&encode_compact_u16(tx.compiled_instructions.len() as u16));
    for ix in &tx.compiled_instructions {
        buf.push(ix.program_id_index);
        buf.extend_from_slice(&encode_compact_u16(ix.account_indices.len() as u16));
        buf.extend_from_slice(&ix.account_indices);
        buf.extend_from_slice(&encode_compact_u16(ix.data.len() as u16));
        buf.extend_from_slice(&ix.data);
    }

    buf
}

/// Wire bytes with zeroed signature slots, for fee estimation before the
/// transaction is signed.
pub fn serialize_unsigned(tx: &SolTransaction) -> Vec<u8> {
    let message = serialize_message(tx);
    let signers = tx.num_required_signatures as usize;
    let mut wire = encode_compact_u16(signers as u16);
    wire.resize(wire.len() + signers * 64, 0);
    wire.extend_from_slice(&message);
    wire
}

/// Sign a single-signer transaction and serialize it to wire format.
pub fn sign_transaction(tx: &SolTransaction, private_key: &[u8; 32]) -> Result<Vec<u8>, SolError> {
    if tx.num_required_signatures != 1 {
        return Err(SolError::SigningError(format!(
            "expected one signer, message requires {}",
            tx.num_required_signatures
        )));
    }
    let message = serialize_message(tx);
    let signing_key = SigningKey::from_bytes(private_key);
    if tx.account_keys.first() != Some(&signing_key.verifying_key().to_bytes()) {
        return Err(SolError::NotASigner(bytes_to_address(
            &signing_key.verifying_key().to_bytes(),
        )));
    }
    let signature = signing_key.sign(&message);

    let mut wire = Vec::with_capacity(1 + 64 + message.len());
    wire.extend_from_slice(&encode_compact_u16(1));
    wire.extend_from_slice(&signature.to_bytes());
    wire.extend_from_slice(&message);
    Ok(wire)
}

/// System Program `Transfer`: `[u32 LE index=2][u64 LE lamports]`.
pub fn build_system_transfer_instruction(
    from: &[u8; 32],
    to: &[u8; 32],
    lamports: u64,
) -> SolInstruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_IX_INDEX.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    SolInstruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta {
                pubkey: *from,
                is_signer: true,
                is_writable: true,
            },
            SolAccountMeta {
                pubkey: *to,
                is_signer: false,
                is_writable: true,
            },
        ],
        data,
    }
}
