//! Decoding of JSON-RPC request parameters.

use serde::Deserialize;
use serde_json::Value;

use crate::error::SessionError;
use crate::operation::evm::ExternalEvmTransaction;
use crate::operation::sign::{SignRequest, Signable};
use crate::types::Chain;

/// A request received on a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub topic: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
    /// CAIP-2 chain the request targets.
    pub chain_id: String,
}

impl Request {
    pub fn chain(&self) -> Result<Chain, SessionError> {
        Chain::from_caip2(&self.chain_id).ok_or_else(|| SessionError::NoChain(self.chain_id.clone()))
    }
}

fn invalid(reason: impl Into<String>) -> SessionError {
    SessionError::InvalidParameters(reason.into())
}

fn string_at<'a>(params: &'a Value, index: usize) -> Result<&'a str, SessionError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("expected a string at position {index}")))
}

/// `personal_sign`: `[message, address]`. A `0x` message is hex, anything
/// else is signed as UTF-8.
pub fn personal_sign(params: &Value, chain: Chain) -> Result<SignRequest, SessionError> {
    let message = string_at(params, 0)?;
    let address = string_at(params, 1)?;
    let bytes = match message.strip_prefix("0x").map(hex::decode) {
        Some(Ok(bytes)) => bytes,
        _ => message.as_bytes().to_vec(),
    };
    let human_readable = String::from_utf8(bytes.clone()).unwrap_or_else(|_| message.to_owned());
    Ok(SignRequest {
        chain,
        address: address.to_owned(),
        signable: Signable::Raw(bytes),
        human_readable,
    })
}

/// `eth_signTypedData[_v4]`: `[address, typedData]`, where the typed data is
/// a JSON string or an object.
pub fn sign_typed_data(params: &Value, chain: Chain) -> Result<SignRequest, SessionError> {
    let address = string_at(params, 0)?;
    let json = match params.get(1) {
        Some(Value::String(json)) => json.clone(),
        Some(object @ Value::Object(_)) => object.to_string(),
        _ => return Err(invalid("missing typed data")),
    };
    let parsed: Value = serde_json::from_str(&json).map_err(|err| invalid(err.to_string()))?;
    let human_readable = serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| json.clone());
    Ok(SignRequest {
        chain,
        address: address.to_owned(),
        signable: Signable::Typed(json),
        human_readable,
    })
}

#[derive(Deserialize)]
struct SolanaMessageParams {
    message: String,
    pubkey: String,
}

/// `solana_signMessage`: `{ message: base58, pubkey }`.
pub fn solana_sign_message(params: &Value, chain: Chain) -> Result<SignRequest, SessionError> {
    let decoded = SolanaMessageParams::deserialize(params).map_err(|err| invalid(err.to_string()))?;
    let bytes = bs58::decode(&decoded.message)
        .into_vec()
        .map_err(|err| invalid(err.to_string()))?;
    let human_readable = String::from_utf8(bytes.clone()).unwrap_or_else(|_| decoded.message.clone());
    Ok(SignRequest {
        chain,
        address: decoded.pubkey,
        signable: Signable::Raw(bytes),
        human_readable,
    })
}

/// `eth_sendTransaction`: `[transaction]`.
pub fn evm_transaction(params: &Value) -> Result<ExternalEvmTransaction, SessionError> {
    let transactions =
        Vec::<ExternalEvmTransaction>::deserialize(params).map_err(|err| invalid(err.to_string()))?;
    transactions.into_iter().next().ok_or(SessionError::NoTransaction)
}

#[derive(Deserialize)]
struct SolanaTransactionParams {
    transaction: String,
}

/// `solana_signTransaction`: `{ transaction: base64 }`.
pub fn solana_transaction(params: &Value) -> Result<String, SessionError> {
    SolanaTransactionParams::deserialize(params)
        .map(|params| params.transaction)
        .map_err(|err| invalid(err.to_string()))
}
