use bitcoin::absolute::LockTime;
use bitcoin::address::Address;
use bitcoin::hashes::Hash;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, CompressedPublicKey, OutPoint, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use crate::address::parse_address;
use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::utxo::{total_sat, Output};

/// Outputs at or below this value are not created; the value goes to fee.
pub const DUST_THRESHOLD_SAT: u64 = 546;

/// Output index the change output is written to.
pub const CHANGE_VOUT: u32 = 1;

/// A signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBtcTransaction {
    /// Consensus-serialized transaction as lowercase hex.
    pub raw_hex: String,
    pub txid: String,
    /// Fee actually paid, including any dust folded into it.
    pub fee_sat: u64,
    /// Change returned to the sender, recorded as a new unspent output.
    pub change: Option<Output>,
}

/// Input reference read back from a raw transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInput {
    pub txid: String,
    pub vout: u32,
}

impl DecodedInput {
    pub fn output_id(&self) -> String {
        Output::output_id(&self.txid, self.vout)
    }
}

/// Output read back from a raw transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOutput {
    /// `None` for scripts without an address form (e.g. OP_RETURN).
    pub address: Option<String>,
    pub amount_sat: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub inputs: Vec<DecodedInput>,
    pub outputs: Vec<DecodedOutput>,
}

/// Signs a P2WPKH transaction spending `inputs` in the given order.
///
/// Output 0 pays `send_amount_sat` to `receive_address`. Whatever remains
/// after `fee_sat` returns to `sender_address` as output 1, unless it is dust.
/// All inputs must be controlled by `private_key`.
pub fn sign_p2wpkh_transaction(
    inputs: &[Output],
    sender_address: &str,
    receive_address: &str,
    send_amount_sat: u64,
    fee_sat: u64,
    private_key: &[u8; 32],
    network: BtcNetwork,
) -> Result<SignedBtcTransaction, BtcError> {
    if inputs.is_empty() {
        return Err(BtcError::TransactionBuildError("no inputs".into()));
    }
    let receiver = parse_address(receive_address, network)?;
    let sender = parse_address(sender_address, network)?;

    let input_sat = total_sat(inputs)
        .ok_or_else(|| BtcError::TransactionBuildError("input amount overflow".into()))?;
    let change_sat = input_sat
        .checked_sub(send_amount_sat)
        .and_then(|rest| rest.checked_sub(fee_sat))
        .ok_or_else(|| {
            BtcError::TransactionBuildError(format!(
                "inputs of {input_sat} sat do not cover {send_amount_sat} sat plus {fee_sat} sat fee"
            ))
        })?;

    let mut tx_inputs = Vec::with_capacity(inputs.len());
    for output in inputs {
        let txid: Txid = output
            .txid
            .parse()
            .map_err(|e| BtcError::TransactionBuildError(format!("invalid txid: {e}")))?;
        tx_inputs.push(TxIn {
            previous_output: OutPoint::new(txid, output.vout),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::default(),
        });
    }

    let mut tx_outputs = vec![TxOut {
        value: Amount::from_sat(send_amount_sat),
        script_pubkey: receiver.script_pubkey(),
    }];
    let has_change = change_sat > DUST_THRESHOLD_SAT;
    if has_change {
        tx_outputs.push(TxOut {
            value: Amount::from_sat(change_sat),
            script_pubkey: sender.script_pubkey(),
        });
    }

    let unsigned = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: tx_inputs,
        output: tx_outputs,
    };
    let signed = sign_inputs(unsigned, inputs, private_key)?;

    let txid = signed.compute_txid().to_string();
    let change = has_change.then(|| Output::unspent(txid.clone(), CHANGE_VOUT, change_sat, sender_address));
    let paid_fee = if has_change { fee_sat } else { fee_sat + change_sat };

    Ok(SignedBtcTransaction {
        raw_hex: bitcoin::consensus::encode::serialize_hex(&signed),
        txid,
        fee_sat: paid_fee,
        change,
    })
}

fn sign_inputs(
    mut tx: Transaction,
    prevouts: &[Output],
    private_key: &[u8; 32],
) -> Result<Transaction, BtcError> {
    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(private_key)
        .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid secret key: {e}")))?;
    let public_key = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &secret_key);
    let script_code = ScriptBuf::new_p2wpkh(&CompressedPublicKey(public_key).wpubkey_hash());

    let mut witnesses = Vec::with_capacity(tx.input.len());
    {
        let mut sighash_cache = SighashCache::new(&tx);
        for (index, prevout) in prevouts.iter().enumerate() {
            let sighash = sighash_cache
                .p2wpkh_signature_hash(
                    index,
                    &script_code,
                    Amount::from_sat(prevout.amount_sat),
                    EcdsaSighashType::All,
                )
                .map_err(|e| BtcError::SigningError(format!("sighash computation failed: {e}")))?;

            let msg = Message::from_digest(sighash.to_byte_array());
            let signature = secp.sign_ecdsa(&msg, &secret_key);

            // DER signature followed by the sighash type byte.
            let mut sig_bytes = signature.serialize_der().to_vec();
            sig_bytes.push(EcdsaSighashType::All as u8);

            let mut witness = Witness::new();
            witness.push(&sig_bytes);
            witness.push(public_key.serialize());
            witnesses.push(witness);
        }
    }

    for (input, witness) in tx.input.iter_mut().zip(witnesses) {
        input.witness = witness;
    }
    Ok(tx)
}

/// Decodes a hex-encoded raw transaction into its input references and
/// output destinations.
pub fn decode_transaction(raw_hex: &str, network: BtcNetwork) -> Result<DecodedTransaction, BtcError> {
    let bytes = hex::decode(raw_hex).map_err(|e| BtcError::DecodeError(format!("invalid hex: {e}")))?;
    let tx: Transaction = bitcoin::consensus::deserialize(&bytes)
        .map_err(|e| BtcError::DecodeError(e.to_string()))?;

    let inputs = tx
        .input
        .iter()
        .map(|input| DecodedInput {
            txid: input.previous_output.txid.to_string(),
            vout: input.previous_output.vout,
        })
        .collect();
    let outputs = tx
        .output
        .iter()
        .map(|output| DecodedOutput {
            address: Address::from_script(&output.script_pubkey, network.to_bitcoin_network())
                .ok()
                .map(|address| address.to_string()),
            amount_sat: output.value.to_sat(),
        })
        .collect();

    Ok(DecodedTransaction { inputs, outputs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::private_key_to_p2wpkh_address;

    const SENDER_KEY: [u8; 32] = [0x42; 32];
    const RECEIVER: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

    fn sender() -> String {
        private_key_to_p2wpkh_address(&SENDER_KEY, BtcNetwork::Mainnet).unwrap()
    }

    fn input(tag: &str, vout: u32, amount_sat: u64) -> Output {
        Output::unspent(tag.repeat(32), vout, amount_sat, sender())
    }

    #[test]
    fn change_goes_to_sender_at_index_one() {
        let inputs = vec![input("ab", 0, 100_000)];
        let signed = sign_p2wpkh_transaction(
            &inputs, &sender(), RECEIVER, 50_000, 1_410, &SENDER_KEY, BtcNetwork::Mainnet,
        )
        .unwrap();

        let change = signed.change.clone().unwrap();
        assert_eq!(change.vout, CHANGE_VOUT);
        assert_eq!(change.amount_sat, 48_590);
        assert_eq!(change.address, sender());
        assert_eq!(change.txid, signed.txid);
        assert_eq!(signed.fee_sat, 1_410);

        let decoded = decode_transaction(&signed.raw_hex, BtcNetwork::Mainnet).unwrap();
        assert_eq!(decoded.outputs.len(), 2);
        assert_eq!(decoded.outputs[0].address.as_deref(), Some(RECEIVER));
        assert_eq!(decoded.outputs[0].amount_sat, 50_000);
        assert_eq!(decoded.outputs[1].address, Some(sender()));
    }

    #[test]
    fn exact_spend_has_no_change() {
        let inputs = vec![input("ab", 0, 60_000), input("cd", 2, 40_000)];
        let signed = sign_p2wpkh_transaction(
            &inputs, &sender(), &sender(), 98_000, 2_000, &SENDER_KEY, BtcNetwork::Mainnet,
        )
        .unwrap();
        assert!(signed.change.is_none());

        let decoded = decode_transaction(&signed.raw_hex, BtcNetwork::Mainnet).unwrap();
        assert_eq!(decoded.outputs.len(), 1);
        assert_eq!(
            decoded.inputs,
            vec![
                DecodedInput { txid: "ab".repeat(32), vout: 0 },
                DecodedInput { txid: "cd".repeat(32), vout: 2 },
            ]
        );
    }

    #[test]
    fn dust_change_is_folded_into_fee() {
        let inputs = vec![input("ab", 0, 100_000)];
        let signed = sign_p2wpkh_transaction(
            &inputs, &sender(), RECEIVER, 99_000, 700, &SENDER_KEY, BtcNetwork::Mainnet,
        )
        .unwrap();
        assert!(signed.change.is_none());
        assert_eq!(signed.fee_sat, 1_000);
    }

    #[test]
    fn txid_matches_decoded_hash() {
        let inputs = vec![input("ab", 0, 100_000)];
        let signed = sign_p2wpkh_transaction(
            &inputs, &sender(), RECEIVER, 50_000, 1_410, &SENDER_KEY, BtcNetwork::Mainnet,
        )
        .unwrap();
        let bytes = hex::decode(&signed.raw_hex).unwrap();
        let tx: Transaction = bitcoin::consensus::deserialize(&bytes).unwrap();
        assert_eq!(tx.compute_txid().to_string(), signed.txid);
        assert!(tx.input.iter().all(|input| input.witness.len() == 2));
    }

    #[test]
    fn overspend_is_rejected() {
        let inputs = vec![input("ab", 0, 10_000)];
        let result = sign_p2wpkh_transaction(
            &inputs, &sender(), RECEIVER, 10_000, 1, &SENDER_KEY, BtcNetwork::Mainnet,
        );
        assert!(matches!(result, Err(BtcError::TransactionBuildError(_))));
    }

    #[test]
    fn invalid_key_is_rejected() {
        let inputs = vec![input("ab", 0, 100_000)];
        let result = sign_p2wpkh_transaction(
            &inputs, &sender(), RECEIVER, 50_000, 1_000, &[0u8; 32], BtcNetwork::Mainnet,
        );
        assert!(matches!(result, Err(BtcError::InvalidPrivateKey(_))));
    }

    #[test]
    fn wrong_network_receiver_is_rejected() {
        let inputs = vec![input("ab", 0, 100_000)];
        let result = sign_p2wpkh_transaction(
            &inputs, &sender(), RECEIVER, 50_000, 1_000, &SENDER_KEY, BtcNetwork::Testnet,
        );
        assert!(matches!(result, Err(BtcError::InvalidAddress(_))));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_transaction("zz", BtcNetwork::Mainnet).is_err());
        assert!(decode_transaction("0100", BtcNetwork::Mainnet).is_err());
    }
}
