use bitcoin::address::{Address, NetworkUnchecked};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::CompressedPublicKey;

use crate::error::BtcError;
use crate::network::BtcNetwork;

/// Derive a P2WPKH (native SegWit bech32) address from a compressed public key.
///
/// Returns `bc1...` for mainnet, `tb1...` for testnet/signet.
pub fn pubkey_to_p2wpkh_address(
    pubkey_bytes: &[u8; 33],
    network: BtcNetwork,
) -> Result<String, BtcError> {
    let compressed_pk = CompressedPublicKey::from_slice(pubkey_bytes).map_err(|e| {
        BtcError::InvalidPublicKey(format!("failed to parse compressed public key: {e}"))
    })?;
    Ok(Address::p2wpkh(&compressed_pk, network.to_bitcoin_network()).to_string())
}

/// Derive the P2WPKH address controlled by a 32-byte private key.
pub fn private_key_to_p2wpkh_address(
    private_key: &[u8; 32],
    network: BtcNetwork,
) -> Result<String, BtcError> {
    let secp = Secp256k1::signing_only();
    let secret_key = SecretKey::from_slice(private_key)
        .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid secret key: {e}")))?;
    let public_key = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &secret_key);
    pubkey_to_p2wpkh_address(&public_key.serialize(), network)
}

/// Parse an address string and require it to belong to `network`.
pub fn parse_address(address: &str, network: BtcNetwork) -> Result<Address, BtcError> {
    address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address: {e}")))?
        .require_network(network.to_bitcoin_network())
        .map_err(|e| BtcError::InvalidAddress(format!("wrong network: {e}")))
}
