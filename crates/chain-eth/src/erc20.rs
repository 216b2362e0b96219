use alloy_primitives::{Address, U256};

/// Function selector for `transfer(address,uint256)`: `0xa9059cbb`.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Encodes an ERC-20 `transfer(address,uint256)` call.
///
/// Returns the 4-byte selector followed by the left-padded recipient and
/// amount words.
pub fn encode_transfer(to: Address, amount: U256) -> Vec<u8> {
    let mut calldata = Vec::with_capacity(4 + 64);
    calldata.extend_from_slice(&TRANSFER_SELECTOR);
    calldata.extend_from_slice(&[0u8; 12]);
    calldata.extend_from_slice(to.as_slice());
    calldata.extend_from_slice(&amount.to_be_bytes::<32>());
    calldata
}
