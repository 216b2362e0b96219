//! Conversion between decimal token amounts and integral base units.

use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::{BigDecimal, ToPrimitive};
use chain_eth::U256;

fn ten_pow(decimals: u32) -> BigDecimal {
    BigDecimal::new(BigInt::from(1), -i64::from(decimals))
}

fn to_base_integer(amount: &BigDecimal, decimals: u32) -> Option<BigInt> {
    let scaled = amount * ten_pow(decimals);
    if !scaled.is_integer() || scaled.sign() == Sign::Minus {
        return None;
    }
    let (digits, scale) = scaled.with_scale(0).into_bigint_and_exponent();
    debug_assert_eq!(scale, 0);
    Some(digits)
}

/// Base units of `amount`; `None` if it has more precision than
/// `decimals`, is negative, or does not fit 256 bits.
pub fn to_base_u256(amount: &BigDecimal, decimals: u32) -> Option<U256> {
    let (_, bytes) = to_base_integer(amount, decimals)?.to_bytes_be();
    U256::try_from_be_slice(&bytes)
}

pub fn to_base_u64(amount: &BigDecimal, decimals: u32) -> Option<u64> {
    to_base_integer(amount, decimals)?.to_u64()
}

pub fn from_base_u256(value: U256, decimals: u32) -> BigDecimal {
    let digits = BigInt::from_bytes_be(Sign::Plus, &value.to_be_bytes::<32>());
    BigDecimal::new(digits, i64::from(decimals))
}

pub fn from_base_u64(value: u64, decimals: u32) -> BigDecimal {
    BigDecimal::new(BigInt::from(value), i64::from(decimals))
}
