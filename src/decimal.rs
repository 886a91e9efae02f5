//! Arbitrary-precision decimal helpers. All monetary arithmetic here is
//! arbitrary-precision decimal — floating point is never used. PSP is
//! stored at integer (floored) precision, USD at full precision.

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use num_bigint::BigInt;
use std::str::FromStr;

/// PSP and most on-chain amounts are scaled by 10^18 (wei-style fixed
/// point).
pub fn psp_scale() -> BigDecimal {
    BigDecimal::from_str("1000000000000000000").expect("static literal parses")
}

/// Truncates (floors) toward negative infinity. Refunds are always
/// non-negative in this pipeline, so floor and truncation coincide, but we
/// use explicit floor semantics to stay correct if that ever changes.
pub fn floor_to_integer(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(0, RoundingMode::Down)
}

/// Renders a floored decimal as the integer string the persisted
/// `refundedAmountPSP` field requires.
pub fn to_fixed_integer_string(value: &BigDecimal) -> String {
    let floored = floor_to_integer(value);
    let (digits, _scale) = floored.into_bigint_and_exponent();
    digits.to_string()
}

/// Renders a decimal at full precision, for `refundedAmountUSD`
///.
pub fn to_full_precision_string(value: &BigDecimal) -> String {
    value.normalized().to_string()
}

/// Parses a decimal string produced by [`to_fixed_integer_string`] or
/// [`to_full_precision_string`] back into a `BigDecimal`.
pub fn parse_decimal(s: &str) -> Result<BigDecimal, bigdecimal::ParseBigDecimalError> {
    BigDecimal::from_str(s)
}

pub fn zero() -> BigDecimal {
    BigDecimal::zero()
}

/// Converts an arbitrary-precision integer amount (already PSP-wei scaled)
/// into its ASCII decimal byte representation, for Merkle leaf hashing
///.
pub fn amount_ascii_bytes(psp_wei: &BigInt) -> Vec<u8> {
    psp_wei.to_str_radix(10).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_truncates_fractional_psp() {
        let value = BigDecimal::from_str("123.999").unwrap();
        assert_eq!(to_fixed_integer_string(&value), "123");
    }

    #[test]
    fn full_precision_preserves_usd_fraction() {
        let value = BigDecimal::from_str("0.856153846153846154").unwrap();
        assert_eq!(to_full_precision_string(&value), "0.856153846153846154");
    }

    #[test]
    fn floor_handles_negative_scale_inputs() {
        let value = BigDecimal::from_str("1000000000000000000").unwrap();
        assert_eq!(to_fixed_integer_string(&value), "1000000000000000000");
    }
}
