//! Tier Resolver. Pure function: stake -> refund
//! percent, or ineligible.

use bigdecimal::BigDecimal;
use std::str::FromStr;

/// One row of the tier table, descending by `min_stake`.
#[derive(Debug, Clone)]
struct TierRow {
    min_stake_psp: &'static str,
    percent: &'static str,
}

/// Minimum stake below which an address has no tier at all.
pub fn min_stake() -> BigDecimal {
    scaled_psp("500")
}

const TIERS: &[TierRow] = &[
    TierRow { min_stake_psp: "500000", percent: "1.0" },
    TierRow { min_stake_psp: "50000", percent: "0.75" },
    TierRow { min_stake_psp: "5000", percent: "0.50" },
    TierRow { min_stake_psp: "500", percent: "0.25" },
];

fn scaled_psp(whole: &str) -> BigDecimal {
    BigDecimal::from_str(whole).unwrap() * crate::decimal::psp_scale()
}

/// Walks tiers in descending `minStake`, returns the first percent whose
/// threshold is `<= stake`. `None` means ineligible; callers MUST treat
/// `None` as "no refund", never as "0%".
pub fn tier(stake_psp_wei: &BigDecimal) -> Option<BigDecimal> {
    TIERS
        .iter()
        .find(|row| stake_psp_wei >= &scaled_psp(row.min_stake_psp))
        .map(|row| BigDecimal::from_str(row.percent).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stake_of_500_is_25_percent() {
        let stake = scaled_psp("500");
        assert_eq!(tier(&stake), Some(BigDecimal::from_str("0.25").unwrap()));
    }

    #[test]
    fn stake_of_499_is_ineligible() {
        let stake = scaled_psp("499");
        assert_eq!(tier(&stake), None);
    }

    #[test]
    fn stake_of_500_000_is_100_percent() {
        let stake = scaled_psp("500000");
        assert_eq!(tier(&stake), Some(BigDecimal::from_str("1.0").unwrap()));
    }

    #[test]
    fn boundaries_are_inclusive_on_lower_bound() {
        let stake = scaled_psp("50000");
        assert_eq!(tier(&stake), Some(BigDecimal::from_str("0.75").unwrap()));
        let just_below = scaled_psp("50000") - BigDecimal::from_str("1").unwrap();
        assert_eq!(tier(&just_below), Some(BigDecimal::from_str("0.50").unwrap()));
    }
}
