//! Refund Calculator. Pure decimal arithmetic; no I/O.
//! The formula is shared with the re-validation pass, which
//! re-derives the same amounts from persisted row fields rather than raw
//! swap inputs — [`derive_refund`] is the common core both call into.

use bigdecimal::BigDecimal;
use std::str::FromStr;

use crate::chain::ChainId;
use crate::config::EpochGates;
use crate::db::{GasRefundTransaction, TransactionStatus};
use crate::decimal::{floor_to_integer, psp_scale};
use crate::epoch::Epoch;
use crate::error::RunError;
use crate::external::price_oracle::PricePoint;
use crate::external::subgraph::RawSwap;
use crate::tier::tier;

/// `(refundPSPRaw, refundUSD, refundPSP)`.
pub type RefundAmounts = (BigDecimal, BigDecimal, BigDecimal);

/// Re-derives refund amounts from `gasUsedChainCurrency / pspChainCurrency
/// × tier(totalStakeAmountPSP) × pspUsd`, including the
/// `PRECISION_GLITCH_EPOCH` carve-out that floors the raw PSP amount
/// *before* USD is computed from it.
///
/// Shared verbatim by fresh-swap calculation and re-validation, so both
/// paths can never silently drift apart.
pub fn derive_refund(
    gas_used_chain_currency: &BigDecimal,
    psp_chain_currency: &BigDecimal,
    psp_usd: &BigDecimal,
    stake_psp_wei: &BigDecimal,
    epoch: Epoch,
    gates: &EpochGates,
) -> Result<RefundAmounts, RunError> {
    let percent = tier(stake_psp_wei).ok_or_else(|| RunError::TierContradiction {
        stake: stake_psp_wei.to_string(),
    })?;

    let gas_fee_psp = gas_used_chain_currency / psp_chain_currency;
    let mut refund_psp_raw = gas_fee_psp * percent;
    if epoch == gates.precision_glitch_epoch {
        refund_psp_raw = floor_to_integer(&refund_psp_raw);
    }
    let refund_usd = &refund_psp_raw * psp_usd / psp_scale();
    let refund_psp = floor_to_integer(&refund_psp_raw);
    Ok((refund_psp_raw, refund_usd, refund_psp))
}

/// Computes a staged `GasRefundTransaction{status = Idle}` for one
/// qualifying swap. `gas_used` always comes from the block
/// explorer, never the subgraph — the subgraph-reported value is not
/// trustworthy enough to pay a refund against.
pub fn calculate(
    swap: &RawSwap,
    chain: ChainId,
    epoch: Epoch,
    gas_used: u64,
    price: &PricePoint,
    stake_psp_wei: &BigDecimal,
    gates: &EpochGates,
) -> Result<GasRefundTransaction, RunError> {
    let tx_gas_price =
        BigDecimal::from_str(&swap.tx_gas_price).map_err(|_| RunError::MalformedGasPrice {
            chain,
            tx_hash: swap.tx_hash.clone(),
            raw: swap.tx_gas_price.clone(),
        })?;
    let gas_used_chain_currency = BigDecimal::from(gas_used) * &tx_gas_price;

    let (_refund_psp_raw, refund_usd, refund_psp) = derive_refund(
        &gas_used_chain_currency,
        &price.psp_per_native_rate,
        &price.psp_price_usd,
        stake_psp_wei,
        epoch,
        gates,
    )?;

    Ok(GasRefundTransaction {
        id: 0,
        chain_id: chain,
        epoch,
        hash: swap.tx_hash.clone(),
        address: swap.tx_origin.clone(),
        timestamp: swap.timestamp,
        block_number: swap.block_number,
        gas_used,
        gas_used_chain_currency,
        psp_chain_currency: price.psp_per_native_rate.clone(),
        psp_usd: price.psp_price_usd.clone(),
        chain_currency_usd: price.chain_price_usd.clone(),
        total_stake_amount_psp: stake_psp_wei.clone(),
        refunded_amount_psp: refund_psp,
        refunded_amount_usd: refund_usd,
        status: TransactionStatus::Idle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swap() -> RawSwap {
        RawSwap {
            tx_hash: "0x1".to_string(),
            tx_origin: "0xaddr".to_string(),
            initiator: "0xaddr".to_string(),
            tx_gas_price: "100000000000".to_string(), // 100 gwei
            block_number: 1,
            block_hash: "0xgood".to_string(),
            timestamp: 1_700_000_000,
            chain_id: ChainId::Mainnet,
        }
    }

    fn price() -> PricePoint {
        PricePoint {
            timestamp: 1_700_000_000,
            psp_price_usd: BigDecimal::from_str("0.05").unwrap(),
            chain_price_usd: BigDecimal::from_str("2000").unwrap(),
            psp_per_native_rate: BigDecimal::from_str("40000").unwrap(),
        }
    }

    fn max_tier_stake() -> BigDecimal {
        BigDecimal::from_str("500000").unwrap() * psp_scale()
    }

    #[test]
    fn computes_full_precision_usd_and_floored_psp() {
        let gates = EpochGates::default();
        let tx = calculate(
            &swap(),
            ChainId::Mainnet,
            Epoch::new(5),
            21_000,
            &price(),
            &max_tier_stake(),
            &gates,
        )
        .unwrap();
        // gasUsedChainCurrency = 21000 * 1e11 = 2.1e15 wei
        // gasFeePSP = 2.1e15 / 40000 = 52_500_000_000 (raw, unscaled by tier 1.0)
        let expected_raw = BigDecimal::from_str("2100000000000000").unwrap()
            / BigDecimal::from_str("40000").unwrap();
        let expected_usd = &expected_raw * BigDecimal::from_str("0.05").unwrap() / psp_scale();
        assert_eq!(tx.refunded_amount_usd, expected_usd);
        assert_eq!(tx.refunded_amount_psp, floor_to_integer(&expected_raw));
        assert_eq!(tx.status, TransactionStatus::Idle);
    }

    #[test]
    fn s5_precision_glitch_floors_before_usd() {
        let mut gates = EpochGates::default();
        gates.precision_glitch_epoch = Epoch::new(18);

        let stake = max_tier_stake();
        let gas_used_chain_currency = BigDecimal::from_str("2100000000000001").unwrap();

        let (_, usd_glitch, _) = derive_refund(
            &gas_used_chain_currency,
            &price().psp_per_native_rate,
            &price().psp_price_usd,
            &stake,
            gates.precision_glitch_epoch,
            &gates,
        )
        .unwrap();
        let (_, usd_normal, _) = derive_refund(
            &gas_used_chain_currency,
            &price().psp_per_native_rate,
            &price().psp_price_usd,
            &stake,
            gates.precision_glitch_epoch.succ(),
            &gates,
        )
        .unwrap();
        assert!(usd_glitch < usd_normal);
    }

    #[test]
    fn malformed_gas_price_is_fatal_not_a_silent_zero() {
        let gates = EpochGates::default();
        let mut bad_swap = swap();
        bad_swap.tx_gas_price = "not-a-number".to_string();
        let result = calculate(
            &bad_swap,
            ChainId::Mainnet,
            Epoch::new(5),
            21_000,
            &price(),
            &max_tier_stake(),
            &gates,
        );
        assert!(matches!(result, Err(RunError::MalformedGasPrice { .. })));
    }

    #[test]
    fn stake_below_min_is_a_tier_contradiction() {
        let gates = EpochGates::default();
        let stake = BigDecimal::from_str("1").unwrap();
        let result = derive_refund(
            &BigDecimal::from_str("1000").unwrap(),
            &BigDecimal::from_str("40000").unwrap(),
            &BigDecimal::from_str("0.05").unwrap(),
            &stake,
            Epoch::new(5),
            &gates,
        );
        assert!(matches!(result, Err(RunError::TierContradiction { .. })));
    }
}
