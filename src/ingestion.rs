//! Ingestion Driver. Slices one `(chain, epoch)` scan
//! interval into fixed-width windows, fetches swaps, runs the qualifier
//! and refund calculator, and persists staged `IDLE` rows at slice end.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};

use crate::budget::BudgetGuardian;
use crate::chain::ChainId;
use crate::config::{BudgetCaps, EpochGates, HttpConfig, IngestionConfig};
use crate::db::Database;
use crate::epoch::{Epoch, EpochWindow};
use crate::error::{ChainError, RunError};
use crate::external::blockinfo::BlockInfoService;
use crate::external::explorer::GasExplorer;
use crate::external::price_oracle::{resolve_price_point, PriceOracle};
use crate::external::retry::with_retries;
use crate::external::subgraph::{RawSwap, SwapsSubgraph};
use crate::refund::calculate;
use crate::stake::StakeAggregator;
use crate::swap::qualify_swaps;

/// Everything ingestion needs to drive one chain, collected so the
/// orchestrator only has to assemble this once per chain.
pub struct IngestionContext<'a> {
    pub subgraph: &'a dyn SwapsSubgraph,
    pub explorer: &'a dyn GasExplorer,
    pub block_info: &'a dyn BlockInfoService,
    pub price_oracle: &'a dyn PriceOracle,
    pub stake: &'a StakeAggregator,
    pub reorg_blacklist: &'a HashMap<ChainId, std::collections::HashSet<String>>,
    pub gates: &'a EpochGates,
    pub caps: &'a BudgetCaps,
    pub ingestion: &'a IngestionConfig,
    pub http: &'a HttpConfig,
}

/// Scans one `(chain, epoch)` window, resuming from
/// `last_processed_timestamp` if the epoch was partially ingested: the
/// cursor advances to `max(windowStart, lastProcessedTimestamp + 1)`.
///
/// `guardian` tracks the same optimistic, in-memory budget state spec.md §2
/// describes for C6: every qualifying swap is applied against it so
/// `is_global_spent()` can abort the chain loop early once the global
/// yearly cap is already spent. These updates are never persisted — the
/// `IDLE` rows this function writes keep the raw, uncapped refund amounts;
/// the authoritative classification and commit happen exclusively during
/// re-validation (C7).
pub async fn ingest_epoch(
    db: &dyn Database,
    ctx: &IngestionContext<'_>,
    chain: ChainId,
    window: EpochWindow,
    guardian: &mut BudgetGuardian,
) -> Result<(), ChainError> {
    let last_processed = db
        .last_processed_timestamp(chain, window.epoch)
        .await
        .map_err(ChainError::DatabaseUnreachable)?;
    let mut cursor = window.calc_start(last_processed);
    let blacklist = ctx
        .reorg_blacklist
        .get(&chain)
        .cloned()
        .unwrap_or_default();

    while cursor < window.end {
        if guardian.is_global_spent() {
            break;
        }

        let slice_end = (cursor + ctx.ingestion.slice_seconds).min(window.end);

        let blacklist_vec: Vec<String> = blacklist.iter().cloned().collect();
        let raw_swaps: Vec<RawSwap> = with_retries(ctx.http.max_retries, || {
            ctx.subgraph.fetch_swaps(chain, cursor, slice_end, &blacklist_vec)
        })
        .await
        .map_err(|e| ChainError::SubgraphUnavailable {
            chain,
            source: anyhow::anyhow!(e),
        })?;

        let qualified = qualify_swaps(
            raw_swaps,
            chain,
            window.epoch,
            ctx.gates,
            &blacklist,
            ctx.stake,
        )?;

        let prices = with_retries(ctx.http.max_retries, || {
            ctx.price_oracle.daily_rates(chain, cursor, slice_end)
        })
        .await
        .map_err(|e| ChainError::SubgraphUnavailable {
            chain,
            source: anyhow::anyhow!(e),
        })?;

        // Missing price points are fatal-to-run and surfaced eagerly, before
        // any gas-used I/O is issued for the slice.
        let mut prices_by_swap = Vec::with_capacity(qualified.len());
        for swap in &qualified {
            let price = resolve_price_point(&prices, swap.timestamp).ok_or_else(|| {
                RunError::MissingPricePoint {
                    chain,
                    timestamp: swap.timestamp,
                    tx_hash: swap.tx_hash.clone(),
                }
            })?;
            prices_by_swap.push(price);
        }

        // Gas-used lookups are the per-transaction enrichment step the spec
        // allows to run as bounded parallel I/O; everything else in this
        // loop is a pure, synchronous lookup.
        let gas_used_by_index: Vec<Result<u64, ChainError>> = stream::iter(qualified.iter())
            .map(|swap| async move {
                with_retries(ctx.http.max_retries, || ctx.explorer.gas_used(chain, &swap.tx_hash))
                    .await
                    .map_err(|e| ChainError::ExplorerUnavailable {
                        chain,
                        source: anyhow::anyhow!(e),
                    })
            })
            .buffered(ctx.ingestion.max_concurrent_gas_lookups.max(1))
            .collect()
            .await;

        let mut batch = Vec::with_capacity(qualified.len());
        for ((swap, price), gas_used) in qualified
            .iter()
            .zip(prices_by_swap.into_iter())
            .zip(gas_used_by_index.into_iter())
        {
            let gas_used = gas_used?;
            let stake_balance = ctx
                .stake
                .balance(&swap.tx_origin, swap.timestamp, window.epoch, ctx.gates);

            let row = calculate(
                swap,
                chain,
                window.epoch,
                gas_used,
                price,
                &stake_balance,
                ctx.gates,
            )?;

            // Optimistic-only: cap and account against the in-memory
            // guardian so `is_global_spent()` reflects this slice's swaps,
            // but the persisted row keeps the raw, uncapped amounts —
            // re-validation (C7) is the only pass that commits a
            // classification.
            let applied = guardian.apply_caps(
                &row.address,
                window.epoch,
                ctx.gates.epoch_budget_epoch,
                &row.refunded_amount_usd,
                &row.refunded_amount_psp,
                &price.psp_price_usd,
            )?;
            let effective_usd = applied.effective_usd(&row.refunded_amount_usd);
            let effective_psp = applied.effective_psp(&row.refunded_amount_psp);
            guardian.increase_epoch_usd(&row.address, &effective_usd, window.epoch, ctx.gates.epoch_budget_epoch);
            guardian.increase_yearly_usd(&row.address, &effective_usd);
            guardian.increase_total_psp(&effective_psp);

            batch.push(row);
        }

        db.insert_pending_batch(batch)
            .await
            .map_err(ChainError::DatabaseUnreachable)?;

        cursor = slice_end;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDatabase;
    use crate::external::stake::StakeSnapshot;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    struct FixedSubgraph(Vec<RawSwap>);
    #[async_trait]
    impl SwapsSubgraph for FixedSubgraph {
        async fn fetch_swaps(
            &self,
            _chain: ChainId,
            start: i64,
            end: i64,
            _blacklist: &[String],
        ) -> Result<Vec<RawSwap>, crate::error::RecoverableError> {
            Ok(self
                .0
                .iter()
                .filter(|s| s.timestamp >= start && s.timestamp < end)
                .cloned()
                .collect())
        }
    }

    struct FixedExplorer;
    #[async_trait]
    impl GasExplorer for FixedExplorer {
        async fn gas_used(
            &self,
            _chain: ChainId,
            _tx_hash: &str,
        ) -> Result<u64, crate::error::RecoverableError> {
            Ok(21_000)
        }
    }

    struct FixedBlockInfo;
    #[async_trait]
    impl BlockInfoService for FixedBlockInfo {
        async fn block_after_timestamp(
            &self,
            _chain: ChainId,
            _timestamp: i64,
        ) -> Result<u64, crate::error::RecoverableError> {
            Ok(1)
        }
    }

    struct FixedPriceOracle;
    #[async_trait]
    impl PriceOracle for FixedPriceOracle {
        async fn daily_rates(
            &self,
            _chain: ChainId,
            start: i64,
            _end: i64,
        ) -> Result<Vec<crate::external::price_oracle::PricePoint>, crate::error::RecoverableError>
        {
            Ok(vec![crate::external::price_oracle::PricePoint {
                timestamp: start,
                psp_price_usd: BigDecimal::from_str("0.05").unwrap(),
                chain_price_usd: BigDecimal::from_str("2000").unwrap(),
                psp_per_native_rate: BigDecimal::from_str("40000").unwrap(),
            }])
        }
    }

    struct FlatStake;
    impl StakeSnapshot for FlatStake {
        fn balance(&self, _address: &str, _timestamp: i64) -> BigDecimal {
            BigDecimal::from_str("1000000000000000000000000").unwrap()
        }
    }

    fn raw_swap(hash: &str, ts: i64) -> RawSwap {
        RawSwap {
            tx_hash: hash.to_string(),
            tx_origin: "0xaddr".to_string(),
            initiator: "0xaddr".to_string(),
            tx_gas_price: "100000000000".to_string(),
            block_number: 1,
            block_hash: "0xgood".to_string(),
            timestamp: ts,
            chain_id: ChainId::Mainnet,
        }
    }

    #[tokio::test]
    async fn ingests_a_slice_and_persists_idle_rows() {
        let db = MemoryDatabase::new();
        let gates = EpochGates::default();
        let caps = BudgetCaps::default();
        let ingestion = IngestionConfig::default();
        let http = HttpConfig::default();
        let stake = StakeAggregator::new(Box::new(FlatStake), Box::new(FlatStake));
        let subgraph = FixedSubgraph(vec![raw_swap("0x1", 100)]);
        let explorer = FixedExplorer;
        let block_info = FixedBlockInfo;
        let price_oracle = FixedPriceOracle;
        let blacklist = HashMap::new();

        let ctx = IngestionContext {
            subgraph: &subgraph,
            explorer: &explorer,
            block_info: &block_info,
            price_oracle: &price_oracle,
            stake: &stake,
            reorg_blacklist: &blacklist,
            gates: &gates,
            caps: &caps,
            ingestion: &ingestion,
            http: &http,
        };

        let window = EpochWindow {
            epoch: Epoch::new(1),
            start: 0,
            end: 200,
        };
        let mut guardian = BudgetGuardian::new(&caps);

        ingest_epoch(&db, &ctx, ChainId::Mainnet, window, &mut guardian)
            .await
            .unwrap();

        let rows = db.all_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, crate::db::TransactionStatus::Idle);
    }

    #[tokio::test]
    async fn resumes_from_last_processed_timestamp() {
        let db = MemoryDatabase::new();
        db.seed(vec![crate::db::GasRefundTransaction {
            id: 0,
            chain_id: ChainId::Mainnet,
            epoch: Epoch::new(1),
            hash: "0xprev".to_string(),
            address: "0xaddr".to_string(),
            timestamp: 150,
            block_number: 1,
            gas_used: 21_000,
            gas_used_chain_currency: BigDecimal::from(0),
            psp_chain_currency: BigDecimal::from(1),
            psp_usd: BigDecimal::from(1),
            chain_currency_usd: BigDecimal::from(1),
            total_stake_amount_psp: BigDecimal::from(1),
            refunded_amount_psp: BigDecimal::from(0),
            refunded_amount_usd: BigDecimal::from(0),
            status: crate::db::TransactionStatus::Idle,
        }]);

        let gates = EpochGates::default();
        let caps = BudgetCaps::default();
        let ingestion = IngestionConfig::default();
        let http = HttpConfig::default();
        let stake = StakeAggregator::new(Box::new(FlatStake), Box::new(FlatStake));
        // Swap at ts=100 is before the resume point (151) and must be skipped.
        let subgraph = FixedSubgraph(vec![raw_swap("0x1", 100), raw_swap("0x2", 160)]);
        let explorer = FixedExplorer;
        let block_info = FixedBlockInfo;
        let price_oracle = FixedPriceOracle;
        let blacklist = HashMap::new();

        let ctx = IngestionContext {
            subgraph: &subgraph,
            explorer: &explorer,
            block_info: &block_info,
            price_oracle: &price_oracle,
            stake: &stake,
            reorg_blacklist: &blacklist,
            gates: &gates,
            caps: &caps,
            ingestion: &ingestion,
            http: &http,
        };

        let window = EpochWindow {
            epoch: Epoch::new(1),
            start: 0,
            end: 200,
        };
        let mut guardian = BudgetGuardian::new(&caps);

        ingest_epoch(&db, &ctx, ChainId::Mainnet, window, &mut guardian)
            .await
            .unwrap();

        let rows = db.all_rows();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.hash == "0x2"));
        assert!(!rows.iter().any(|r| r.hash == "0x1"));
    }
}
