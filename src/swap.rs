//! Swap Qualifier.

use std::collections::HashSet;

use crate::chain::ChainId;
use crate::config::EpochGates;
use crate::epoch::Epoch;
use crate::error::RunError;
use crate::external::subgraph::RawSwap;
use crate::stake::StakeAggregator;
use crate::tier::min_stake;

/// Filters raw swaps down to those eligible for refund consideration, and
/// returns them ordered chronologically by timestamp.
pub fn qualify_swaps(
    swaps: Vec<RawSwap>,
    chain: ChainId,
    epoch: Epoch,
    gates: &EpochGates,
    reorg_blacklist: &HashSet<String>,
    stake: &StakeAggregator,
) -> Result<Vec<RawSwap>, RunError> {
    let mut candidates: Vec<RawSwap> = swaps
        .into_iter()
        .filter(|s| !reorg_blacklist.contains(&s.block_hash))
        .filter(|s| epoch < gates.tx_origin_check_epoch || s.initiator == s.tx_origin)
        .collect();

    if epoch >= gates.dedup_epoch {
        let mut seen = HashSet::new();
        for swap in &candidates {
            if !seen.insert(swap.tx_hash.clone()) {
                return Err(RunError::DuplicateSwap {
                    chain,
                    epoch,
                    tx_hash: swap.tx_hash.clone(),
                });
            }
        }
    }

    let threshold = min_stake();
    candidates.retain(|s| {
        stake.balance(&s.tx_origin, s.timestamp, epoch, gates) >= threshold
    });

    candidates.sort_by_key(|s| s.timestamp);
    Ok(candidates)
}
