//! Stake Aggregator.

use bigdecimal::{BigDecimal, Zero};

use crate::config::EpochGates;
use crate::epoch::Epoch;
use crate::external::stake::StakeSnapshot;

/// Effective staked PSP for `(address, timestamp)`. Before
/// `SM_START_EPOCH` only SPSP counts; from that epoch onward the two
/// sources are summed.
pub struct StakeAggregator {
    spsp: Box<dyn StakeSnapshot>,
    sm: Box<dyn StakeSnapshot>,
}

impl StakeAggregator {
    pub fn new(spsp: Box<dyn StakeSnapshot>, sm: Box<dyn StakeSnapshot>) -> Self {
        Self { spsp, sm }
    }

    pub fn balance(&self, address: &str, timestamp: i64, epoch: Epoch, gates: &EpochGates) -> BigDecimal {
        let spsp_balance = self.spsp.balance(address, timestamp);
        if epoch < gates.sm_start_epoch {
            spsp_balance
        } else {
            spsp_balance + self.sm.balance(address, timestamp)
        }
    }
}
