//! Epoch model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Epochs per year, used to roll over yearly budget state.
pub const EPOCHS_PER_YEAR: u32 = 26;

/// A contiguous 14-day interval, identified by an integer ≥ `GENESIS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Epoch(pub u32);

impl Epoch {
    pub const fn new(value: u32) -> Self {
        Epoch(value)
    }

    pub fn succ(self) -> Self {
        Epoch(self.0 + 1)
    }

    /// True when this epoch begins a new budget year relative to `genesis`
    /// (spec.md §4.5 `beginEpoch`: `(epoch − GENESIS) mod EPOCHS_PER_YEAR == 0`).
    pub fn is_year_boundary(self, genesis: Epoch) -> bool {
        self.0 >= genesis.0 && (self.0 - genesis.0) % EPOCHS_PER_YEAR == 0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The scan window actually covered by an epoch: `calc` may be a strict
/// subset of `[start, end)` when resuming a partially-ingested epoch
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochWindow {
    pub epoch: Epoch,
    pub start: i64,
    pub end: i64,
}

impl EpochWindow {
    pub fn calc_start(&self, last_processed_timestamp: Option<i64>) -> i64 {
        match last_processed_timestamp {
            Some(t) => self.start.max(t + 1),
            None => self.start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_boundary_detection() {
        let genesis = Epoch::new(100);
        assert!(Epoch::new(100).is_year_boundary(genesis));
        assert!(Epoch::new(126).is_year_boundary(genesis));
        assert!(!Epoch::new(101).is_year_boundary(genesis));
    }

    #[test]
    fn calc_start_resumes_after_last_processed() {
        let window = EpochWindow {
            epoch: Epoch::new(10),
            start: 1_000,
            end: 2_000,
        };
        assert_eq!(window.calc_start(None), 1_000);
        assert_eq!(window.calc_start(Some(1_500)), 1_501);
        // Resuming before the window start never moves it backward.
        assert_eq!(window.calc_start(Some(10)), 1_000);
    }
}
