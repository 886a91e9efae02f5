//! Budget Guardian. In-memory, deterministic,
//! synchronous — no I/O happens here; the caller is responsible for
//! loading/persisting state around it.

use std::collections::HashMap;

use bigdecimal::BigDecimal;

use crate::config::BudgetCaps;
use crate::decimal::{floor_to_integer, psp_scale, zero};
use crate::epoch::{Epoch, EPOCHS_PER_YEAR};
use crate::error::RunError;

/// Result of capping a raw refund against the three budget dimensions
///.
///
/// The global-PSP-only path can set `capped_psp` without `capped_usd`
///; this is
/// intentional, not an invariant violation — see DESIGN.md.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppliedCaps {
    pub capped_usd: Option<BigDecimal>,
    pub capped_psp: Option<BigDecimal>,
}

impl AppliedCaps {
    pub fn none() -> Self {
        Self::default()
    }

    /// The amount that should actually be committed to the ledger: the
    /// capped value if one was produced, otherwise the raw value.
    pub fn effective_usd(&self, raw_usd: &BigDecimal) -> BigDecimal {
        self.capped_usd.clone().unwrap_or_else(|| raw_usd.clone())
    }

    pub fn effective_psp(&self, raw_psp: &BigDecimal) -> BigDecimal {
        self.capped_psp.clone().unwrap_or_else(|| raw_psp.clone())
    }
}

pub struct BudgetGuardian {
    caps: ScaledCaps,
    total_psp_refunded_for_year: BigDecimal,
    yearly_usd_by_address: HashMap<String, BigDecimal>,
    epoch_usd_by_address: HashMap<String, BigDecimal>,
}

struct ScaledCaps {
    max_psp_global_yearly: BigDecimal,
    max_usd_address_yearly: BigDecimal,
    max_usd_address_epoch: BigDecimal,
}

impl ScaledCaps {
    fn from_config(caps: &BudgetCaps) -> Self {
        let max_usd_address_yearly = BigDecimal::from(caps.max_usd_address_yearly);
        Self {
            max_psp_global_yearly: BigDecimal::from(caps.max_psp_global_yearly) * psp_scale(),
            max_usd_address_epoch: &max_usd_address_yearly / BigDecimal::from(EPOCHS_PER_YEAR),
            max_usd_address_yearly,
        }
    }
}

impl BudgetGuardian {
    pub fn new(caps: &BudgetCaps) -> Self {
        Self {
            caps: ScaledCaps::from_config(caps),
            total_psp_refunded_for_year: zero(),
            yearly_usd_by_address: HashMap::new(),
            epoch_usd_by_address: HashMap::new(),
        }
    }

    /// `beginEpoch`: clears the per-epoch counters; on a year boundary
    /// also clears the yearly counters.
    pub fn begin_epoch(&mut self, epoch: Epoch, genesis: Epoch) {
        self.epoch_usd_by_address.clear();
        if epoch.is_year_boundary(genesis) {
            self.yearly_usd_by_address.clear();
            self.total_psp_refunded_for_year = zero();
        }
    }

    pub fn is_global_spent(&self) -> bool {
        self.total_psp_refunded_for_year >= self.caps.max_psp_global_yearly
    }

    pub fn has_address_spent_yearly(&self, address: &str) -> bool {
        self.yearly_usd_by_address
            .get(address)
            .map(|used| used >= &self.caps.max_usd_address_yearly)
            .unwrap_or(false)
    }

    pub fn has_address_spent_epoch(&self, address: &str) -> bool {
        self.epoch_usd_by_address
            .get(address)
            .map(|used| used >= &self.caps.max_usd_address_epoch)
            .unwrap_or(false)
    }

    fn yearly_used(&self, address: &str) -> BigDecimal {
        self.yearly_usd_by_address
            .get(address)
            .cloned()
            .unwrap_or_else(zero)
    }

    fn epoch_used(&self, address: &str) -> BigDecimal {
        self.epoch_usd_by_address
            .get(address)
            .cloned()
            .unwrap_or_else(zero)
    }

    /// Caps a raw refund under the three budget dimensions, in the order
    /// spec.md §4.5 prescribes: yearly per-address USD, then epoch
    /// per-address USD (only from `EPOCH_BUDGET_EPOCH`), then yearly
    /// global PSP.
    pub fn apply_caps(
        &self,
        address: &str,
        epoch: Epoch,
        epoch_budget_epoch: Epoch,
        refund_usd: &BigDecimal,
        refund_psp: &BigDecimal,
        psp_price_usd: &BigDecimal,
    ) -> Result<AppliedCaps, RunError> {
        let mut capped_usd: Option<BigDecimal> = None;
        let mut capped_psp: Option<BigDecimal> = None;

        let yearly_used = self.yearly_used(address);
        if &yearly_used + refund_usd > self.caps.max_usd_address_yearly {
            let remaining = &self.caps.max_usd_address_yearly - &yearly_used;
            if remaining < zero() {
                return Err(RunError::NegativeCap {
                    address: address.to_string(),
                    epoch,
                    yearly_used: yearly_used.to_string(),
                    requested: refund_usd.to_string(),
                });
            }
            capped_psp = Some(floor_to_integer(&(&remaining / psp_price_usd * psp_scale())));
            capped_usd = Some(remaining);
        }

        if epoch >= epoch_budget_epoch && capped_usd.is_none() {
            let epoch_used = self.epoch_used(address);
            if &epoch_used + refund_usd > self.caps.max_usd_address_epoch {
                let remaining = &self.caps.max_usd_address_epoch - &epoch_used;
                if remaining < zero() {
                    return Err(RunError::NegativeCap {
                        address: address.to_string(),
                        epoch,
                        yearly_used: epoch_used.to_string(),
                        requested: refund_usd.to_string(),
                    });
                }
                capped_psp = Some(floor_to_integer(&(&remaining / psp_price_usd * psp_scale())));
                capped_usd = Some(remaining);
            }
        }

        let chosen_psp = capped_psp.clone().unwrap_or_else(|| refund_psp.clone());
        if &self.total_psp_refunded_for_year + &chosen_psp > self.caps.max_psp_global_yearly {
            let remaining = &self.caps.max_psp_global_yearly - &self.total_psp_refunded_for_year;
            if remaining < zero() {
                return Err(RunError::NegativeCap {
                    address: address.to_string(),
                    epoch,
                    yearly_used: self.total_psp_refunded_for_year.to_string(),
                    requested: chosen_psp.to_string(),
                });
            }
            // The global cap is asset-denominated: cappedUSD is deliberately
            // left untouched here.
            let bounded = match &capped_psp {
                Some(existing) => existing.min(&remaining).clone(),
                None => remaining,
            };
            capped_psp = Some(bounded);
        }

        Ok(AppliedCaps {
            capped_usd,
            capped_psp,
        })
    }

    pub fn increase_epoch_usd(&mut self, address: &str, amount: &BigDecimal, epoch: Epoch, epoch_budget_epoch: Epoch) {
        if epoch >= epoch_budget_epoch {
            let entry = self
                .epoch_usd_by_address
                .entry(address.to_string())
                .or_insert_with(zero);
            *entry += amount;
        }
    }

    pub fn increase_yearly_usd(&mut self, address: &str, amount: &BigDecimal) {
        let entry = self
            .yearly_usd_by_address
            .entry(address.to_string())
            .or_insert_with(zero);
        *entry += amount;
    }

    pub fn increase_total_psp(&mut self, amount: &BigDecimal) {
        self.total_psp_refunded_for_year += amount;
    }

    /// `loadState`: rebuilds the in-memory counters from persisted
    /// `VALIDATED` rows with `epoch < up_to_epoch_exclusive`. Rows are `(address, epoch, refunded_amount_psp,
    /// refunded_amount_usd)` tuples already filtered to `VALIDATED`.
    pub fn load_state<'a, I>(&mut self, validated_rows: I, up_to_epoch_exclusive: Epoch)
    where
        I: IntoIterator<Item = (&'a str, Epoch, &'a BigDecimal, &'a BigDecimal)>,
    {
        self.total_psp_refunded_for_year = zero();
        self.yearly_usd_by_address.clear();
        self.epoch_usd_by_address.clear();
        for (address, epoch, psp, usd) in validated_rows {
            if epoch < up_to_epoch_exclusive {
                self.total_psp_refunded_for_year += psp;
                self.increase_yearly_usd(address, usd);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn guardian() -> BudgetGuardian {
        BudgetGuardian::new(&BudgetCaps::default())
    }

    #[test]
    fn s2_epoch_cap_truncates_remaining_budget() {
        let mut g = guardian();
        let epoch_budget_epoch = Epoch::new(20);
        // 30 prior validated rows already summed to 1152.99 USD this epoch.
        g.increase_epoch_usd(
            "0xaddr",
            &BigDecimal::from_str("1152.99").unwrap(),
            epoch_budget_epoch,
            epoch_budget_epoch,
        );
        let psp_price_usd = BigDecimal::from_str("1").unwrap();
        let refund_usd = BigDecimal::from_str("5.00").unwrap();
        let refund_psp = BigDecimal::from_str("5000000000000000000").unwrap();
        let caps = g
            .apply_caps(
                "0xaddr",
                epoch_budget_epoch,
                epoch_budget_epoch,
                &refund_usd,
                &refund_psp,
                &psp_price_usd,
            )
            .unwrap();
        let capped_usd = caps.capped_usd.unwrap();
        // MAX_USD_ADDRESS_EPOCH = 30000/26 = 1153.8461538461538461...
        let expected = BigDecimal::from_str("30000").unwrap() / BigDecimal::from(26)
            - BigDecimal::from_str("1152.99").unwrap();
        assert_eq!(capped_usd, expected);
    }

    #[test]
    fn s3_global_cap_truncates_psp_only() {
        let mut g = guardian();
        g.increase_total_psp(&(BigDecimal::from_str("29999999.5").unwrap() * psp_scale()));
        let refund_psp = BigDecimal::from_str("2").unwrap() * psp_scale();
        let refund_usd = BigDecimal::from_str("0.1").unwrap();
        let psp_price_usd = BigDecimal::from_str("0.05").unwrap();
        let caps = g
            .apply_caps(
                "0xaddr",
                Epoch::new(5),
                Epoch::new(9999),
                &refund_usd,
                &refund_psp,
                &psp_price_usd,
            )
            .unwrap();
        assert_eq!(caps.capped_usd, None);
        assert_eq!(
            caps.capped_psp.unwrap(),
            BigDecimal::from_str("0.5").unwrap() * psp_scale()
        );
    }

    #[test]
    fn begin_epoch_clears_yearly_state_on_year_boundary() {
        let mut g = guardian();
        g.increase_total_psp(&BigDecimal::from(100));
        g.increase_yearly_usd("0xaddr", &BigDecimal::from(100));
        let genesis = Epoch::new(0);
        g.begin_epoch(Epoch::new(26), genesis);
        assert_eq!(g.total_psp_refunded_for_year, zero());
        assert!(!g.has_address_spent_yearly("0xaddr"));
    }

    #[test]
    fn begin_epoch_preserves_yearly_state_off_boundary() {
        let mut g = guardian();
        g.increase_total_psp(&BigDecimal::from(100));
        let genesis = Epoch::new(0);
        g.begin_epoch(Epoch::new(5), genesis);
        assert_eq!(g.total_psp_refunded_for_year, BigDecimal::from(100));
    }
}
