//! In-memory `Database` implementation, for tests and for driving the
//! re-validation pass with a fake store. A thread-safe `HashMap` wrapper,
//! guarded the same way the on-disk backend guards its connection pool.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::chain::ChainId;
use crate::epoch::Epoch;

use super::models::{Distribution, GasRefundTransaction, Participation, TransactionStatus};
use super::traits::{Database, RowUpdate};

#[derive(Default)]
struct Inner {
    transactions: Vec<GasRefundTransaction>,
    distributions: Vec<Distribution>,
    participations: Vec<Participation>,
}

#[derive(Clone)]
pub struct MemoryDatabase {
    inner: Arc<RwLock<Inner>>,
    next_id: Arc<AtomicI64>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/seeding helper: inserts rows, assigning ids if unset (`id == 0`).
    pub fn seed(&self, mut rows: Vec<GasRefundTransaction>) {
        let mut inner = self.inner.write();
        for row in &mut rows {
            if row.id == 0 {
                row.id = self.next_id.fetch_add(1, Ordering::SeqCst);
            }
        }
        inner.transactions.extend(rows);
    }

    pub fn all_rows(&self) -> Vec<GasRefundTransaction> {
        self.inner.read().transactions.clone()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn insert_pending_batch(&self, mut rows: Vec<GasRefundTransaction>) -> anyhow::Result<()> {
        let mut inner = self.inner.write();
        for row in &mut rows {
            row.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        }
        inner.transactions.extend(rows);
        Ok(())
    }

    async fn last_processed_timestamp(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Option<i64>> {
        Ok(self
            .inner
            .read()
            .transactions
            .iter()
            .filter(|t| t.chain_id == chain && t.epoch == epoch)
            .map(|t| t.timestamp)
            .max())
    }

    async fn last_refunded_epoch(&self) -> anyhow::Result<Option<Epoch>> {
        Ok(self
            .inner
            .read()
            .transactions
            .iter()
            .filter(|t| matches!(t.status, TransactionStatus::Validated | TransactionStatus::Rejected))
            .map(|t| t.epoch)
            .max())
    }

    async fn page_rows_from_epoch(
        &self,
        start_epoch: Epoch,
        page_size: u32,
        offset: u64,
    ) -> anyhow::Result<Vec<GasRefundTransaction>> {
        let inner = self.inner.read();
        let mut rows: Vec<GasRefundTransaction> = inner
            .transactions
            .iter()
            .filter(|t| t.epoch >= start_epoch)
            .cloned()
            .collect();
        // Canonical order: (timestamp ASC, hash ASC) — hash is the
        // deterministic tie-breaker.
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.hash.cmp(&b.hash)));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(page_size as usize)
            .collect())
    }

    async fn validated_rows_before(
        &self,
        up_to_epoch_exclusive: Epoch,
    ) -> anyhow::Result<Vec<GasRefundTransaction>> {
        Ok(self
            .inner
            .read()
            .transactions
            .iter()
            .filter(|t| t.epoch < up_to_epoch_exclusive && t.status == TransactionStatus::Validated)
            .cloned()
            .collect())
    }

    async fn apply_updates(&self, updates: Vec<RowUpdate>) -> anyhow::Result<()> {
        let mut inner = self.inner.write();
        for update in updates {
            if let Some(row) = inner.transactions.iter_mut().find(|t| t.id == update.id) {
                row.status = update.status;
                row.refunded_amount_psp = update.refunded_amount_psp;
                row.refunded_amount_usd = update.refunded_amount_usd;
            }
        }
        Ok(())
    }

    async fn validated_rows_for_epoch(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Vec<GasRefundTransaction>> {
        Ok(self
            .inner
            .read()
            .transactions
            .iter()
            .filter(|t| {
                t.chain_id == chain && t.epoch == epoch && t.status == TransactionStatus::Validated
            })
            .cloned()
            .collect())
    }

    async fn epoch_fully_classified(&self, chain: ChainId, epoch: Epoch) -> anyhow::Result<bool> {
        Ok(self
            .inner
            .read()
            .transactions
            .iter()
            .filter(|t| t.chain_id == chain && t.epoch == epoch)
            .all(|t| t.status != TransactionStatus::Idle))
    }

    async fn distribution_exists(&self, chain: ChainId, epoch: Epoch) -> anyhow::Result<bool> {
        Ok(self
            .inner
            .read()
            .distributions
            .iter()
            .any(|d| d.chain_id == chain && d.epoch == epoch))
    }

    async fn seal_epoch(
        &self,
        distribution: Distribution,
        participations: Vec<Participation>,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.write();
        inner.distributions.push(distribution);
        inner.participations.extend(participations);
        Ok(())
    }

    async fn distribution_for_epoch(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Option<Distribution>> {
        Ok(self
            .inner
            .read()
            .distributions
            .iter()
            .find(|d| d.chain_id == chain && d.epoch == epoch)
            .cloned())
    }

    async fn participations_for_address(
        &self,
        chain: ChainId,
        address: &str,
    ) -> anyhow::Result<Vec<Participation>> {
        Ok(self
            .inner
            .read()
            .participations
            .iter()
            .filter(|p| p.chain_id == chain && p.address == address)
            .cloned()
            .collect())
    }

    async fn participations_for_epoch(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Vec<Participation>> {
        Ok(self
            .inner
            .read()
            .participations
            .iter()
            .filter(|p| p.chain_id == chain && p.epoch == epoch)
            .cloned()
            .collect())
    }
}
