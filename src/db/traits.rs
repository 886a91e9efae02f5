//! Persistence trait. Grounded in the
//! teacher's `node/db/src/traits.rs` `Read`/`Write` split, adapted to the
//! three domain tables and made async since the real backing store is
//! out-of-process.

use async_trait::async_trait;

use crate::chain::ChainId;
use crate::epoch::Epoch;

use super::models::{Distribution, GasRefundTransaction, Participation, TransactionStatus};

/// An in-place update staged by the re-validation pass.
#[derive(Debug, Clone)]
pub struct RowUpdate {
    pub id: i64,
    pub status: TransactionStatus,
    pub refunded_amount_psp: bigdecimal::BigDecimal,
    pub refunded_amount_usd: bigdecimal::BigDecimal,
}

#[async_trait]
pub trait Database: Send + Sync {
    /// Inserts a batch of `IDLE` rows atomically at slice end
    ///.
    async fn insert_pending_batch(
        &self,
        rows: Vec<GasRefundTransaction>,
    ) -> anyhow::Result<()>;

    /// Highest timestamp already persisted for `(chain, epoch)`, used to
    /// resume an ingestion round idempotently.
    async fn last_processed_timestamp(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Option<i64>>;

    /// The highest epoch with a row whose status is `VALIDATED` or
    /// `REJECTED`, across all chains.
    async fn last_refunded_epoch(&self) -> anyhow::Result<Option<Epoch>>;

    /// Pages through all rows with `epoch >= start_epoch`, ordered by
    /// `(timestamp ASC, hash ASC)`.
    async fn page_rows_from_epoch(
        &self,
        start_epoch: Epoch,
        page_size: u32,
        offset: u64,
    ) -> anyhow::Result<Vec<GasRefundTransaction>>;

    /// All `VALIDATED` rows with `epoch < up_to_epoch_exclusive`, for
    /// `BudgetGuardian::load_state`.
    async fn validated_rows_before(
        &self,
        up_to_epoch_exclusive: Epoch,
    ) -> anyhow::Result<Vec<GasRefundTransaction>>;

    /// Stages row updates from a re-validation pass.
    async fn apply_updates(&self, updates: Vec<RowUpdate>) -> anyhow::Result<()>;

    /// All `VALIDATED` rows for one `(chain, epoch)`, for Merkle
    /// aggregation.
    async fn validated_rows_for_epoch(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Vec<GasRefundTransaction>>;

    /// True once every row for `(chain, epoch)` is `VALIDATED` or
    /// `REJECTED`.
    async fn epoch_fully_classified(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<bool>;

    async fn distribution_exists(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<bool>;

    /// Writes the Distribution row and seals the matching Participation
    /// rows in one atomic step.
    async fn seal_epoch(
        &self,
        distribution: Distribution,
        participations: Vec<Participation>,
    ) -> anyhow::Result<()>;

    async fn distribution_for_epoch(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Option<Distribution>>;

    async fn participations_for_address(
        &self,
        chain: ChainId,
        address: &str,
    ) -> anyhow::Result<Vec<Participation>>;

    async fn participations_for_epoch(
        &self,
        chain: ChainId,
        epoch: Epoch,
    ) -> anyhow::Result<Vec<Participation>>;
}
