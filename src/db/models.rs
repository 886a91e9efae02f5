//! Persisted row shapes.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::epoch::Epoch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Idle,
    Validated,
    Rejected,
}

/// `gas_refund_transaction`, unique on `(chainId, hash)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasRefundTransaction {
    pub id: i64,
    pub chain_id: ChainId,
    pub epoch: Epoch,
    pub hash: String,
    pub address: String,
    pub timestamp: i64,
    pub block_number: u64,
    pub gas_used: u64,
    /// wei, as an exact decimal (never a float).
    pub gas_used_chain_currency: BigDecimal,
    pub psp_chain_currency: BigDecimal,
    pub psp_usd: BigDecimal,
    pub chain_currency_usd: BigDecimal,
    pub total_stake_amount_psp: BigDecimal,
    /// Integer string (decimals truncated) once `status != Idle`.
    pub refunded_amount_psp: BigDecimal,
    /// Full precision, never rounded.
    pub refunded_amount_usd: BigDecimal,
    pub status: TransactionStatus,
}

/// `gas_refund_participation`, unique on `(epoch, address, chainId)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub chain_id: ChainId,
    pub epoch: Epoch,
    pub address: String,
    pub refunded_amount_psp: BigDecimal,
    pub merkle_proofs: Vec<String>,
    pub is_completed: bool,
}

/// `gas_refund_distribution`, unique on `(chainId, epoch)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub chain_id: ChainId,
    pub epoch: Epoch,
    pub merkle_root: String,
    pub total_psp_amount_to_refund: BigDecimal,
    pub is_completed: bool,
}
