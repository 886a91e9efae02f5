//! Error taxonomy. Three distinct kinds so callers can decide
//! whether to abort the whole run, cancel one chain's worker, or retry.

use thiserror::Error;

use crate::chain::ChainId;
use crate::epoch::Epoch;

/// Fatal-to-run: the whole run must abort before Merkle sealing, since
/// publishing a root built on top of one of these would be incorrect.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no price point for chain {chain} at timestamp {timestamp} (tx {tx_hash})")]
    MissingPricePoint {
        chain: ChainId,
        timestamp: i64,
        tx_hash: String,
    },

    #[error("negative cap derived for address {address} (epoch {epoch}): prior over-refund, yearly={yearly_used}, requested={requested}")]
    NegativeCap {
        address: String,
        epoch: Epoch,
        yearly_used: String,
        requested: String,
    },

    #[error("transaction {tx_hash} left IDLE after re-validation pass completed")]
    ResidualIdleRow { tx_hash: String },

    #[error("stake {stake} is >= MIN_STAKE but tier() returned no tier: contradiction")]
    TierContradiction { stake: String },

    #[error("duplicate tx_hash {tx_hash} observed in the same ingestion slice on chain {chain} (epoch {epoch} >= DEDUP_EPOCH)")]
    DuplicateSwap {
        chain: ChainId,
        epoch: Epoch,
        tx_hash: String,
    },

    #[error("malformed txGasPrice {raw:?} for chain {chain} (tx {tx_hash}): not a valid decimal")]
    MalformedGasPrice {
        chain: ChainId,
        tx_hash: String,
        raw: String,
    },

    #[error("malformed address {address:?}: not valid hex, cannot encode a Merkle leaf")]
    MalformedAddress { address: String },
}

/// Fatal-to-chain: this chain's worker stops, but other chains' workers
/// keep running (orchestrator uses settled-joining semantics, §7).
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("subgraph unavailable for chain {chain} after retries: {source}")]
    SubgraphUnavailable {
        chain: ChainId,
        #[source]
        source: anyhow::Error,
    },

    #[error("block explorer unavailable for chain {chain} after retries: {source}")]
    ExplorerUnavailable {
        chain: ChainId,
        #[source]
        source: anyhow::Error,
    },

    #[error("database unreachable: {0}")]
    DatabaseUnreachable(#[source] anyhow::Error),

    #[error("failed to acquire per-chain lock for chain {chain}: {source}")]
    LockUnavailable {
        chain: ChainId,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Run(#[from] RunError),
}

/// Recoverable-locally: transient HTTP 5xx / rate-limit. Retried with
/// exponential backoff; only escalated to a [`ChainError`] once the retry
/// budget is exhausted.
#[derive(Debug, Error)]
pub enum RecoverableError {
    #[error("transient HTTP error (status {status}): {message}")]
    Transient { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },
}

impl RecoverableError {
    pub fn is_retryable_status(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }
}

/// Result of driving one chain's ingestion round; "already sealed" is an
/// expected-skip, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochOutcome {
    Processed,
    SkippedAlreadySealed,
}
