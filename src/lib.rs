//! Per-epoch gas-refund entitlement computation for a DEX aggregator.
//!
//! The crate is organized leaf-first, mirroring the control flow described
//! in the design: tier resolution and stake aggregation feed the swap
//! qualifier and refund calculator, which in turn feed the budget guardian;
//! the ingestion driver and re-validation pass sit on top of all of them,
//! and the Merkle builder and epoch orchestrator sit on top of that.

pub mod api;
pub mod budget;
pub mod chain;
pub mod config;
pub mod db;
pub mod decimal;
pub mod epoch;
pub mod error;
pub mod external;
pub mod ingestion;
pub mod logger;
pub mod merkle;
pub mod orchestrator;
pub mod refund;
pub mod revalidation;
pub mod stake;
pub mod swap;
pub mod tier;

pub use chain::ChainId;
pub use epoch::Epoch;
pub use error::{ChainError, RecoverableError, RunError};
