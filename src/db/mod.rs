//! Persistence layer: a backend-agnostic trait (`traits`), a
//! thread-safe in-memory backend (`memory`) used by tests and the fake
//! harness, and a real backend (`sqlite`, feature-gated) used in
//! production.

pub mod memory;
pub mod models;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use memory::MemoryDatabase;
pub use models::{Distribution, GasRefundTransaction, Participation, TransactionStatus};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{Database, RowUpdate};
