//! External collaborators. These are out of the core's scope
//! per spec.md §1 ("treated as external collaborators; only their
//! interface contracts appear in §6") — this module defines the trait
//! seams plus thin `reqwest`-based default implementations, so the core
//! components can be constructed and tested against fakes.

pub mod blockinfo;
pub mod explorer;
pub mod lock;
pub mod price_oracle;
pub mod retry;
pub mod stake;
pub mod subgraph;

pub use blockinfo::BlockInfoService;
pub use explorer::GasExplorer;
pub use lock::DistributedLock;
pub use price_oracle::PriceOracle;
pub use stake::StakeSource;
pub use subgraph::SwapsSubgraph;
