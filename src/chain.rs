//! Supported chains.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A chain in the closed, supported set. Values are the chains' native
/// chain IDs; `TryFrom<u64>` is the only way to construct one so an
/// unsupported integer can never silently enter the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum ChainId {
    Mainnet,
    Bsc,
    Polygon,
    Fantom,
    Avalanche,
}

impl ChainId {
    pub const ALL: [ChainId; 5] = [
        ChainId::Mainnet,
        ChainId::Bsc,
        ChainId::Polygon,
        ChainId::Fantom,
        ChainId::Avalanche,
    ];

    pub const fn as_u64(self) -> u64 {
        match self {
            ChainId::Mainnet => 1,
            ChainId::Bsc => 56,
            ChainId::Polygon => 137,
            ChainId::Fantom => 250,
            ChainId::Avalanche => 43114,
        }
    }
}

impl TryFrom<u64> for ChainId {
    type Error = UnsupportedChainId;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        ChainId::ALL
            .into_iter()
            .find(|c| c.as_u64() == value)
            .ok_or(UnsupportedChainId(value))
    }
}

impl From<ChainId> for u64 {
    fn from(chain: ChainId) -> Self {
        chain.as_u64()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u64())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("chain id {0} is not in the supported set")]
pub struct UnsupportedChainId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u64() {
        for chain in ChainId::ALL {
            assert_eq!(ChainId::try_from(chain.as_u64()).unwrap(), chain);
        }
    }

    #[test]
    fn rejects_unsupported_chain() {
        assert!(ChainId::try_from(9999).is_err());
    }
}
