//! Runtime configuration: defaults, overlaid by a TOML file, overlaid by
//! CLI flags — the same layering a long-running daemon config typically
//! goes through.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::epoch::Epoch;

/// Epoch-gated feature activation constants. All are configurable so historical re-validation runs can
/// reproduce exactly the activation schedule that was live at the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochGates {
    pub genesis: Epoch,
    pub sm_start_epoch: Epoch,
    pub tx_origin_check_epoch: Epoch,
    pub dedup_epoch: Epoch,
    pub epoch_budget_epoch: Epoch,
    pub precision_glitch_epoch: Epoch,
    pub contract_txs_epoch: Epoch,
}

impl Default for EpochGates {
    fn default() -> Self {
        Self {
            genesis: Epoch::new(0),
            sm_start_epoch: Epoch::new(15),
            tx_origin_check_epoch: Epoch::new(10),
            dedup_epoch: Epoch::new(12),
            epoch_budget_epoch: Epoch::new(20),
            precision_glitch_epoch: Epoch::new(18),
            contract_txs_epoch: Epoch::new(25),
        }
    }
}

/// Budget cap constants. PSP amounts are
/// expressed in whole PSP (not wei-scaled) here and scaled by 10^18 when
/// entering `BigDecimal` arithmetic, so the config stays human-readable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetCaps {
    pub max_psp_global_yearly: u64,
    pub max_usd_address_yearly: u64,
}

impl Default for BudgetCaps {
    fn default() -> Self {
        Self {
            max_psp_global_yearly: 30_000_000,
            max_usd_address_yearly: 30_000,
        }
    }
}

/// Ingestion slicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub slice_seconds: i64,
    pub page_size: u32,
    /// Bound on concurrent block-explorer `gasUsed` lookups within one
    /// slice (spec.md §5: "per-transaction enrichment ... may issue
    /// bounded parallel I/O").
    pub max_concurrent_gas_lookups: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            slice_seconds: 6 * 3600,
            page_size: 1000,
            max_concurrent_gas_lookups: 8,
        }
    }
}

/// HTTP client behavior for the external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Human-readable in the TOML file (e.g. `"30s"`), matching the
    /// teacher's `humantime` dependency for duration-valued config
    /// fields rather than raw integer seconds.
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Per-chain external-collaborator endpoints. One entry per configured
/// chain; `Config::load` doesn't require an entry for every chain in
/// `chains` up front (a deployment may add a chain's config before its
/// endpoints are live), but `bin/main.rs`'s `run` fails loudly for any
/// configured chain missing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEndpoints {
    pub chain_id: ChainId,
    pub subgraph_url: String,
    pub explorer_url: String,
    pub price_oracle_url: String,
    pub block_info_url: String,
}

/// Top-level configuration, loaded by [`Config::load`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub chains: Vec<ChainId>,
    pub epoch_gates: EpochGates,
    pub budget_caps: BudgetCaps,
    pub ingestion: IngestionConfig,
    pub http: HttpConfig,
    pub database_url: String,
    pub log_filter: String,
    /// Per-chain subgraph/explorer/price-oracle/block-info endpoints.
    pub endpoints: Vec<ChainEndpoints>,
    /// SPSP and Safety Module staking contracts live once per deployment
    /// (not per aggregator chain), so their endpoints aren't part of
    /// `endpoints` above.
    pub spsp_url: String,
    pub safety_module_url: String,
    /// Unix timestamp of epoch 0's start, used by the genesis-anchored
    /// [`crate::orchestrator::EpochWindowResolver`].
    pub genesis_timestamp: i64,
    pub epoch_length_seconds: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chains: ChainId::ALL.to_vec(),
            epoch_gates: EpochGates::default(),
            budget_caps: BudgetCaps::default(),
            ingestion: IngestionConfig::default(),
            http: HttpConfig::default(),
            database_url: "sqlite://gas-refund.db".to_string(),
            log_filter: "info".to_string(),
            endpoints: Vec::new(),
            spsp_url: String::new(),
            safety_module_url: String::new(),
            genesis_timestamp: 0,
            epoch_length_seconds: 14 * 24 * 3600,
        }
    }
}

impl Config {
    /// Loads defaults, then overlays a TOML file if one is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Config::default();
        if let Some(path) = path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read config file {path:?}: {e}"))?;
            let file_config: Config = toml::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("failed to parse config file {path:?}: {e}"))?;
            config = file_config;
        }
        Ok(config)
    }

    pub fn endpoints_for(&self, chain: ChainId) -> Option<&ChainEndpoints> {
        self.endpoints.iter().find(|e| e.chain_id == chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_serializable_round_trip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }
}
