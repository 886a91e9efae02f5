//! SPSP / Safety Module stake sources. Each source must
//! be "loaded once per run over a `[startBlock, endBlock]` window ...
//! then queried as a pure lookup; they may not issue further network I/O
//! per call" — modeled here as a `preload` step returning a snapshot that
//! implements synchronous lookup.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::collections::HashMap;

use crate::decimal::zero;
use crate::error::RecoverableError;

/// A stake source preloaded over a block range. `balance` is a pure,
/// synchronous lookup against the preloaded snapshot — no I/O.
pub trait StakeSnapshot: Send + Sync {
    fn balance(&self, address: &str, timestamp: i64) -> BigDecimal;
}

#[async_trait]
pub trait StakeSource: Send + Sync {
    async fn preload(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Box<dyn StakeSnapshot>, RecoverableError>;
}

#[derive(Debug, Deserialize)]
struct BalanceCheckpoint {
    address: String,
    timestamp: i64,
    balance: BigDecimal,
}

/// A snapshot preloaded as a series of per-address balance checkpoints.
/// `balance` returns the most recent checkpoint at or before `timestamp`,
/// or zero if the address never had one.
pub struct PreloadedStakeSnapshot {
    checkpoints_by_address: HashMap<String, Vec<(i64, BigDecimal)>>,
}

impl PreloadedStakeSnapshot {
    fn from_checkpoints(checkpoints: Vec<BalanceCheckpoint>) -> Self {
        let mut by_address: HashMap<String, Vec<(i64, BigDecimal)>> = HashMap::new();
        for c in checkpoints {
            by_address
                .entry(c.address)
                .or_default()
                .push((c.timestamp, c.balance));
        }
        for entries in by_address.values_mut() {
            entries.sort_by_key(|(ts, _)| *ts);
        }
        Self {
            checkpoints_by_address: by_address,
        }
    }
}

impl StakeSnapshot for PreloadedStakeSnapshot {
    fn balance(&self, address: &str, timestamp: i64) -> BigDecimal {
        let Some(entries) = self.checkpoints_by_address.get(address) else {
            return zero();
        };
        entries
            .iter()
            .rev()
            .find(|(ts, _)| *ts <= timestamp)
            .map(|(_, balance)| balance.clone())
            .unwrap_or_else(zero)
    }
}

/// Default HTTP implementation: one GET per `preload` call returning a JSON
/// array of `{address, timestamp, balance}` checkpoints over
/// `[start_block, end_block]`.
pub struct HttpStakeSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStakeSource {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl StakeSource for HttpStakeSource {
    async fn preload(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Box<dyn StakeSnapshot>, RecoverableError> {
        let url = format!(
            "{}?fromBlock={start_block}&toBlock={end_block}",
            self.endpoint
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RecoverableError::Transient {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(RecoverableError::Transient {
                status: response.status().as_u16(),
                message: "stake source request failed".into(),
            });
        }
        let checkpoints: Vec<BalanceCheckpoint> =
            response
                .json()
                .await
                .map_err(|e| RecoverableError::Transient {
                    status: 0,
                    message: format!("invalid stake source response: {e}"),
                })?;
        Ok(Box::new(PreloadedStakeSnapshot::from_checkpoints(checkpoints)))
    }
}
