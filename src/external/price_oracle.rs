//! Price oracle client.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::error::RecoverableError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: i64,
    pub psp_price_usd: BigDecimal,
    pub chain_price_usd: BigDecimal,
    pub psp_per_native_rate: BigDecimal,
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn daily_rates(
        &self,
        chain: ChainId,
        start_timestamp: i64,
        end_timestamp: i64,
    ) -> Result<Vec<PricePoint>, RecoverableError>;
}

/// Default HTTP implementation: one GET per chain returning a JSON array of
/// [`PricePoint`]s for `[start_timestamp, end_timestamp)`.
pub struct HttpPriceOracle {
    client: reqwest::Client,
    endpoint_by_chain: std::collections::HashMap<ChainId, String>,
}

impl HttpPriceOracle {
    pub fn new(
        client: reqwest::Client,
        endpoint_by_chain: std::collections::HashMap<ChainId, String>,
    ) -> Self {
        Self {
            client,
            endpoint_by_chain,
        }
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn daily_rates(
        &self,
        chain: ChainId,
        start_timestamp: i64,
        end_timestamp: i64,
    ) -> Result<Vec<PricePoint>, RecoverableError> {
        let base = self
            .endpoint_by_chain
            .get(&chain)
            .ok_or_else(|| RecoverableError::Transient {
                status: 0,
                message: format!("no price oracle endpoint configured for chain {chain}"),
            })?;
        let url = format!("{base}?from={start_timestamp}&to={end_timestamp}");
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
                message: "price oracle request failed".into(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| RecoverableError::Transient {
                status: 0,
                message: format!("invalid price oracle response: {e}"),
            })
    }
}

/// Picks the point with the largest timestamp `<=` `query_timestamp` that
/// falls on the same UTC day as the query.
pub fn resolve_price_point(points: &[PricePoint], query_timestamp: i64) -> Option<&PricePoint> {
    use chrono::{DateTime, Utc};

    let query_date = DateTime::<Utc>::from_timestamp(query_timestamp, 0)?.date_naive();
    points
        .iter()
        .filter(|p| p.timestamp <= query_timestamp)
        .filter(|p| {
            DateTime::<Utc>::from_timestamp(p.timestamp, 0)
                .map(|dt| dt.date_naive() == query_date)
                .unwrap_or(false)
        })
        .max_by_key(|p| p.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn point(ts: i64) -> PricePoint {
        PricePoint {
            timestamp: ts,
            psp_price_usd: BigDecimal::from_str("0.05").unwrap(),
            chain_price_usd: BigDecimal::from_str("2000").unwrap(),
            psp_per_native_rate: BigDecimal::from_str("40000").unwrap(),
        }
    }

    #[test]
    fn picks_latest_point_same_day() {
        let day_start = 1_700_000_000i64 - (1_700_000_000i64 % 86_400);
        let points = vec![point(day_start), point(day_start + 3600), point(day_start + 7200)];
        let resolved = resolve_price_point(&points, day_start + 5000).unwrap();
        assert_eq!(resolved.timestamp, day_start + 3600);
    }

    #[test]
    fn rejects_points_from_a_different_day() {
        let day_start = 1_700_000_000i64 - (1_700_000_000i64 % 86_400);
        let points = vec![point(day_start - 86_400)];
        assert!(resolve_price_point(&points, day_start + 10).is_none());
    }

    #[test]
    fn rejects_points_after_the_query_timestamp() {
        let day_start = 1_700_000_000i64 - (1_700_000_000i64 % 86_400);
        let points = vec![point(day_start + 50_000)];
        assert!(resolve_price_point(&points, day_start + 10).is_none());
    }
}
