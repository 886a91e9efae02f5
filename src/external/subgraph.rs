//! Swaps subgraph client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::error::RecoverableError;

/// One raw Augustus swap as returned by the subgraph, before qualification
///.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSwap {
    pub tx_hash: String,
    pub tx_origin: String,
    pub initiator: String,
    pub tx_gas_price: String,
    pub block_number: u64,
    pub block_hash: String,
    pub timestamp: i64,
    pub chain_id: ChainId,
}

/// Paginated GraphQL query over `[number_gte, number_lt)` by timestamp,
/// optionally excluding reorged blocks.
#[async_trait]
pub trait SwapsSubgraph: Send + Sync {
    async fn fetch_swaps(
        &self,
        chain: ChainId,
        start_timestamp: i64,
        end_timestamp: i64,
        reorg_blacklist: &[String],
    ) -> Result<Vec<RawSwap>, RecoverableError>;
}

/// Default GraphQL-over-HTTP implementation, paginated by `(first, skip)`
/// as spec.md §6 describes.
pub struct HttpSwapsSubgraph {
    client: reqwest::Client,
    endpoint_by_chain: std::collections::HashMap<ChainId, String>,
    page_size: u32,
}

impl HttpSwapsSubgraph {
    pub fn new(
        client: reqwest::Client,
        endpoint_by_chain: std::collections::HashMap<ChainId, String>,
        page_size: u32,
    ) -> Self {
        Self {
            client,
            endpoint_by_chain,
            page_size,
        }
    }

    fn endpoint(&self, chain: ChainId) -> Result<&str, RecoverableError> {
        self.endpoint_by_chain
            .get(&chain)
            .map(String::as_str)
            .ok_or_else(|| RecoverableError::Transient {
                status: 0,
                message: format!("no subgraph endpoint configured for chain {chain}"),
            })
    }
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<SwapsData>,
}

#[derive(Debug, Deserialize)]
struct SwapsData {
    swaps: Vec<WireSwap>,
}

/// Shape returned on the wire; `chain_id` isn't part of the subgraph's
/// response (each subgraph only ever serves one chain) so it's stamped on
/// after deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSwap {
    tx_hash: String,
    tx_origin: String,
    initiator: String,
    tx_gas_price: String,
    block_number: u64,
    block_hash: String,
    timestamp: i64,
}

impl WireSwap {
    fn into_raw_swap(self, chain_id: ChainId) -> RawSwap {
        RawSwap {
            tx_hash: self.tx_hash,
            tx_origin: self.tx_origin,
            initiator: self.initiator,
            tx_gas_price: self.tx_gas_price,
            block_number: self.block_number,
            block_hash: self.block_hash,
            timestamp: self.timestamp,
            chain_id,
        }
    }
}

const SWAPS_QUERY: &str = r#"
query Swaps($gte: Int!, $lt: Int!, $first: Int!, $skip: Int!, $blockHashNotIn: [String!]) {
  swaps(
    first: $first
    skip: $skip
    where: { timestamp_gte: $gte, timestamp_lt: $lt, blockHash_not_in: $blockHashNotIn }
  ) {
    txHash
    txOrigin
    initiator
    txGasPrice
    blockNumber
    blockHash
    timestamp
  }
}
"#;

#[async_trait]
impl SwapsSubgraph for HttpSwapsSubgraph {
    async fn fetch_swaps(
        &self,
        chain: ChainId,
        start_timestamp: i64,
        end_timestamp: i64,
        reorg_blacklist: &[String],
    ) -> Result<Vec<RawSwap>, RecoverableError> {
        let endpoint = self.endpoint(chain)?.to_string();
        let mut out = Vec::new();
        let mut skip = 0u32;
        loop {
            let body = GraphQlRequest {
                query: SWAPS_QUERY,
                variables: serde_json::json!({
                    "gte": start_timestamp,
                    "lt": end_timestamp,
                    "first": self.page_size,
                    "skip": skip,
                    "blockHashNotIn": reorg_blacklist,
                }),
            };
            let response = self
                .client
                .post(&endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| RecoverableError::Transient {
                    status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    message: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(RecoverableError::Transient {
                    status: status.as_u16(),
                    message: format!("subgraph returned {status}"),
                });
            }

            let parsed: GraphQlResponse =
                response
                    .json()
                    .await
                    .map_err(|e| RecoverableError::Transient {
                        status: 0,
                        message: format!("invalid subgraph response: {e}"),
                    })?;
            let mut page = parsed
                .data
                .map(|d| d.swaps)
                .unwrap_or_default()
                .into_iter()
                .map(|wire| wire.into_raw_swap(chain))
                .collect::<Vec<_>>();
            let got = page.len() as u32;
            out.append(&mut page);
            if got < self.page_size {
                break;
            }
            skip += self.page_size;
        }
        Ok(out)
    }
}
