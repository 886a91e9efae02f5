//! Block-info service.

use async_trait::async_trait;

use crate::chain::ChainId;
use crate::error::RecoverableError;

#[async_trait]
pub trait BlockInfoService: Send + Sync {
    async fn block_after_timestamp(
        &self,
        chain: ChainId,
        timestamp: i64,
    ) -> Result<u64, RecoverableError>;
}

/// Default HTTP implementation: one GET per chain returning
/// `{"blockNumber": <u64>}` for the first block at or after `timestamp`.
pub struct HttpBlockInfoService {
    client: reqwest::Client,
    endpoint_by_chain: std::collections::HashMap<ChainId, String>,
}

impl HttpBlockInfoService {
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

#[derive(serde::Deserialize)]
struct BlockAfterTimestampResponse {
    #[serde(rename = "blockNumber")]
    block_number: u64,
}

#[async_trait]
impl BlockInfoService for HttpBlockInfoService {
    async fn block_after_timestamp(
        &self,
        chain: ChainId,
        timestamp: i64,
    ) -> Result<u64, RecoverableError> {
        let base = self
            .endpoint_by_chain
            .get(&chain)
            .ok_or_else(|| RecoverableError::Transient {
                status: 0,
                message: format!("no block-info endpoint configured for chain {chain}"),
            })?;
        let url = format!("{base}?timestamp={timestamp}");
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
                message: "block-info request failed".into(),
            });
        }
        let parsed: BlockAfterTimestampResponse =
            response
                .json()
                .await
                .map_err(|e| RecoverableError::Transient {
                    status: 0,
                    message: format!("invalid block-info response: {e}"),
                })?;
        Ok(parsed.block_number)
    }
}
