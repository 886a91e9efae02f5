//! Block explorer client. The
//! subgraph's own gas figure is unreliable, so `gasUsed`
//! is always sourced here instead.

use async_trait::async_trait;

use crate::chain::ChainId;
use crate::error::RecoverableError;

#[async_trait]
pub trait GasExplorer: Send + Sync {
    async fn gas_used(&self, chain: ChainId, tx_hash: &str) -> Result<u64, RecoverableError>;
}

pub struct HttpGasExplorer {
    client: reqwest::Client,
    endpoint_by_chain: std::collections::HashMap<ChainId, String>,
}

impl HttpGasExplorer {
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
struct GasUsedResponse {
    result: GasUsedResult,
}

#[derive(serde::Deserialize)]
struct GasUsedResult {
    #[serde(rename = "gasUsed")]
    gas_used: String,
}

#[async_trait]
impl GasExplorer for HttpGasExplorer {
    async fn gas_used(&self, chain: ChainId, tx_hash: &str) -> Result<u64, RecoverableError> {
        let base = self
            .endpoint_by_chain
            .get(&chain)
            .ok_or_else(|| RecoverableError::Transient {
                status: 0,
                message: format!("no explorer endpoint configured for chain {chain}"),
            })?;
        let url = format!(
            "{base}?module=transaction&action=gettxreceiptstatus&txhash={tx_hash}"
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
                message: "explorer request failed".into(),
            });
        }
        let parsed: GasUsedResponse =
            response
                .json()
                .await
                .map_err(|e| RecoverableError::Transient {
                    status: 0,
                    message: format!("invalid explorer response: {e}"),
                })?;
        u64::from_str_radix(parsed.result.gas_used.trim_start_matches("0x"), 16).map_err(|e| {
            RecoverableError::Transient {
                status: 0,
                message: format!("unparseable gasUsed: {e}"),
            }
        })
    }
}
