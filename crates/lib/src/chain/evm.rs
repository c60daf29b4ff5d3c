//! Minimal EVM JSON-RPC client over HTTP.

use ethers_core::types::{Address, Bytes, H256, U256};
use ethers_core::utils::hex;
use serde::Deserialize;
use serde_json::json;

/// Client for an EVM JSON-RPC endpoint.
#[derive(Clone)]
pub struct EvmClient {
    rpc_url: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("rpc request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("malformed rpc result: {0}")]
    Decode(String),
    #[error("signing failed: {0}")]
    Sign(String),
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl EvmClient {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let res = self.client.post(&self.rpc_url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChainError::Rpc(format!("{} {}", status, body)));
        }
        let data: RpcResponse = res.json().await?;
        if let Some(err) = data.error {
            return Err(ChainError::Rpc(format!("{} (code {})", err.message, err.code)));
        }
        data.result
            .ok_or_else(|| ChainError::Decode(format!("{}: no result", method)))
    }

    async fn request_quantity(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<U256, ChainError> {
        let value = self.request(method, params).await?;
        let s = value
            .as_str()
            .ok_or_else(|| ChainError::Decode(format!("{}: result is not a string", method)))?;
        parse_quantity(s).ok_or_else(|| ChainError::Decode(format!("{}: bad quantity {}", method, s)))
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.request_quantity("eth_chainId", json!([])).await?.as_u64())
    }

    /// Pending nonce for the address.
    pub async fn transaction_count(&self, address: Address) -> Result<U256, ChainError> {
        self.request_quantity(
            "eth_getTransactionCount",
            json!([format!("{:?}", address), "pending"]),
        )
        .await
    }

    pub async fn gas_price(&self) -> Result<U256, ChainError> {
        self.request_quantity("eth_gasPrice", json!([])).await
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        self.request_quantity("eth_getBalance", json!([format!("{:?}", address), "latest"]))
            .await
    }

    pub async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: &Bytes,
    ) -> Result<U256, ChainError> {
        self.request_quantity(
            "eth_estimateGas",
            json!([{
                "from": format!("{:?}", from),
                "to": format!("{:?}", to),
                "data": format!("0x{}", hex::encode(data)),
            }]),
        )
        .await
    }

    /// eth_call against `to` with the given calldata; returns the raw result bytes.
    pub async fn call(&self, to: Address, data: &Bytes) -> Result<Bytes, ChainError> {
        let value = self
            .request(
                "eth_call",
                json!([{
                    "to": format!("{:?}", to),
                    "data": format!("0x{}", hex::encode(data)),
                }, "latest"]),
            )
            .await?;
        let s = value
            .as_str()
            .ok_or_else(|| ChainError::Decode("eth_call: result is not a string".to_string()))?;
        let raw = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| ChainError::Decode(format!("eth_call: {}", e)))?;
        Ok(Bytes::from(raw))
    }

    /// Submit a signed raw transaction; returns the transaction hash.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256, ChainError> {
        let value = self
            .request(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;
        let s = value.as_str().ok_or_else(|| {
            ChainError::Decode("eth_sendRawTransaction: result is not a string".to_string())
        })?;
        s.parse()
            .map_err(|_| ChainError::Decode(format!("eth_sendRawTransaction: bad hash {}", s)))
    }
}

/// Parse a JSON-RPC quantity ("0x…" hex string).
fn parse_quantity(s: &str) -> Option<U256> {
    U256::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rpc_quantities() {
        assert_eq!(parse_quantity("0x0"), Some(U256::zero()));
        assert_eq!(parse_quantity("0x3b9aca00"), Some(U256::from(1_000_000_000u64)));
        assert_eq!(parse_quantity("2a"), Some(U256::from(42u64)));
        assert_eq!(parse_quantity("0xzz"), None);
    }
}
