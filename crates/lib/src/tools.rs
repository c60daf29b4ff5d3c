//! The agent's wallet-backed toolset.
//!
//! Stands in for the hosted platform's on-chain toolkit: tools are executed
//! locally against the RPC endpoint with the agent's wallet.

use crate::chain::EvmClient;
use async_trait::async_trait;
use ethers_core::types::Address;
use ethers_core::utils::format_units;
use crate::llm::{ToolDefinition, ToolFunctionDefinition};

/// Executes a tool by name and JSON arguments. Returns output or an error string
/// that is fed back to the model.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, args: &serde_json::Value) -> Result<String, String>;
}

/// Toolset backed by the agent wallet and an EVM endpoint.
pub struct WalletToolset {
    address: Address,
    network_id: String,
    evm: EvmClient,
}

impl WalletToolset {
    pub fn new(address: Address, network_id: impl Into<String>, evm: EvmClient) -> Self {
        Self {
            address,
            network_id: network_id.into(),
            evm,
        }
    }

    /// Tool definitions advertised to the model.
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            tool_definition(
                "wallet_address",
                "Get the agent wallet's address and network.",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
            tool_definition(
                "wallet_balance",
                "Get the agent wallet's native token balance.",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
        ]
    }
}

fn tool_definition(name: &str, description: &str, parameters: serde_json::Value) -> ToolDefinition {
    ToolDefinition {
        typ: "function".to_string(),
        function: ToolFunctionDefinition {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters,
        },
    }
}

#[async_trait]
impl ToolExecutor for WalletToolset {
    async fn execute(&self, name: &str, _args: &serde_json::Value) -> Result<String, String> {
        match name {
            "wallet_address" => Ok(format!(
                "{:?} on {}",
                self.address, self.network_id
            )),
            "wallet_balance" => {
                let wei = self
                    .evm
                    .get_balance(self.address)
                    .await
                    .map_err(|e| e.to_string())?;
                let eth = format_units(wei, "ether").map_err(|e| e.to_string())?;
                Ok(format!("{} ETH", eth))
            }
            _ => Err(format!("unknown tool: {}", name)),
        }
    }
}
