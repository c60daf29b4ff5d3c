//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.mintline/config.json`) and environment.
//! Collaborator credentials come from the environment only and are validated at startup;
//! the file carries non-secret settings (port, endpoints, contract address).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Required environment variables; startup fails listing any that are absent.
pub const REQUIRED_ENV: &[&str] = &[
    "AGENT_API_KEY",
    "AGENT_WALLET_KEY",
    "TWILIO_ACCOUNT_SID",
    "TWILIO_AUTH_TOKEN",
    "TWILIO_PHONE_NUMBER",
    "CHAIN_RPC_URL",
    "MINT_PRIVATE_KEY",
];

const DEFAULT_MODEL: &str = "llama";
const DEFAULT_NETWORK_ID: &str = "base-sepolia";
const DEFAULT_WALLET_FILE: &str = "wallet_data.json";
const DEFAULT_CONTRACT_ADDRESS: &str = "0xAC99583EE8ae7BfCda7D43657F6a4c0c0Da7E0B8";
const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Webhook server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Agent settings (Gaia endpoint, model, wallet file).
    #[serde(default)]
    pub agent: AgentConfig,

    /// Channel settings (Twilio).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Chain settings (RPC, contract, gas).
    #[serde(default)]
    pub chain: ChainConfig,
}

/// Webhook server bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port for provider webhooks (default 3000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0" — the provider must be able to reach the webhook).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Agent settings: hosted endpoint, model, network, wallet persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// OpenAI-compatible base URL of the Gaia node. Default is the hosted llamatool endpoint.
    pub base_url: Option<String>,
    /// Model name (default "llama").
    pub model: Option<String>,
    /// Network id for the agent wallet (default "base-sepolia"). Overridden by NETWORK_ID env.
    pub network_id: Option<String>,
    /// Path of the persisted wallet-state file (default "wallet_data.json").
    pub wallet_file: Option<PathBuf>,
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub twilio: TwilioChannelConfig,
}

/// Twilio channel config. Credentials come from TWILIO_* env.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwilioChannelConfig {
    /// API base URL (default https://api.twilio.com; override for tests).
    pub api_base_url: Option<String>,
}

/// Chain config. The RPC URL comes from CHAIN_RPC_URL env (config value is a fallback).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub rpc_url: Option<String>,
    /// Deployed mint contract. Default is the reference deployment.
    pub contract_address: Option<String>,
    /// Gas limit used when eth_estimateGas fails.
    pub gas_limit: Option<u64>,
}

/// Names of required environment variables that are absent or empty.
pub fn missing_required_env() -> Vec<&'static str> {
    REQUIRED_ENV
        .iter()
        .filter(|name| env_var(name).is_none())
        .copied()
        .collect()
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Collaborator credentials pulled from the environment. `from_env` fails naming what is missing;
/// callers are expected to have checked `missing_required_env` first for per-name diagnostics.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub agent_api_key: String,
    pub agent_wallet_key: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub chain_rpc_url: String,
    pub mint_private_key: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        let missing = missing_required_env();
        if !missing.is_empty() {
            anyhow::bail!("required environment variables are not set: {}", missing.join(", "));
        }
        Ok(Self {
            agent_api_key: env_var("AGENT_API_KEY").unwrap_or_default(),
            agent_wallet_key: env_var("AGENT_WALLET_KEY").unwrap_or_default(),
            twilio_account_sid: env_var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env_var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env_var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
            chain_rpc_url: env_var("CHAIN_RPC_URL").unwrap_or_default(),
            mint_private_key: env_var("MINT_PRIVATE_KEY").unwrap_or_default(),
        })
    }
}

/// Resolve the webhook port: PORT env overrides config.
pub fn resolve_port(config: &Config) -> u16 {
    env_var("PORT")
        .and_then(|s| s.parse().ok())
        .unwrap_or(config.gateway.port)
}

/// Resolve the agent model name.
pub fn resolve_model(agent: &AgentConfig) -> String {
    agent
        .model
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_MODEL)
        .to_string()
}

/// Resolve the agent wallet network id: NETWORK_ID env overrides config; default "base-sepolia".
pub fn resolve_network_id(agent: &AgentConfig) -> String {
    env_var("NETWORK_ID")
        .or_else(|| {
            agent
                .network_id
                .as_deref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_NETWORK_ID.to_string())
}

/// Resolve the persisted wallet-state file path.
pub fn resolve_wallet_file(agent: &AgentConfig) -> PathBuf {
    agent
        .wallet_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WALLET_FILE))
}

/// Resolve the mint contract address.
pub fn resolve_contract_address(chain: &ChainConfig) -> String {
    chain
        .contract_address
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CONTRACT_ADDRESS)
        .to_string()
}

/// Resolve the chain RPC URL: CHAIN_RPC_URL env first, then config.
pub fn resolve_chain_rpc_url(chain: &ChainConfig) -> Option<String> {
    env_var("CHAIN_RPC_URL").or_else(|| {
        chain
            .rpc_url
            .as_deref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the Twilio API base URL.
pub fn resolve_twilio_api_base(twilio: &TwilioChannelConfig) -> String {
    twilio
        .api_base_url
        .as_deref()
        .map(|s| s.trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.to_string())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("MINTLINE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".mintline").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or MINTLINE_CONFIG_PATH). Missing file => default config.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(default_config_path);
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 3000);
        assert_eq!(g.bind, "0.0.0.0");
    }

    #[test]
    fn resolve_defaults_when_config_empty() {
        let config = Config::default();
        assert_eq!(resolve_model(&config.agent), "llama");
        assert_eq!(resolve_wallet_file(&config.agent), PathBuf::from("wallet_data.json"));
        assert_eq!(
            resolve_contract_address(&config.chain),
            DEFAULT_CONTRACT_ADDRESS
        );
        assert_eq!(resolve_twilio_api_base(&config.channels.twilio), "https://api.twilio.com");
    }

    #[test]
    fn twilio_api_base_strips_trailing_slash() {
        let twilio = TwilioChannelConfig {
            api_base_url: Some("http://127.0.0.1:9/".to_string()),
        };
        assert_eq!(resolve_twilio_api_base(&twilio), "http://127.0.0.1:9");
    }

    // Env mutation in one test so parallel test threads don't race on the variables.
    #[test]
    fn missing_required_env_lists_absent_names() {
        for name in REQUIRED_ENV {
            std::env::remove_var(name);
        }
        let missing = missing_required_env();
        assert_eq!(missing, REQUIRED_ENV.to_vec());

        for name in REQUIRED_ENV {
            std::env::set_var(name, "x");
        }
        assert!(missing_required_env().is_empty());

        std::env::set_var("TWILIO_AUTH_TOKEN", "  ");
        assert_eq!(missing_required_env(), vec!["TWILIO_AUTH_TOKEN"]);

        for name in REQUIRED_ENV {
            std::env::remove_var(name);
        }
    }
}
