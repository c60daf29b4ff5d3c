//! Agent wallet state: restore from the persisted blob, export after init.
//!
//! The wallet file is read if present, handed to restore as-is, and rewritten
//! unconditionally after every initialization. Concurrent requests race on the
//! file last-writer-wins; there is no locking.

use anyhow::{Context, Result};
use ethers_core::types::Address;
use ethers_signers::{LocalWallet, Signer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Persisted wallet record (the "blob"). Opaque to callers; restore is the only consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub network_id: String,
    pub address: String,
}

/// The wallet-state file: load if present, overwrite on persist.
#[derive(Debug, Clone)]
pub struct WalletStore {
    path: PathBuf,
}

impl WalletStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw blob contents, or None when the file does not exist.
    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let s = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading wallet state from {}", self.path.display()))?;
        Ok(Some(s))
    }

    /// Overwrite the wallet file with the exported blob.
    pub fn persist(&self, blob: &str) -> Result<()> {
        std::fs::write(&self.path, blob)
            .with_context(|| format!("writing wallet state to {}", self.path.display()))
    }
}

/// The agent's signing wallet, backed by AGENT_WALLET_KEY and the persisted record.
pub struct AgentWallet {
    signer: LocalWallet,
    network_id: String,
}

impl AgentWallet {
    /// Restore the wallet: key material from `private_key`, network id from the persisted
    /// record when one is supplied. A malformed blob is an error that propagates to the caller.
    pub fn restore(blob: Option<&str>, network_id: &str, private_key: &str) -> Result<Self> {
        let signer = LocalWallet::from_str(private_key.trim_start_matches("0x"))
            .context("parsing agent wallet key")?;
        let network_id = match blob {
            Some(s) => {
                let record: WalletRecord =
                    serde_json::from_str(s).context("parsing persisted wallet state")?;
                record.network_id
            }
            None => network_id.to_string(),
        };
        Ok(Self { signer, network_id })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    pub fn signer(&self) -> &LocalWallet {
        &self.signer
    }

    /// Serialized wallet record, written back after every initialization.
    pub fn export(&self) -> Result<String> {
        let record = WalletRecord {
            network_id: self.network_id.clone(),
            address: format!("{:?}", self.signer.address()),
        };
        serde_json::to_string(&record).context("serializing wallet state")
    }
}
