use crate::ca::{CaConfig, HumanDuration};
use crate::utils::errors::{DpkiError, Result};
use crate::utils::paths::DpkiPaths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LADDR: &str = "tcp://127.0.0.1:26657";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSection {
    pub laddr: String,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            laddr: DEFAULT_LADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Relative paths are resolved against the node home
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genesis_file: Option<PathBuf>,
    pub block_interval: HumanDuration,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            ledger_file: None,
            genesis_file: None,
            block_interval: HumanDuration::from_secs(1),
        }
    }
}

/// Node configuration read from `{home}/config/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub rpc: RpcSection,
    pub node: NodeSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<CaConfig>,
}

impl NodeConfig {
    /// Load the config of a node home. A missing file gives the defaults.
    pub fn load(home: &Path) -> Result<Self> {
        let path = DpkiPaths::node_config(home);
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!("Loaded node config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, home: &Path) -> Result<()> {
        let path = DpkiPaths::node_config(home);
        if let Some(parent) = path.parent() {
            DpkiPaths::ensure_dir_exists(parent)?;
        }
        let content = toml::to_string(self)
            .map_err(|e| DpkiError::Config(format!("Cannot serialize node config: {e}")))?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Socket address to bind, taken from `rpc.laddr`
    pub fn listen_addr(&self) -> &str {
        let laddr = self.rpc.laddr.as_str();
        laddr.split_once("://").map(|(_, addr)| addr).unwrap_or(laddr)
    }

    pub fn ledger_path(&self, home: &Path) -> PathBuf {
        match &self.node.ledger_file {
            Some(file) => home.join(file),
            None => DpkiPaths::ledger(home),
        }
    }

    pub fn genesis_path(&self, home: &Path) -> PathBuf {
        match &self.node.genesis_file {
            Some(file) => home.join(file),
            None => DpkiPaths::genesis(home),
        }
    }

    pub fn ca_key_path(&self, home: &Path) -> Option<PathBuf> {
        self.ca
            .as_ref()
            .and_then(|ca| ca.ca_key_file.as_ref())
            .map(|file| home.join(file))
    }
}
