//! Local testnet generator: a root CA, two intermediate CAs and four node homes.

use crate::app::GenesisAppState;
use crate::ca::{CaConfig, HumanDuration};
use crate::cert::{apply_csr, create_csr, parse_date, self_sign, CertificateParser, SigningKey, Template, TemplateOptions};
use crate::names::DistinguishedName;
use crate::node::config::{NodeConfig, RpcSection};
use crate::utils::errors::{DpkiError, Result};
use crate::utils::paths::DpkiPaths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CHAIN_ID: &str = "test-chain-DPKI";
const TESTNET_DIR: &str = ".testnet";

const ROOT_SUBJECT: &str = "CN=Wonderland root CA, C=WN";
const ROOT_VALID_UNTIL: &str = "2070-01-01";
const CA_VALID_UNTIL: &str = "2050-01-01";
const CA_PATH_LENGTH: u32 = 7;
const RPC_BASE_PORT: u16 = 26657;

/// Intermediate CAs in issuing order; each is signed by the previous one
const CA_NODES: [(&str, &str); 2] = [
    ("node00ca", "CN=Wonderland main CA, C=WN"),
    (
        "node01ca",
        "CN=CA controlled by Cheshire Cat, STREET=Cat's house, L=Cheshire, C=WN",
    ),
];
const PLAIN_NODES: [&str; 2] = ["node0000", "node0100"];
const CA_KEY_FILE: &str = "config/ca_key.json";

/// Genesis document shared by all nodes of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub genesis_time: DateTime<Utc>,
    pub chain_id: String,
    #[serde(default)]
    pub app_state: GenesisAppState,
}

impl GenesisDoc {
    pub fn new(chain_id: &str) -> Self {
        Self {
            genesis_time: Utc::now(),
            chain_id: chain_id.to_string(),
            app_state: GenesisAppState::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DpkiError::Config(format!("Cannot read genesis '{}': {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// What was written by [`generate_testnet`]
#[derive(Debug)]
pub struct Testnet {
    pub root: PathBuf,
    pub nodes: Vec<String>,
    pub genesis: GenesisDoc,
}

/// The `.testnet` directory for an output path
pub fn testnet_dir(output: &Path) -> PathBuf {
    if output.file_name().is_some_and(|name| name == TESTNET_DIR) {
        output.to_path_buf()
    } else {
        output.join(TESTNET_DIR)
    }
}

/// Generate a fresh testnet under `output`, replacing an existing one
pub fn generate_testnet(output: &Path) -> Result<Testnet> {
    let root = testnet_dir(output);
    if root.exists() {
        tracing::warn!("Removing existing testnet at {}", root.display());
        fs::remove_dir_all(&root)?;
    }
    DpkiPaths::ensure_dir_exists(&root)?;

    let mut nodes: Vec<String> = PLAIN_NODES
        .iter()
        .chain(CA_NODES.iter().map(|(moniker, _)| moniker))
        .map(|moniker| moniker.to_string())
        .collect();
    nodes.sort();

    let mut genesis = GenesisDoc::new(CHAIN_ID);

    // Root CA
    let root_dn = DistinguishedName::parse(ROOT_SUBJECT)?;
    let root_key = SigningKey::generate()?;
    let root_csr = create_csr(&root_dn, &root_key, Template::Ca, &TemplateOptions::default())?;
    let root_pem = self_sign(
        &CertificateParser::parse_csr(&root_csr)?,
        &root_key,
        parse_date(ROOT_VALID_UNTIL)?,
    )?;
    root_key.save(&root.join("root_ca.key"))?;
    fs::write(root.join("root_ca.crt"), &root_pem)?;
    genesis.app_state.certificates.push(root_pem);
    tracing::info!("Created root CA {root_dn}");

    // Intermediate CAs, each signed by the previous one
    let mut ca_configs = Vec::new();
    let (mut issuer_dn, mut issuer_key) = (root_dn, root_key);
    for (moniker, subject) in CA_NODES {
        let dn = DistinguishedName::parse(subject)?;
        let key = SigningKey::generate()?;
        let options = TemplateOptions {
            path_length: Some(CA_PATH_LENGTH),
            ..Default::default()
        };
        let csr = create_csr(&dn, &key, Template::Ca, &options)?;
        let pem = apply_csr(
            &CertificateParser::parse_csr(&csr)?,
            &issuer_dn,
            &issuer_key,
            parse_date(CA_VALID_UNTIL)?,
            None,
        )?;
        genesis.app_state.certificates.push(pem);

        let home = root.join(moniker);
        DpkiPaths::ensure_dir_exists(&home.join("config"))?;
        key.save_tendermint(&home.join(CA_KEY_FILE))?;
        ca_configs.push((moniker, ca_config()));
        tracing::info!("Created CA {dn} for {moniker}");

        issuer_dn = dn;
        issuer_key = key;
    }

    for (index, moniker) in nodes.iter().enumerate() {
        let home = root.join(moniker);
        DpkiPaths::ensure_dir_exists(&home.join("config"))?;
        let port = RPC_BASE_PORT + 100 * index as u16;
        let config = NodeConfig {
            rpc: RpcSection {
                laddr: format!("tcp://127.0.0.1:{port}"),
            },
            ca: ca_configs
                .iter()
                .find(|(name, _)| *name == moniker.as_str())
                .map(|(_, config)| config.clone()),
            ..Default::default()
        };
        config.save(&home)?;
        genesis.save(&DpkiPaths::genesis(&home))?;
    }

    Ok(Testnet {
        root,
        nodes,
        genesis,
    })
}

fn ca_config() -> CaConfig {
    CaConfig {
        ca_key_file: Some(PathBuf::from(CA_KEY_FILE)),
        waiting_for_downstream: HumanDuration::from_secs(900),
        ..Default::default()
    }
}
