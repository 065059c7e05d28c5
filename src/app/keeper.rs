use crate::app::checker::{CheckedTx, TxChecker, TxRejection};
use crate::cert::{CertEntity, CertRole, CertificateParser, ParsedCertificate, ParsedCsr, Template};
use crate::storage::{AppState, Ledger};
use crate::utils::errors::{DpkiError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `app_state` section of the genesis document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAppState {
    pub certificates: Vec<String>,
}

/// Role stored for an accepted certificate
pub fn role_of(cert: &ParsedCertificate) -> Option<CertRole> {
    let template = cert.template()?;
    if template == Template::Ca && cert.is_self_signed() {
        Some(CertRole::CaRoot)
    } else {
        Some(template.role())
    }
}

/// Applies delivered transactions block by block
#[derive(Debug, Default)]
pub struct TxKeeper {
    block_height: u64,
    app_hash: Vec<u8>,
    staged: Vec<CertEntity>,
    txs: Vec<Vec<u8>>,
}

impl TxKeeper {
    /// Resume from the last committed state
    pub fn new(state: &AppState) -> Result<Self> {
        let app_hash = hex::decode(&state.app_hash)
            .map_err(|e| DpkiError::Storage(format!("Bad stored app hash: {e}")))?;
        Ok(Self {
            block_height: state.block_height,
            app_hash,
            ..Default::default()
        })
    }

    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    pub fn app_hash(&self) -> &[u8] {
        &self.app_hash
    }

    /// Store the genesis certificates. Returns the initial app hash.
    pub fn load_genesis(&mut self, ledger: &mut Ledger, app_state: &[u8]) -> Result<Vec<u8>> {
        tracing::info!("Received genesis app state with size: {}", app_state.len());
        let genesis: GenesisAppState = serde_json::from_slice(app_state)?;

        let mut hasher = Sha256::new();
        let mut entities = Vec::with_capacity(genesis.certificates.len());
        for pem in &genesis.certificates {
            let cert = CertificateParser::parse_certificate(pem)?;
            entities.push(CertEntity::from_certificate(&cert, role_of(&cert)));
            hasher.update(pem.as_bytes());
        }
        let app_hash = hasher.finalize().to_vec();
        ledger.commit_block(entities, self.block_height, &hex::encode(&app_hash))?;

        self.app_hash = app_hash;
        Ok(self.app_hash.clone())
    }

    pub fn begin_block(&mut self) {
        self.staged.clear();
        self.txs.clear();
        tracing::debug!("Begin block {}", self.block_height + 1);
    }

    /// Check a transaction against the ledger and the current block.
    ///
    /// Certificates are staged until commit. A CSR is returned to the caller
    /// so the local CA can pick it up.
    pub fn deliver_tx(
        &mut self,
        ledger: &Ledger,
        tx: &[u8],
    ) -> std::result::Result<Option<ParsedCsr>, TxRejection> {
        let checked = TxChecker::new(ledger).with_staged(&self.staged).check_tx(tx)?;
        self.txs.push(tx.to_vec());
        match checked {
            CheckedTx::Csr(csr) => Ok(Some(csr)),
            CheckedTx::Certificate(cert) => {
                tracing::info!("Accepted certificate for {}", cert.subject);
                self.staged.push(CertEntity::from_certificate(&cert, role_of(&cert)));
                Ok(None)
            }
        }
    }

    /// Persist the staged certificates and move to the next height
    pub fn commit(&mut self, ledger: &mut Ledger) -> Result<AppState> {
        let mut hasher = Sha256::new();
        hasher.update(&self.app_hash);
        for tx in &self.txs {
            hasher.update(tx);
        }

        let block_height = self.block_height + 1;
        let app_hash = hasher.finalize().to_vec();
        let hex_hash = hex::encode(&app_hash);
        ledger.commit_block(self.staged.clone(), block_height, &hex_hash)?;

        self.staged.clear();
        self.txs.clear();
        self.block_height = block_height;
        self.app_hash = app_hash;
        tracing::debug!("Committed block {block_height} with app hash {hex_hash}");
        Ok(ledger.app_state())
    }
}
