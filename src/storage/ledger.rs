use crate::cert::{CertEntity, CertRole, PublicKey};
use crate::utils::errors::{DpkiError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const DEFAULT_LIST_LIMIT: usize = 500;

/// Chain position after a commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    pub block_height: u64,
    /// Hex-encoded application hash
    pub app_hash: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerData {
    certificates: Vec<CertEntity>,
    states: Vec<AppState>,
}

/// Registry of accepted certificates and the history of application states
#[derive(Debug)]
pub struct Ledger {
    path: Option<PathBuf>,
    data: LedgerData,
}

impl Ledger {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: LedgerData::default(),
        }
    }

    /// Open a file-backed ledger. A missing file starts an empty ledger.
    pub fn open(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str::<LedgerData>(&content).map_err(|e| {
                DpkiError::Storage(format!("Corrupted ledger '{}': {e}", path.display()))
            })?
        } else {
            tracing::debug!("Ledger file {} not found, starting empty", path.display());
            LedgerData::default()
        };

        tracing::debug!(
            "Opened ledger with {} certificates at height {}",
            data.certificates.len(),
            data.states.last().map(|s| s.block_height).unwrap_or(0)
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            data,
        })
    }

    /// Nothing was ever stored
    pub fn is_empty(&self) -> bool {
        self.data.certificates.is_empty() && self.data.states.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.certificates.len()
    }

    pub fn insert(&mut self, entities: Vec<CertEntity>) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        tracing::debug!("Storing {} certificates", entities.len());
        self.update(|data| data.certificates.extend(entities))
    }

    /// Store a block's certificates together with its state in one write.
    ///
    /// On a failed write the in-memory ledger is left as it was.
    pub fn commit_block(
        &mut self,
        entities: Vec<CertEntity>,
        block_height: u64,
        app_hash: &str,
    ) -> Result<()> {
        tracing::debug!(
            "Committing {} certificates at height {block_height}",
            entities.len()
        );
        let state = AppState {
            block_height,
            app_hash: app_hash.to_string(),
            created_at: Some(Utc::now()),
        };
        self.update(|data| {
            data.certificates.extend(entities);
            data.states.push(state);
        })
    }

    pub fn get_by_public_key(&self, public_key: &PublicKey) -> Option<&CertEntity> {
        let hex_key = public_key.to_hex();
        self.active().find(|e| e.public_key == hex_key)
    }

    pub fn get_by_subject(&self, subject: &str) -> Option<&CertEntity> {
        self.active().find(|e| e.name == subject)
    }

    pub fn list_by_role(&self, role: CertRole, limit: usize, offset: usize) -> Vec<CertEntity> {
        self.active()
            .filter(|e| e.role == Some(role))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Latest recorded state, or the zero state
    pub fn app_state(&self) -> AppState {
        self.data.states.last().cloned().unwrap_or_default()
    }

    fn active(&self) -> impl Iterator<Item = &CertEntity> {
        let now = Utc::now();
        self.data
            .certificates
            .iter()
            .filter(move |e| e.is_active(now))
    }

    /// Apply an append-only change and save it, truncating back on failure
    fn update(&mut self, change: impl FnOnce(&mut LedgerData)) -> Result<()> {
        let certificates = self.data.certificates.len();
        let states = self.data.states.len();
        change(&mut self.data);
        if let Err(e) = self.save() {
            tracing::warn!("Ledger save failed, rolling back: {e}");
            self.data.certificates.truncate(certificates);
            self.data.states.truncate(states);
            return Err(e);
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(&self.data)
            .map_err(|e| DpkiError::Storage(format!("Ledger serialization error: {e}")))?;

        // Write next to the target so the rename stays on one filesystem
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| {
            DpkiError::Storage(format!("Cannot write ledger '{}': {}", path.display(), e.error))
        })?;
        tracing::trace!("Saved ledger to {}", path.display());
        Ok(())
    }
}
