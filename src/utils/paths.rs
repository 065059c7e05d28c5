use crate::utils::errors::{DpkiError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct DpkiPaths;
const PROGRAM_NAME: &str = "dpki";

impl DpkiPaths {
    /// Get the base data directory: ~/.local/share/dpki/
    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|dir| dir.join(PROGRAM_NAME))
            .ok_or_else(|| DpkiError::Config("Cannot determine local data directory".to_string()))
    }

    /// Get the config directory: ~/.config/dpki/
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(PROGRAM_NAME))
            .ok_or_else(|| DpkiError::Config("Cannot determine config directory".to_string()))
    }

    /// Default node home: ~/.local/share/dpki/node/
    pub fn default_home() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("node"))
    }

    /// Node config file inside a home directory
    pub fn node_config(home: &Path) -> PathBuf {
        home.join("config").join("config.toml")
    }

    /// Genesis file inside a home directory
    pub fn genesis(home: &Path) -> PathBuf {
        home.join("config").join("genesis.json")
    }

    /// Ledger file inside a home directory
    pub fn ledger(home: &Path) -> PathBuf {
        home.join("data").join("ledger.json")
    }

    /// Ensure a directory exists with proper permissions
    pub fn ensure_dir_exists(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;

            // Key material lives below these directories (700)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = fs::metadata(path)?.permissions();
                perms.set_mode(0o700);
                fs::set_permissions(path, perms)?;
            }
        }
        Ok(())
    }

    /// Ensure all per-user directories exist
    pub fn ensure_all_dirs() -> Result<()> {
        Self::ensure_dir_exists(&Self::data_dir()?)?;
        Self::ensure_dir_exists(&Self::config_dir()?)?;
        Ok(())
    }
}
