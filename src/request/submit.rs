use crate::cert::{create_csr, SigningKey, Template, TemplateOptions};
use crate::chain::rpc::TxResult;
use crate::chain::ChainClient;
use crate::names::DistinguishedName;
use crate::utils::errors::{DpkiError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const KEY_FILE: &str = "certificate.key";
pub const CSR_FILE: &str = "certificate.csr";

pub struct CertificateRequest {
    pub subject: DistinguishedName,
    pub template: Template,
    /// PEM private key; generated when absent
    pub key_file: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub path_length: Option<u32>,
    pub san: Vec<String>,
}

/// Key and CSR written to disk, ready to send
#[derive(Debug)]
pub struct PreparedRequest {
    pub csr_pem: String,
    pub csr_path: PathBuf,
    /// Set when a new key was generated
    pub key_path: Option<PathBuf>,
}

/// Output directory: explicit, else next to the given key, else the current directory
fn output_dir(request: &CertificateRequest) -> PathBuf {
    match (&request.output, &request.key_file) {
        (Some(output), _) => output.clone(),
        (None, Some(key)) => key
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
        (None, None) => PathBuf::from("."),
    }
}

pub fn prepare_request(request: &CertificateRequest) -> Result<PreparedRequest> {
    let output = output_dir(request);
    if !output.is_dir() {
        return Err(DpkiError::InvalidInput(format!(
            "Output path `{}` not found",
            output.display()
        )));
    }

    let (key, key_path) = match &request.key_file {
        Some(path) => {
            if !path.exists() {
                return Err(DpkiError::Key(format!("File `{}` not found", path.display())));
            }
            (SigningKey::load(path)?, None)
        }
        None => {
            let key = SigningKey::generate()?;
            let path = output.join(KEY_FILE);
            key.save(&path)?;
            tracing::info!("Generated new key at {}", path.display());
            (key, Some(path))
        }
    };

    let options = TemplateOptions {
        path_length: request.path_length,
        san: request.san.clone(),
    };
    let csr_pem = create_csr(&request.subject, &key, request.template, &options)?;
    let csr_path = output.join(CSR_FILE);
    fs::write(&csr_path, &csr_pem)?;

    Ok(PreparedRequest {
        csr_pem,
        csr_path,
        key_path,
    })
}

/// Send a CSR to the node. `check_only` validates it without queueing.
pub async fn submit_request(client: &ChainClient, csr_pem: &str, check_only: bool) -> Result<TxResult> {
    let result = if check_only {
        client.check_tx(csr_pem.as_bytes()).await?
    } else {
        client.broadcast_tx_async(csr_pem.as_bytes()).await?
    };
    tracing::debug!("Node answered code {} for tx {}", result.code, result.hash);
    Ok(result)
}
