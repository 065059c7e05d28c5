use thiserror::Error;

#[derive(Error, Debug)]
pub enum DpkiError {
    #[error("Node RPC error: {0}")]
    Rpc(#[from] reqwest::Error),

    #[error("{0}")]
    Query(String),

    #[error("Certificate parsing error: {0}")]
    CertParsing(String),

    #[error("Certificate building error: {0}")]
    CertBuild(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid distinguished name: {0}")]
    InvalidName(String),

    #[error("Certificate authority not found: {0}")]
    CaNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<der::Error> for DpkiError {
    fn from(e: der::Error) -> Self {
        DpkiError::CertBuild(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DpkiError>;
