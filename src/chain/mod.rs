pub mod client;
pub mod rpc;

pub use client::{ChainClient, DEFAULT_NODE_URL};

use crate::utils::errors::Result;
use reqwest::Client;
use std::future::Future;

/// Destination for transactions produced locally, such as issued certificates
pub trait TxSink: Send + Sync + 'static {
    fn send_tx(&self, tx: Vec<u8>) -> impl Future<Output = Result<()>> + Send;
}

/// HTTP client with the timeouts and TLS setup used for node RPC
pub fn create_http_client() -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .use_rustls_tls()
        .build()
}
