use crate::cert::CaRecord;
use crate::chain::rpc::{encode_tx, QueryResponse, QueryResult, RpcEnvelope, TxResult};
use crate::chain::TxSink;
use crate::utils::errors::{DpkiError, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

pub const DEFAULT_NODE_URL: &str = "http://127.0.0.1:26657";

const CA_LIST_PATH: &str = "ca/list";
const CA_LIST_ERROR: &str = "Cannot get CA list";

/// HTTP client for a chain node's RPC endpoint
#[derive(Clone)]
pub struct ChainClient {
    client: Client,
    node_url: String,
}

impl ChainClient {
    pub fn new(node_url: &str) -> Result<Self> {
        let client = super::create_http_client()?;
        Ok(Self {
            client,
            node_url: node_url.trim_end_matches('/').to_string(),
        })
    }

    /// Client for a node listen address such as `tcp://127.0.0.1:26657`
    pub fn from_laddr(laddr: &str) -> Result<Self> {
        let host = laddr.split_once("://").map(|(_, h)| h).unwrap_or(laddr);
        Self::new(&format!("http://{host}"))
    }

    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    /// Run an ABCI query. The path is sent quoted, as Tendermint expects.
    pub async fn abci_query(&self, path: &str) -> Result<QueryResponse> {
        let url = format!("{}/abci_query", self.node_url);
        tracing::debug!("Querying {url} path={path}");
        let response = self
            .client
            .get(&url)
            .query(&[("path", format!("\"{path}\""))])
            .send()
            .await?;

        let result: QueryResult = self.handle_response(response).await?;
        Ok(result.response)
    }

    /// Fetch the certificate authorities registered on the chain
    pub async fn list_ca(&self) -> Result<Vec<CaRecord>> {
        let response = self.abci_query(CA_LIST_PATH).await?;
        if !response.is_ok() {
            tracing::debug!("CA list query failed with code {}: {}", response.code, response.log);
            return Err(DpkiError::Query(CA_LIST_ERROR.to_string()));
        }

        let Some(value) = response.decode_value() else {
            tracing::debug!("CA list value is not valid base64");
            return Err(DpkiError::Query(CA_LIST_ERROR.to_string()));
        };
        if value.is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&value).map_err(|e| {
            tracing::debug!("CA list value is not a record list: {e}");
            DpkiError::Query(CA_LIST_ERROR.to_string())
        })
    }

    /// Ask the node to validate a transaction without queueing it
    pub async fn check_tx(&self, tx: &[u8]) -> Result<TxResult> {
        self.post_tx("check_tx", tx).await
    }

    /// Queue a transaction; the node only runs `check_tx` before answering
    pub async fn broadcast_tx_async(&self, tx: &[u8]) -> Result<TxResult> {
        self.post_tx("broadcast_tx_async", tx).await
    }

    async fn post_tx(&self, method: &str, tx: &[u8]) -> Result<TxResult> {
        let url = format!("{}/{method}", self.node_url);
        tracing::debug!("POST {url} ({} bytes)", tx.len());
        let response = self
            .client
            .post(&url)
            .form(&[("tx", encode_tx(tx))])
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DpkiError::Query(format!(
                "Node returned HTTP {status}: {error_text}"
            )));
        }

        let envelope: RpcEnvelope<T> = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(DpkiError::Query(format!(
                "{} ({}): {}",
                error.message, error.code, error.data
            )));
        }
        envelope
            .result
            .ok_or_else(|| DpkiError::Query("Node response has no result".to_string()))
    }
}

impl TxSink for ChainClient {
    async fn send_tx(&self, tx: Vec<u8>) -> Result<()> {
        let result = self.broadcast_tx_async(&tx).await?;
        if result.is_ok() {
            Ok(())
        } else {
            Err(DpkiError::Query(format!("Cannot send TX: {}", result.log)))
        }
    }
}
