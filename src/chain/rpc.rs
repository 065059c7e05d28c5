//! Tendermint-style JSON-RPC envelopes shared by the client and the dev node.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";

/// Result codes carried in ABCI responses
pub const CODE_OK: u32 = 0;
pub const CODE_ERROR: u32 = 1;
pub const CODE_ALREADY_EXISTS: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct RpcEnvelope<T> {
    pub jsonrpc: String,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl<T> RpcEnvelope<T> {
    pub fn ok(result: T) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: -1,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(code: i64, message: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: -1,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: data.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub response: QueryResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub log: String,
    /// Base64-encoded payload
    #[serde(default)]
    pub value: Option<String>,
    /// Block height, encoded as a string like Tendermint does
    #[serde(default)]
    pub height: String,
}

impl QueryResponse {
    pub fn new(code: u32, log: impl Into<String>, value: &[u8], height: u64) -> Self {
        Self {
            code,
            log: log.into(),
            value: (!value.is_empty()).then(|| general_purpose::STANDARD.encode(value)),
            height: height.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    /// Decoded payload; an absent value is empty
    pub fn decode_value(&self) -> Option<Vec<u8>> {
        match &self.value {
            Some(value) => general_purpose::STANDARD.decode(value).ok(),
            None => Some(Vec::new()),
        }
    }
}

/// Outcome of `check_tx` and `broadcast_tx_*`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub hash: String,
}

impl TxResult {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

/// Node status summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub sync_info: SyncInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInfo {
    pub latest_block_height: String,
    pub latest_app_hash: String,
}

/// Hex form used in `tx=0x...` parameters
pub fn encode_tx(tx: &[u8]) -> String {
    format!("0x{}", hex::encode(tx))
}

/// Accept `0x`-prefixed hex, a quoted string, or raw text
pub fn decode_tx(param: &str) -> Vec<u8> {
    let trimmed = param.trim();
    if let Some(hex_part) = trimmed.strip_prefix("0x") {
        if let Ok(bytes) = hex::decode(hex_part) {
            return bytes;
        }
    }
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .as_bytes()
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_envelope_shape() {
        let envelope = RpcEnvelope::ok(QueryResult {
            response: QueryResponse::new(CODE_OK, "", b"[]", 3),
        });
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["result"]["response"]["code"], 0);
        assert_eq!(json["result"]["response"]["value"], "W10=");
        assert_eq!(json["result"]["response"]["height"], "3");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_decode_value() {
        let response: QueryResponse =
            serde_json::from_str(r#"{"code":0,"value":null}"#).unwrap();
        assert_eq!(response.decode_value(), Some(Vec::new()));

        let response: QueryResponse =
            serde_json::from_str(r#"{"code":0,"value":"not base64!"}"#).unwrap();
        assert_eq!(response.decode_value(), None);
    }

    #[test]
    fn test_tx_param_forms() {
        assert_eq!(encode_tx(b"ab"), "0x6162");
        assert_eq!(decode_tx("0x6162"), b"ab");
        assert_eq!(decode_tx("\"ab\""), b"ab");
        assert_eq!(decode_tx("ab"), b"ab");
    }
}
