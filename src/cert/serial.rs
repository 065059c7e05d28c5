use crate::utils::errors::{DpkiError, Result};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of random bytes in an issued serial
const SERIAL_LEN: usize = 20;

/// Certificate serial number kept as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerialNumber {
    hex: String,
}

impl SerialNumber {
    /// Fresh random serial: 20 bytes with the sign bit cleared so it stays positive
    pub fn random() -> Self {
        let mut bytes = [0u8; SERIAL_LEN];
        rand::rng().fill_bytes(&mut bytes);
        bytes[0] &= 0x7f;
        if bytes[0] == 0 {
            bytes[0] = 1;
        }
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            hex: hex::encode(bytes),
        }
    }

    /// Parse a hex serial, with or without colons
    pub fn parse(identifier: &str) -> Result<Self> {
        if identifier.is_empty() {
            return Err(DpkiError::InvalidInput("Empty serial number".to_string()));
        }

        let cleaned = identifier.replace(':', "").to_lowercase();
        if cleaned.len() % 2 != 0 {
            return Err(DpkiError::InvalidInput(
                "Serial number needs an even number of hex characters".to_string(),
            ));
        }
        if let Some(ch) = cleaned.chars().find(|ch| !ch.is_ascii_hexdigit()) {
            return Err(DpkiError::InvalidInput(format!(
                "Invalid hex character in serial number: {ch}"
            )));
        }

        Ok(Self { hex: cleaned })
    }

    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        hex::decode(&self.hex).unwrap_or_default()
    }

    /// Colon-separated form (e.g. "3b:fc:2e:b1...")
    pub fn as_colon_hex(&self) -> String {
        self.hex
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

impl FromStr for SerialNumber {
    type Err = DpkiError;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for SerialNumber {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.hex)
    }
}

impl<'de> Deserialize<'de> for SerialNumber {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SerialNumber::parse(&s).map_err(serde::de::Error::custom)
    }
}
