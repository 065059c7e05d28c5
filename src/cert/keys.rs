//! Ed25519 signing keys and their on-disk formats.

use crate::utils::errors::{DpkiError, Result};
use base64::{engine::general_purpose, Engine as _};
use const_oid::ObjectIdentifier;
use der::asn1::BitString;
use ed25519_dalek::pkcs8::{spki::der::pem::LineEnding, DecodePrivateKey, EncodePrivateKey};
use ed25519_dalek::Signer;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

const TENDERMINT_KEY_PREFIX: &str = "tendermint/PrivKey";
const TENDERMINT_ED25519: &str = "tendermint/PrivKeyEd25519";

/// id-Ed25519, RFC 8410
pub const ED25519_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// SubjectPublicKeyInfo header for an Ed25519 key
const SPKI_ED25519_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Algorithm identifier used both for keys and for signatures
pub fn ed25519_algorithm() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: ED25519_OID,
        parameters: None,
    }
}

/// Raw 32-byte Ed25519 public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| DpkiError::Key(format!("Expected 32 byte key, got {}", bytes.len())))?;
        Ok(Self(raw))
    }

    /// Extract the key from a DER SubjectPublicKeyInfo
    pub fn from_spki(spki: &[u8]) -> Result<Self> {
        match spki.strip_prefix(&SPKI_ED25519_PREFIX) {
            Some(raw) => Self::from_bytes(raw),
            None => Err(DpkiError::Key("Only Ed25519 public keys are supported".to_string())),
        }
    }

    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = hex::decode(value).map_err(|e| DpkiError::Key(format!("Bad hex key: {e}")))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(SubjectPublicKeyInfoOwned {
            algorithm: ed25519_algorithm(),
            subject_public_key: BitString::from_bytes(&self.0)?,
        })
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TendermintKeyFile {
    #[serde(rename = "type")]
    key_type: String,
    value: String,
}

/// Ed25519 private key usable for CSRs and certificate signing
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl SigningKey {
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Load a PKCS#8 PEM private key
    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = ed25519_dalek::SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| DpkiError::Key(format!("Cannot load private key: {e}")))?;
        Ok(Self { inner })
    }

    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| DpkiError::Key(format!("Expected 32 byte seed, got {}", seed.len())))?;
        Ok(Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&seed),
        })
    }

    /// The 32-byte private seed
    pub fn seed(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.inner.verifying_key().to_bytes())
    }

    pub fn to_pem(&self) -> Result<String> {
        let pem = self
            .inner
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| DpkiError::Key(format!("Cannot encode private key: {e}")))?;
        Ok(pem.to_string())
    }

    /// Ed25519 signature over `message`
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.inner.sign(message).to_bytes()
    }

    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!("Loading private key from {}", path.display());
        let pem = fs::read_to_string(path)?;
        Self::from_pem(&pem)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        tracing::debug!("Saving private key to {}", path.display());
        fs::write(path, self.to_pem()?)?;
        restrict_permissions(path)?;
        Ok(())
    }

    /// Load a Tendermint `{type, value}` key file
    pub fn load_tendermint(path: &Path) -> Result<Self> {
        tracing::debug!("Loading Tendermint key file {}", path.display());
        let file: TendermintKeyFile = serde_json::from_str(&fs::read_to_string(path)?)?;
        if !file.key_type.starts_with(TENDERMINT_KEY_PREFIX) {
            return Err(DpkiError::Key(format!(
                "Not a Tendermint private key: {}",
                file.key_type
            )));
        }
        if file.key_type != TENDERMINT_ED25519 {
            return Err(DpkiError::Key(format!(
                "Key loader for {} not yet implemented",
                file.key_type
            )));
        }
        let value = general_purpose::STANDARD
            .decode(file.value.as_bytes())
            .map_err(|e| DpkiError::Key(format!("Bad key value: {e}")))?;
        if value.len() < 32 {
            return Err(DpkiError::Key("Key value is too short".to_string()));
        }
        Self::from_seed(&value[..32])
    }

    pub fn save_tendermint(&self, path: &Path) -> Result<()> {
        let mut value = self.seed().to_vec();
        value.extend_from_slice(self.public_key().as_bytes());
        let file = TendermintKeyFile {
            key_type: TENDERMINT_ED25519.to_string(),
            value: general_purpose::STANDARD.encode(value),
        };
        fs::write(path, serde_json::to_string(&file)?)?;
        restrict_permissions(path)?;
        Ok(())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &self.public_key().to_hex())
            .finish()
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
