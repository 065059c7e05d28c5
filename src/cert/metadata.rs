use crate::cert::{ParsedCertificate, SerialNumber};
use crate::utils::output::GetColumnValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Role a registered certificate plays in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertRole {
    #[serde(rename = "CA Root")]
    CaRoot,
    #[serde(rename = "CA")]
    Ca,
    Host,
    User,
}

impl CertRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertRole::CaRoot => "CA Root",
            CertRole::Ca => "CA",
            CertRole::Host => "Host",
            CertRole::User => "User",
        }
    }
}

impl fmt::Display for CertRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A certificate stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertEntity {
    pub sn: SerialNumber,
    pub name: String,
    /// Hex-encoded raw public key
    pub public_key: String,
    pub pem_serialized: String,
    pub not_valid_before: DateTime<Utc>,
    pub not_valid_after: DateTime<Utc>,
    pub revocated_at: Option<DateTime<Utc>>,
    pub role: Option<CertRole>,
}

impl CertEntity {
    pub fn from_certificate(cert: &ParsedCertificate, role: Option<CertRole>) -> Self {
        Self {
            sn: cert.serial.clone(),
            name: cert.subject.to_string(),
            public_key: cert.public_key.to_hex(),
            pem_serialized: cert.pem.clone(),
            not_valid_before: cert.not_before,
            not_valid_after: cert.not_after,
            revocated_at: None,
            role,
        }
    }

    /// Inside its validity window and not revoked
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revocated_at.is_none() && self.not_valid_before <= now && now <= self.not_valid_after
    }
}

/// Entry of the `ca/list` query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaRecord {
    pub subject: String,
    #[serde(default)]
    pub path_length: Option<u32>,
    #[serde(default)]
    pub issuer: Option<String>,
}

impl CaRecord {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            path_length: None,
            issuer: None,
        }
    }
}

impl fmt::Display for CaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subject)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaColumn {
    Subject,
    PathLength,
    Issuer,
}

impl FromStr for CaColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "subject" | "s" => Ok(Self::Subject),
            "path_length" | "path" | "p" => Ok(Self::PathLength),
            "issuer" | "i" => Ok(Self::Issuer),
            _ => Err(format!("Invalid column: {s}")),
        }
    }
}

impl CaColumn {
    pub const DEFAULT: [CaColumn; 2] = [CaColumn::Subject, CaColumn::PathLength];

    pub fn header(&self) -> &'static str {
        match self {
            Self::Subject => "Subject",
            Self::PathLength => "Path Length",
            Self::Issuer => "Issuer",
        }
    }
}

impl GetColumnValue for CaRecord {
    fn get_column_value(&self, column: &CaColumn) -> String {
        match column {
            CaColumn::Subject => self.subject.clone(),
            CaColumn::PathLength => self
                .path_length
                .map(|len| len.to_string())
                .unwrap_or_else(|| "-".to_string()),
            CaColumn::Issuer => self.issuer.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&CertRole::CaRoot).unwrap(), "\"CA Root\"");
        assert_eq!(serde_json::to_string(&CertRole::Host).unwrap(), "\"Host\"");
        let role: CertRole = serde_json::from_str("\"CA\"").unwrap();
        assert_eq!(role, CertRole::Ca);
    }

    #[test]
    fn test_ca_record_accepts_subject_only() {
        let records: Vec<CaRecord> =
            serde_json::from_str(r#"[{"subject":"CN=A,C=WN"},{"subject":"CN=B,C=WN","path_length":2}]"#)
                .unwrap();
        assert_eq!(records[0], CaRecord::new("CN=A,C=WN"));
        assert_eq!(records[1].path_length, Some(2));
    }

    #[test]
    fn test_column_values() {
        let record = CaRecord {
            subject: "CN=A,C=WN".to_string(),
            path_length: None,
            issuer: Some("CN=Root,C=WN".to_string()),
        };
        assert_eq!(record.get_column_value(&CaColumn::Subject), "CN=A,C=WN");
        assert_eq!(record.get_column_value(&CaColumn::PathLength), "-");
        assert_eq!(record.get_column_value(&CaColumn::Issuer), "CN=Root,C=WN");
        assert_eq!("p".parse::<CaColumn>().unwrap(), CaColumn::PathLength);
        assert!("serial".parse::<CaColumn>().is_err());
    }

    #[test]
    fn test_entity_activity() {
        let now = Utc::now();
        let mut entity = CertEntity {
            sn: SerialNumber::from_bytes(&[1]),
            name: "CN=A,C=WN".to_string(),
            public_key: String::new(),
            pem_serialized: String::new(),
            not_valid_before: now - chrono::Duration::days(1),
            not_valid_after: now + chrono::Duration::days(1),
            revocated_at: None,
            role: Some(CertRole::Ca),
        };
        assert!(entity.is_active(now));
        entity.revocated_at = Some(now);
        assert!(!entity.is_active(now));
    }
}
