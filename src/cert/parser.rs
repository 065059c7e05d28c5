use crate::cert::keys::PublicKey;
use crate::cert::template::{
    AltName, BasicConstraints, ExtendedKeyUsage, ExtensionProfile, KeyUsage, Template,
};
use crate::cert::SerialNumber;
use crate::names::DistinguishedName;
use crate::utils::errors::{DpkiError, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;
use x509_parser::certificate::X509Certificate;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::FromDer;
use x509_parser::x509::{SubjectPublicKeyInfo, X509Name};

const CERTIFICATE_LABEL: &str = "CERTIFICATE";
const CSR_LABEL: &str = "CERTIFICATE REQUEST";

/// Attribute types we know by their short name
const ATTRIBUTE_OIDS: [(&str, ObjectIdentifier); 9] = [
    ("CN", ObjectIdentifier::new_unwrap("2.5.4.3")),
    ("C", ObjectIdentifier::new_unwrap("2.5.4.6")),
    ("L", ObjectIdentifier::new_unwrap("2.5.4.7")),
    ("ST", ObjectIdentifier::new_unwrap("2.5.4.8")),
    ("STREET", ObjectIdentifier::new_unwrap("2.5.4.9")),
    ("O", ObjectIdentifier::new_unwrap("2.5.4.10")),
    ("OU", ObjectIdentifier::new_unwrap("2.5.4.11")),
    ("DC", ObjectIdentifier::new_unwrap("0.9.2342.19200300.100.1.25")),
    ("UID", ObjectIdentifier::new_unwrap("0.9.2342.19200300.100.1.1")),
];

/// OID for a short attribute name
pub fn attribute_oid(key: &str) -> Option<ObjectIdentifier> {
    ATTRIBUTE_OIDS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, oid)| *oid)
}

fn attribute_key(dotted: &str) -> String {
    ATTRIBUTE_OIDS
        .iter()
        .find(|(_, oid)| oid.to_string() == dotted)
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| dotted.to_string())
}

/// A certificate as stored and checked by the chain
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    pub public_key: PublicKey,
    pub spki: Vec<u8>,
    pub serial: SerialNumber,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub profile: ExtensionProfile,
    pub der: Vec<u8>,
    pub pem: String,
}

impl ParsedCertificate {
    pub fn template(&self) -> Option<Template> {
        Template::matches_to(&self.profile)
    }

    /// Check the signature against an issuer's SubjectPublicKeyInfo
    pub fn is_signed_by(&self, issuer_spki: &[u8]) -> bool {
        let Ok((_, cert)) = X509Certificate::from_der(&self.der) else {
            return false;
        };
        let Ok((_, spki)) = SubjectPublicKeyInfo::from_der(issuer_spki) else {
            return false;
        };
        cert.verify_signature(Some(&spki)).is_ok()
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer && self.is_signed_by(&self.spki)
    }
}

/// A certificate signing request taken from a transaction
#[derive(Debug, Clone)]
pub struct ParsedCsr {
    pub subject: DistinguishedName,
    pub public_key: PublicKey,
    pub spki: Vec<u8>,
    pub profile: ExtensionProfile,
    pub signature_valid: bool,
    pub der: Vec<u8>,
    pub pem: String,
}

impl ParsedCsr {
    pub fn template(&self) -> Option<Template> {
        Template::matches_to(&self.profile)
    }
}

pub struct CertificateParser;

impl CertificateParser {
    pub fn is_certificate(data: &[u8]) -> bool {
        data.starts_with(b"-----BEGIN CERTIFICATE-----")
    }

    pub fn is_csr(data: &[u8]) -> bool {
        data.starts_with(b"-----BEGIN CERTIFICATE REQUEST-----")
    }

    pub fn parse_certificate(pem_data: &str) -> Result<ParsedCertificate> {
        let der = Self::decode_pem(pem_data, CERTIFICATE_LABEL)?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| DpkiError::CertParsing(format!("DER parsing error: {e}")))?;

        let subject = Self::read_name(cert.subject())?;
        let issuer = Self::read_name(cert.issuer())?;
        let spki = cert.public_key().raw.to_vec();
        let public_key = PublicKey::from_spki(&spki)?;
        let serial = SerialNumber::from_bytes(cert.raw_serial());

        let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
            .ok_or_else(|| DpkiError::CertParsing("Bad notBefore".to_string()))?;
        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| DpkiError::CertParsing("Bad notAfter".to_string()))?;

        let profile = Self::read_profile(cert.extensions().iter().map(|ext| ext.parsed_extension()));

        Ok(ParsedCertificate {
            subject,
            issuer,
            public_key,
            spki,
            serial,
            not_before,
            not_after,
            profile,
            pem: pem_data.to_string(),
            der,
        })
    }

    pub fn parse_csr(pem_data: &str) -> Result<ParsedCsr> {
        let der = Self::decode_pem(pem_data, CSR_LABEL)?;
        let (_, csr) = X509CertificationRequest::from_der(&der)
            .map_err(|e| DpkiError::CertParsing(format!("DER parsing error: {e}")))?;

        let info = &csr.certification_request_info;
        let subject = Self::read_name(&info.subject)?;
        let spki = info.subject_pki.raw.to_vec();
        let public_key = PublicKey::from_spki(&spki)?;
        let profile = match csr.requested_extensions() {
            Some(extensions) => Self::read_profile(extensions),
            None => ExtensionProfile::default(),
        };
        let signature_valid = csr.verify_signature().is_ok();

        Ok(ParsedCsr {
            subject,
            public_key,
            spki,
            profile,
            signature_valid,
            pem: pem_data.to_string(),
            der,
        })
    }

    /// Extract and decode the body of a PEM block with the given label
    fn decode_pem(pem_data: &str, label: &str) -> Result<Vec<u8>> {
        let begin = format!("-----BEGIN {label}-----");
        let end = format!("-----END {label}-----");
        let mut in_block = false;
        let mut lines = Vec::new();

        for line in pem_data.lines() {
            let line = line.trim();
            if line == begin {
                in_block = true;
                continue;
            } else if line == end {
                break;
            } else if in_block {
                lines.push(line);
            }
        }

        if lines.is_empty() {
            return Err(DpkiError::CertParsing(format!(
                "No {label} data found in PEM"
            )));
        }

        general_purpose::STANDARD
            .decode(lines.concat())
            .map_err(|e| DpkiError::CertParsing(format!("Base64 decode error: {e}")))
    }

    /// DER names run from the most general RDN; ours start at the leaf
    fn read_name(name: &X509Name) -> Result<DistinguishedName> {
        let mut rdns = Vec::new();
        for rdn in name.iter() {
            let mut attrs = Vec::new();
            for atv in rdn.iter() {
                let key = attribute_key(&atv.attr_type().to_id_string());
                let value = atv
                    .as_str()
                    .map_err(|e| DpkiError::CertParsing(format!("Bad {key} value: {e}")))?;
                attrs.push((key, value.to_string()));
            }
            rdns.push(attrs);
        }
        rdns.reverse();
        DistinguishedName::from_rdns(rdns)
    }

    fn read_profile<'a, 'b: 'a>(
        extensions: impl Iterator<Item = &'a ParsedExtension<'b>>,
    ) -> ExtensionProfile {
        let mut profile = ExtensionProfile::default();

        for extension in extensions {
            match extension {
                ParsedExtension::BasicConstraints(bc) => {
                    profile.basic_constraints = Some(BasicConstraints {
                        ca: bc.ca,
                        path_length: bc.path_len_constraint,
                    });
                }
                ParsedExtension::KeyUsage(ku) => {
                    let flags = [
                        (ku.digital_signature(), KeyUsage::DigitalSignature),
                        (ku.non_repudiation(), KeyUsage::ContentCommitment),
                        (ku.key_encipherment(), KeyUsage::KeyEncipherment),
                        (ku.data_encipherment(), KeyUsage::DataEncipherment),
                        (ku.key_agreement(), KeyUsage::KeyAgreement),
                        (ku.key_cert_sign(), KeyUsage::KeyCertSign),
                        (ku.crl_sign(), KeyUsage::CrlSign),
                        (ku.encipher_only(), KeyUsage::EncipherOnly),
                        (ku.decipher_only(), KeyUsage::DecipherOnly),
                    ];
                    profile.key_usage = flags
                        .into_iter()
                        .filter(|(set, _)| *set)
                        .map(|(_, usage)| usage)
                        .collect();
                }
                ParsedExtension::ExtendedKeyUsage(eku) => {
                    if eku.server_auth {
                        profile.extended_key_usage.push(ExtendedKeyUsage::ServerAuth);
                    }
                    if eku.client_auth {
                        profile.extended_key_usage.push(ExtendedKeyUsage::ClientAuth);
                    }
                }
                ParsedExtension::SubjectAlternativeName(san) => {
                    for name in &san.general_names {
                        match name {
                            GeneralName::DNSName(dns) => {
                                profile.subject_alt_names.push(AltName::Dns(dns.to_string()))
                            }
                            GeneralName::RFC822Name(email) => profile
                                .subject_alt_names
                                .push(AltName::Email(email.to_string())),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_names() {
        assert_eq!(attribute_key("2.5.4.3"), "CN");
        assert_eq!(attribute_key("0.9.2342.19200300.100.1.25"), "DC");
        assert_eq!(attribute_key("1.2.3.4"), "1.2.3.4");
        assert_eq!(attribute_oid("STREET").map(|oid| oid.to_string()), Some("2.5.4.9".to_string()));
        assert_eq!(attribute_oid("X"), None);
    }

    #[test]
    fn test_pem_kind_detection() {
        assert!(CertificateParser::is_csr(b"-----BEGIN CERTIFICATE REQUEST-----\n"));
        assert!(!CertificateParser::is_certificate(b"-----BEGIN CERTIFICATE REQUEST-----\n"));
        assert!(CertificateParser::is_certificate(b"-----BEGIN CERTIFICATE-----\n"));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(CertificateParser::parse_certificate("not a pem").is_err());
        assert!(CertificateParser::parse_csr(
            "-----BEGIN CERTIFICATE REQUEST-----\nAAAA\n-----END CERTIFICATE REQUEST-----\n"
        )
        .is_err());
    }
}
