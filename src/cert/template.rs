use crate::cert::metadata::CertRole;
use crate::names::DistinguishedName;
use crate::utils::errors::{DpkiError, Result};
use const_oid::{AssociatedOid, ObjectIdentifier};
use der::asn1::{Ia5String, OctetString};
use der::Encode;
use std::fmt;
use std::str::FromStr;
use x509_cert::ext::pkix::{self, name::GeneralName, KeyUsages};
use x509_cert::ext::Extension;

const OID_KP_SERVER_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");
const OID_KP_CLIENT_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2");

/// Key usage bits in RFC 5280 order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    DigitalSignature,
    ContentCommitment,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    KeyCertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

impl KeyUsage {
    fn flag(self) -> KeyUsages {
        match self {
            KeyUsage::DigitalSignature => KeyUsages::DigitalSignature,
            KeyUsage::ContentCommitment => KeyUsages::NonRepudiation,
            KeyUsage::KeyEncipherment => KeyUsages::KeyEncipherment,
            KeyUsage::DataEncipherment => KeyUsages::DataEncipherment,
            KeyUsage::KeyAgreement => KeyUsages::KeyAgreement,
            KeyUsage::KeyCertSign => KeyUsages::KeyCertSign,
            KeyUsage::CrlSign => KeyUsages::CRLSign,
            KeyUsage::EncipherOnly => KeyUsages::EncipherOnly,
            KeyUsage::DecipherOnly => KeyUsages::DecipherOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtendedKeyUsage {
    ServerAuth,
    ClientAuth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AltName {
    Dns(String),
    Email(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicConstraints {
    pub ca: bool,
    pub path_length: Option<u32>,
}

/// The certificate extensions this toolkit understands.
///
/// All of them are written as critical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionProfile {
    pub basic_constraints: Option<BasicConstraints>,
    pub key_usage: Vec<KeyUsage>,
    pub extended_key_usage: Vec<ExtendedKeyUsage>,
    pub subject_alt_names: Vec<AltName>,
}

impl ExtensionProfile {
    pub fn is_ca(&self) -> bool {
        self.basic_constraints.is_some_and(|bc| bc.ca)
    }

    pub fn path_length(&self) -> Option<u32> {
        self.basic_constraints.and_then(|bc| bc.path_length)
    }

    pub fn has_key_usage(&self, usage: KeyUsage) -> bool {
        self.key_usage.contains(&usage)
    }

    pub fn has_extended_key_usage(&self, usage: ExtendedKeyUsage) -> bool {
        self.extended_key_usage.contains(&usage)
    }

    /// Critical X.509 extensions for a CSR or certificate
    pub fn to_extensions(&self) -> Result<Vec<Extension>> {
        let mut out = Vec::new();

        if let Some(bc) = self.basic_constraints {
            let path_len_constraint = bc
                .path_length
                .map(u8::try_from)
                .transpose()
                .map_err(|_| DpkiError::CertBuild("Path length does not fit in a byte".to_string()))?;
            out.push(critical(&pkix::BasicConstraints {
                ca: bc.ca,
                path_len_constraint,
            })?);
        }

        if !self.key_usage.is_empty() {
            let mut usage = pkix::KeyUsage(Default::default());
            for ku in &self.key_usage {
                usage.0 |= ku.flag();
            }
            out.push(critical(&usage)?);
        }

        if !self.extended_key_usage.is_empty() {
            let oids = self
                .extended_key_usage
                .iter()
                .map(|eku| match eku {
                    ExtendedKeyUsage::ServerAuth => OID_KP_SERVER_AUTH,
                    ExtendedKeyUsage::ClientAuth => OID_KP_CLIENT_AUTH,
                })
                .collect();
            out.push(critical(&pkix::ExtendedKeyUsage(oids))?);
        }

        if !self.subject_alt_names.is_empty() {
            let names = self
                .subject_alt_names
                .iter()
                .map(|name| match name {
                    AltName::Email(v) => Ia5String::new(v).map(GeneralName::Rfc822Name),
                    AltName::Dns(v) => Ia5String::new(v).map(GeneralName::DnsName),
                })
                .collect::<der::Result<Vec<_>>>()
                .map_err(|e| DpkiError::CertBuild(format!("Alternative names must be ASCII: {e}")))?;
            out.push(critical(&pkix::SubjectAltName(names))?);
        }

        Ok(out)
    }
}

fn critical<T: AssociatedOid + Encode>(value: &T) -> Result<Extension> {
    Ok(Extension {
        extn_id: T::OID,
        critical: true,
        extn_value: OctetString::new(value.to_der()?)?,
    })
}

/// Extra inputs for building a template profile
#[derive(Debug, Clone, Default)]
pub struct TemplateOptions {
    /// Path length for CA requests
    pub path_length: Option<u32>,
    /// Additional DNS names for node requests
    pub san: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    Ca,
    Node,
    User,
}

impl Template {
    pub const ALL: [Template; 3] = [Template::Ca, Template::Node, Template::User];

    /// Extensions a request built from this template carries
    pub fn profile(&self, subject: &DistinguishedName, options: &TemplateOptions) -> ExtensionProfile {
        match self {
            Template::Ca => ExtensionProfile {
                basic_constraints: Some(BasicConstraints {
                    ca: true,
                    path_length: options.path_length,
                }),
                key_usage: vec![
                    KeyUsage::DigitalSignature,
                    KeyUsage::KeyCertSign,
                    KeyUsage::CrlSign,
                ],
                ..Default::default()
            },
            Template::Node => {
                let mut san = vec![AltName::Dns("localhost".to_string())];
                san.extend(options.san.iter().cloned().map(AltName::Dns));
                if let Some(domain) = subject.domain() {
                    san.push(AltName::Dns(domain));
                }
                ExtensionProfile {
                    basic_constraints: Some(BasicConstraints {
                        ca: false,
                        path_length: None,
                    }),
                    key_usage: vec![
                        KeyUsage::DigitalSignature,
                        KeyUsage::ContentCommitment,
                        KeyUsage::KeyEncipherment,
                        KeyUsage::KeyAgreement,
                    ],
                    extended_key_usage: vec![ExtendedKeyUsage::ServerAuth],
                    subject_alt_names: san,
                }
            }
            Template::User => {
                let username = match (subject.uid(), subject.domain()) {
                    (Some(uid), Some(domain)) => Some(format!("{uid}@{domain}")),
                    _ => None,
                };
                ExtensionProfile {
                    basic_constraints: Some(BasicConstraints {
                        ca: false,
                        path_length: None,
                    }),
                    key_usage: vec![
                        KeyUsage::DigitalSignature,
                        KeyUsage::ContentCommitment,
                        KeyUsage::KeyEncipherment,
                        KeyUsage::DataEncipherment,
                    ],
                    extended_key_usage: vec![ExtendedKeyUsage::ClientAuth],
                    subject_alt_names: username.into_iter().map(AltName::Email).collect(),
                }
            }
        }
    }

    /// Classify a parsed extension profile
    pub fn matches_to(profile: &ExtensionProfile) -> Option<Template> {
        Self::ALL.into_iter().find(|t| t.accepts(profile))
    }

    fn accepts(&self, profile: &ExtensionProfile) -> bool {
        let Some(bc) = profile.basic_constraints else {
            return false;
        };
        match self {
            Template::Ca => bc.ca && profile.has_key_usage(KeyUsage::KeyCertSign),
            Template::Node => {
                !bc.ca && profile.has_extended_key_usage(ExtendedKeyUsage::ServerAuth)
            }
            Template::User => {
                !bc.ca && profile.has_extended_key_usage(ExtendedKeyUsage::ClientAuth)
            }
        }
    }

    /// Ledger role of a certificate issued from this template
    pub fn role(&self) -> CertRole {
        match self {
            Template::Ca => CertRole::Ca,
            Template::Node => CertRole::Host,
            Template::User => CertRole::User,
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Template::Ca => "CA",
            Template::Node => "Node",
            Template::User => "User",
        };
        f.write_str(name)
    }
}

impl FromStr for Template {
    type Err = DpkiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ca" => Ok(Template::Ca),
            "node" | "host" => Ok(Template::Node),
            "user" => Ok(Template::User),
            _ => Err(DpkiError::InvalidInput(format!("Unknown template: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> DistinguishedName {
        DistinguishedName::parse(s).unwrap()
    }

    #[test]
    fn test_templates_match_themselves() {
        let subject = dn("CN=Cheshire cat+UID=checat, STREET=Cat's house, C=WN+DC=wonderland");
        for template in Template::ALL {
            let profile = template.profile(&subject, &TemplateOptions::default());
            assert_eq!(Template::matches_to(&profile), Some(template));
        }
    }

    #[test]
    fn test_node_san() {
        let subject = dn("CN=Workshop Node+DC=node01, O=Workshop+DC=workshop, C=WN+DC=wonderland");
        let options = TemplateOptions {
            san: vec!["node01.local".to_string()],
            ..Default::default()
        };
        let profile = Template::Node.profile(&subject, &options);
        assert_eq!(
            profile.subject_alt_names,
            vec![
                AltName::Dns("localhost".to_string()),
                AltName::Dns("node01.local".to_string()),
                AltName::Dns("node01.workshop.wonderland".to_string()),
            ]
        );
    }

    #[test]
    fn test_user_san_needs_uid_and_domain() {
        let with_uid = dn("CN=Cheshire cat+UID=checat, L=Cheshire, C=WN+DC=wonderland");
        let profile = Template::User.profile(&with_uid, &TemplateOptions::default());
        assert_eq!(
            profile.subject_alt_names,
            vec![AltName::Email("checat@wonderland".to_string())]
        );

        let without = dn("CN=Cheshire cat, L=Cheshire, C=WN");
        let profile = Template::User.profile(&without, &TemplateOptions::default());
        assert!(profile.subject_alt_names.is_empty());
    }

    #[test]
    fn test_ca_profile_path_length() {
        let subject = dn("CN=Some CA, C=WN");
        let options = TemplateOptions {
            path_length: Some(2),
            ..Default::default()
        };
        let profile = Template::Ca.profile(&subject, &options);
        assert!(profile.is_ca());
        assert_eq!(profile.path_length(), Some(2));
        assert_eq!(Template::Ca.role(), CertRole::Ca);
    }

    #[test]
    fn test_unclassified_profiles() {
        assert_eq!(Template::matches_to(&ExtensionProfile::default()), None);
        let ca_without_cert_sign = ExtensionProfile {
            basic_constraints: Some(BasicConstraints {
                ca: true,
                path_length: None,
            }),
            key_usage: vec![KeyUsage::DigitalSignature],
            ..Default::default()
        };
        assert_eq!(Template::matches_to(&ca_without_cert_sign), None);
    }

    #[test]
    fn test_ca_extensions() {
        let subject = dn("CN=Some CA, C=WN");
        let extensions = Template::Ca
            .profile(&subject, &TemplateOptions::default())
            .to_extensions()
            .unwrap();
        assert_eq!(extensions.len(), 2);
        assert!(extensions.iter().all(|ext| ext.critical));
        assert_eq!(extensions[0].extn_id, pkix::BasicConstraints::OID);
        assert_eq!(extensions[0].extn_value.as_bytes(), &[0x30, 0x03, 0x01, 0x01, 0xff]);
        // digitalSignature, keyCertSign, cRLSign
        assert_eq!(extensions[1].extn_id, pkix::KeyUsage::OID);
        assert_eq!(extensions[1].extn_value.as_bytes(), &[0x03, 0x02, 0x01, 0x86]);
    }

    #[test]
    fn test_non_ascii_alt_names_are_rejected() {
        let subject = dn("CN=Чеширский кот+UID=кот, C=WN+DC=wonderland");
        let profile = Template::User.profile(&subject, &TemplateOptions::default());
        assert!(matches!(profile.to_extensions(), Err(DpkiError::CertBuild(_))));
    }

    #[test]
    fn test_template_from_str() {
        assert_eq!("CA".parse::<Template>().unwrap(), Template::Ca);
        assert_eq!("host".parse::<Template>().unwrap(), Template::Node);
        assert_eq!("user".parse::<Template>().unwrap(), Template::User);
        assert!("server".parse::<Template>().is_err());
    }
}
