//! CSR creation and certificate signing with x509-cert.

use crate::cert::keys::{ed25519_algorithm, SigningKey};
use crate::cert::parser::{attribute_oid, ParsedCsr};
use crate::cert::template::{ExtensionProfile, Template, TemplateOptions};
use crate::cert::SerialNumber;
use crate::names::DistinguishedName;
use crate::utils::errors::{DpkiError, Result};
use chrono::{Datelike, NaiveDate, Utc};
use const_oid::ObjectIdentifier;
use der::asn1::{
    BitString, GeneralizedTime, Ia5StringRef, PrintableStringRef, SetOfVec, UtcTime, Utf8StringRef,
};
use der::pem::LineEnding;
use der::{Any, Decode, Encode, EncodePem};
use x509_cert::attr::{Attribute, AttributeTypeAndValue, Attributes};
use x509_cert::certificate::{Certificate, TbsCertificate, Version};
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::request::{CertReq, CertReqInfo, Version as RequestVersion};
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::{Time, Validity};

/// PKCS#9 extensionRequest attribute
const OID_EXTENSION_REQUEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.14");

/// First year that has to be written as GeneralizedTime (RFC 5280, 4.1.2.5)
const GENERALIZED_TIME_FROM: i32 = 2050;

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| DpkiError::InvalidInput(format!("Bad date `{value}`: {e}")))
}

/// Build and sign a PEM CSR for `subject` with the extensions of `template`
pub fn create_csr(
    subject: &DistinguishedName,
    key: &SigningKey,
    template: Template,
    options: &TemplateOptions,
) -> Result<String> {
    let profile = template.profile(subject, options);
    let info = CertReqInfo {
        version: RequestVersion::V1,
        subject: encode_name(subject)?,
        public_key: key.public_key().to_spki()?,
        attributes: extension_request(&profile)?,
    };
    let signature = key.sign(&info.to_der()?);
    let csr = CertReq {
        info,
        algorithm: ed25519_algorithm(),
        signature: BitString::from_bytes(&signature)?,
    };
    tracing::debug!("Created {template} CSR for {subject}");
    Ok(csr.to_pem(LineEnding::LF)?)
}

/// Sign a certificate for the subject and key of `csr`.
///
/// Validity runs from `not_valid_before` (today when unset) 00:00:00 to
/// `not_valid_after` 23:59:59 UTC.
pub fn apply_csr(
    csr: &ParsedCsr,
    issuer: &DistinguishedName,
    issuer_key: &SigningKey,
    not_valid_after: NaiveDate,
    not_valid_before: Option<NaiveDate>,
) -> Result<String> {
    let not_valid_before = not_valid_before.unwrap_or_else(|| Utc::now().date_naive());
    if not_valid_after < not_valid_before {
        return Err(DpkiError::InvalidInput(format!(
            "Certificate would expire ({not_valid_after}) before it starts ({not_valid_before})"
        )));
    }

    let serial = SerialNumber::random();
    let extensions = csr.profile.to_extensions()?;
    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: x509_cert::serial_number::SerialNumber::new(&serial.to_bytes())?,
        signature: ed25519_algorithm(),
        issuer: encode_name(issuer)?,
        validity: Validity {
            not_before: encode_time(not_valid_before, (0, 0, 0))?,
            not_after: encode_time(not_valid_after, (23, 59, 59))?,
        },
        subject: encode_name(&csr.subject)?,
        subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(&csr.spki)?,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: (!extensions.is_empty()).then_some(extensions),
    };
    let signature = issuer_key.sign(&tbs_certificate.to_der()?);
    let cert = Certificate {
        tbs_certificate,
        signature_algorithm: ed25519_algorithm(),
        signature: BitString::from_bytes(&signature)?,
    };

    tracing::info!(
        "Issued certificate {} for {} by {issuer}, valid until {not_valid_after}",
        serial,
        csr.subject
    );
    Ok(cert.to_pem(LineEnding::LF)?)
}

/// Self-sign a root certificate from its own CSR
pub fn self_sign(csr: &ParsedCsr, key: &SigningKey, not_valid_after: NaiveDate) -> Result<String> {
    apply_csr(csr, &csr.subject, key, not_valid_after, None)
}

/// Encode a name as an RDNSequence, one SET per written RDN.
///
/// DER runs from the most general RDN, so the written order is reversed.
fn encode_name(name: &DistinguishedName) -> Result<Name> {
    let mut rdns = Vec::with_capacity(name.len());
    for rdn in name.rdns().iter().rev() {
        let mut set = SetOfVec::new();
        for (key, value) in rdn {
            let oid = attribute_oid(key).ok_or_else(|| {
                DpkiError::InvalidName(format!("Unsupported attribute type {key}"))
            })?;
            let value = match key.as_str() {
                "C" => Any::encode_from(&PrintableStringRef::new(value)?)?,
                "DC" => Any::encode_from(&Ia5StringRef::new(value)?)?,
                _ => Any::encode_from(&Utf8StringRef::new(value)?)?,
            };
            set.insert(AttributeTypeAndValue { oid, value }).map_err(|e| {
                DpkiError::InvalidName(format!("`{name}`: duplicate attribute {key}: {e}"))
            })?;
        }
        rdns.push(RelativeDistinguishedName(set));
    }
    Ok(RdnSequence(rdns))
}

/// The extensions of `profile` wrapped in a PKCS#9 extensionRequest
fn extension_request(profile: &ExtensionProfile) -> Result<Attributes> {
    let mut attributes = Attributes::new();
    let extensions = profile.to_extensions()?;
    if extensions.is_empty() {
        return Ok(attributes);
    }

    let mut values = SetOfVec::new();
    values.insert(Any::encode_from(&extensions)?)?;
    attributes.insert(Attribute {
        oid: OID_EXTENSION_REQUEST,
        values,
    })?;
    Ok(attributes)
}

fn encode_time(date: NaiveDate, (hour, minute, second): (u8, u8, u8)) -> Result<Time> {
    let year = u16::try_from(date.year())
        .map_err(|_| DpkiError::InvalidInput(format!("Unsupported year in {date}")))?;
    let at = der::DateTime::new(
        year,
        date.month() as u8,
        date.day() as u8,
        hour,
        minute,
        second,
    )?;
    if date.year() < GENERALIZED_TIME_FROM {
        Ok(Time::UtcTime(UtcTime::from_date_time(at)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(at)))
    }
}
