use crate::cert::{CertEntity, CertificateParser, ParsedCertificate, ParsedCsr};
use crate::chain::rpc::{CODE_ALREADY_EXISTS, CODE_ERROR};
use crate::storage::Ledger;
use std::fmt;

/// Reason a transaction was not accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRejection {
    pub code: u32,
    pub log: String,
}

impl TxRejection {
    pub fn new(code: u32, log: impl Into<String>) -> Self {
        Self {
            code,
            log: log.into(),
        }
    }

    fn error(log: impl Into<String>) -> Self {
        Self::new(CODE_ERROR, log)
    }
}

impl fmt::Display for TxRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.log, self.code)
    }
}

/// A transaction that passed the checks
#[derive(Debug, Clone)]
pub enum CheckedTx {
    Csr(ParsedCsr),
    Certificate(ParsedCertificate),
}

pub type CheckResult = std::result::Result<CheckedTx, TxRejection>;

/// Validates PEM transactions against the ledger and the certificates
/// staged in the current block.
pub struct TxChecker<'a> {
    ledger: &'a Ledger,
    staged: &'a [CertEntity],
}

impl<'a> TxChecker<'a> {
    pub fn new(ledger: &'a Ledger) -> Self {
        Self { ledger, staged: &[] }
    }

    pub fn with_staged(mut self, staged: &'a [CertEntity]) -> Self {
        self.staged = staged;
        self
    }

    pub fn check_tx(&self, tx: &[u8]) -> CheckResult {
        if CertificateParser::is_csr(tx) {
            self.check_csr(tx)
        } else if CertificateParser::is_certificate(tx) {
            self.check_certificate(tx)
        } else {
            Err(TxRejection::error("Unknown TX"))
        }
    }

    fn check_csr(&self, tx: &[u8]) -> CheckResult {
        let csr = std::str::from_utf8(tx)
            .ok()
            .and_then(|pem| CertificateParser::parse_csr(pem).ok())
            .filter(|csr| csr.signature_valid && csr.template().is_some())
            .ok_or_else(|| TxRejection::error("Wrong CSR"))?;

        if let Some(found) = self.find_subject(&csr.subject.to_string()) {
            return Err(if found.public_key == csr.public_key.to_hex() {
                TxRejection::new(CODE_ALREADY_EXISTS, "Certificate already exists")
            } else {
                TxRejection::error(
                    "Certificate for given subject already issued for an other public key",
                )
            });
        }
        Ok(CheckedTx::Csr(csr))
    }

    fn check_certificate(&self, tx: &[u8]) -> CheckResult {
        let cert = std::str::from_utf8(tx)
            .ok()
            .and_then(|pem| CertificateParser::parse_certificate(pem).ok())
            .filter(|cert| cert.template().is_some())
            .ok_or_else(|| TxRejection::error("Wrong Certificate"))?;

        if let Some(found) = self.find_subject(&cert.subject.to_string()) {
            return Err(TxRejection::error(if found.public_key == cert.public_key.to_hex() {
                "Certificate already exists"
            } else {
                "Certificate for given subject already issued for an other public key"
            }));
        }

        let issuer = self
            .find_subject(&cert.issuer.to_string())
            .ok_or_else(|| TxRejection::error("Certificate issuer not found"))?;
        let issuer_spki = CertificateParser::parse_certificate(&issuer.pem_serialized)
            .map(|issuer| issuer.spki)
            .map_err(|e| {
                tracing::warn!("Stored issuer {} cannot be parsed: {e}", issuer.name);
                TxRejection::error("Certificate issuer not found")
            })?;
        if !cert.is_signed_by(&issuer_spki) {
            return Err(TxRejection::error("Certificate signature verification failed"));
        }
        Ok(CheckedTx::Certificate(cert))
    }

    fn find_subject(&self, subject: &str) -> Option<&CertEntity> {
        self.staged
            .iter()
            .find(|e| e.name == subject)
            .or_else(|| self.ledger.get_by_subject(subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{apply_csr, create_csr, parse_date, self_sign, CertRole, SigningKey, Template, TemplateOptions};
    use crate::names::DistinguishedName;

    struct Fixture {
        ledger: Ledger,
        root_dn: DistinguishedName,
        root_key: SigningKey,
    }

    fn dn(s: &str) -> DistinguishedName {
        DistinguishedName::parse(s).unwrap()
    }

    fn csr_pem(subject: &str, key: &SigningKey, template: Template) -> String {
        create_csr(&dn(subject), key, template, &TemplateOptions::default()).unwrap()
    }

    fn fixture() -> Fixture {
        let root_key = SigningKey::generate().unwrap();
        let root_dn = dn("CN=Root Wonderland CA, C=WN");
        let csr = CertificateParser::parse_csr(&csr_pem("CN=Root Wonderland CA, C=WN", &root_key, Template::Ca))
            .unwrap();
        let pem = self_sign(&csr, &root_key, parse_date("2070-01-01").unwrap()).unwrap();
        let cert = CertificateParser::parse_certificate(&pem).unwrap();

        let mut ledger = Ledger::in_memory();
        ledger
            .insert(vec![CertEntity::from_certificate(&cert, Some(CertRole::CaRoot))])
            .unwrap();
        Fixture {
            ledger,
            root_dn,
            root_key,
        }
    }

    fn issue(f: &Fixture, subject: &str, key: &SigningKey, signer: &SigningKey) -> String {
        let csr = CertificateParser::parse_csr(&csr_pem(subject, key, Template::Node)).unwrap();
        apply_csr(&csr, &f.root_dn, signer, parse_date("2050-01-01").unwrap(), None).unwrap()
    }

    #[test]
    fn test_unknown_tx() {
        let f = fixture();
        let err = TxChecker::new(&f.ledger).check_tx(b"hello").unwrap_err();
        assert_eq!(err, TxRejection::new(CODE_ERROR, "Unknown TX"));
    }

    #[test]
    fn test_csr_checks() {
        let f = fixture();
        let checker = TxChecker::new(&f.ledger);
        let key = SigningKey::generate().unwrap();

        let pem = csr_pem("CN=Alice, O=Wonderland, C=WN", &key, Template::User);
        assert!(matches!(checker.check_tx(pem.as_bytes()), Ok(CheckedTx::Csr(_))));

        let broken = pem.replace("MI", "AA");
        assert_eq!(checker.check_tx(broken.as_bytes()).unwrap_err().log, "Wrong CSR");

        // Root subject is already taken
        let same = csr_pem("CN=Root Wonderland CA, C=WN", &f.root_key, Template::Ca);
        let err = checker.check_tx(same.as_bytes()).unwrap_err();
        assert_eq!(err, TxRejection::new(CODE_ALREADY_EXISTS, "Certificate already exists"));

        let other = csr_pem("CN=Root Wonderland CA, C=WN", &key, Template::Ca);
        let err = checker.check_tx(other.as_bytes()).unwrap_err();
        assert_eq!(err.code, CODE_ERROR);
        assert_eq!(
            err.log,
            "Certificate for given subject already issued for an other public key"
        );
    }

    #[test]
    fn test_certificate_checks() {
        let f = fixture();
        let checker = TxChecker::new(&f.ledger);
        let key = SigningKey::generate().unwrap();

        let pem = issue(&f, "CN=Workshop Node, O=Workshop, C=WN", &key, &f.root_key);
        match checker.check_tx(pem.as_bytes()) {
            Ok(CheckedTx::Certificate(cert)) => assert_eq!(cert.issuer, f.root_dn),
            other => panic!("unexpected result {other:?}"),
        }

        let forged = issue(&f, "CN=Workshop Node, O=Workshop, C=WN", &key, &key);
        assert_eq!(
            checker.check_tx(forged.as_bytes()).unwrap_err().log,
            "Certificate signature verification failed"
        );

        let stranger_key = SigningKey::generate().unwrap();
        let stranger_dn = dn("CN=Stranger CA, C=XX");
        let csr = CertificateParser::parse_csr(&csr_pem("CN=Lost Node, C=XX", &key, Template::Node)).unwrap();
        let orphan = apply_csr(&csr, &stranger_dn, &stranger_key, parse_date("2050-01-01").unwrap(), None).unwrap();
        assert_eq!(
            checker.check_tx(orphan.as_bytes()).unwrap_err().log,
            "Certificate issuer not found"
        );
    }

    #[test]
    fn test_staged_certificates_count_as_duplicates() {
        let f = fixture();
        let key = SigningKey::generate().unwrap();
        let pem = issue(&f, "CN=Workshop Node, O=Workshop, C=WN", &key, &f.root_key);
        let cert = CertificateParser::parse_certificate(&pem).unwrap();
        let staged = vec![CertEntity::from_certificate(&cert, Some(CertRole::Host))];

        let checker = TxChecker::new(&f.ledger).with_staged(&staged);
        let err = checker.check_tx(pem.as_bytes()).unwrap_err();
        assert_eq!(err, TxRejection::new(CODE_ERROR, "Certificate already exists"));
    }
}
