use crate::ca::config::CaConfig;
use crate::cert::{
    apply_csr, CertRole, CertificateParser, ParsedCertificate, ParsedCsr, SigningKey, Template,
};
use crate::chain::TxSink;
use crate::names::can_issue;
use crate::storage::Ledger;
use crate::utils::errors::{DpkiError, Result};
use crate::utils::tasks::TaskGroup;
use chrono::{Days, Utc};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Longest issuer chain we are willing to walk
const MAX_CHAIN_DEPTH: usize = 16;

#[derive(Debug, Default)]
struct CaState {
    /// Certificate held by this node's key
    cert: Option<ParsedCertificate>,
    /// Issuer chain ending at the root
    chain: Vec<ParsedCertificate>,
}

/// Certificate authority running on a node.
///
/// It watches CSRs delivered in blocks and issues certificates for subjects in
/// its namespace. CAs further away wait `waiting_for_downstream` per level so
/// the closest CA answers first.
pub struct CaService<S> {
    config: CaConfig,
    key: Option<SigningKey>,
    state: RwLock<CaState>,
    sink: Arc<S>,
    tasks: TaskGroup,
}

impl<S: TxSink> CaService<S> {
    pub fn new(config: CaConfig, key: Option<SigningKey>, sink: Arc<S>) -> Self {
        Self {
            config,
            key,
            state: RwLock::new(CaState::default()),
            sink,
            tasks: TaskGroup::new(),
        }
    }

    pub fn config(&self) -> &CaConfig {
        &self.config
    }

    /// The node's own CA certificate, once found on the chain
    pub fn cert(&self) -> Option<ParsedCertificate> {
        self.read_state().cert.clone()
    }

    pub fn root(&self) -> Option<ParsedCertificate> {
        self.read_state().chain.last().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.key.is_some() && self.read_state().cert.is_some()
    }

    /// Locate this node's certificate and its issuer chain in the ledger.
    ///
    /// Returns the subject when the node's own certificate is found. Without
    /// one, only the root is remembered.
    pub fn initialize(&self, ledger: &Ledger) -> Result<Option<String>> {
        let own = match &self.key {
            Some(key) => ledger.get_by_public_key(&key.public_key()).cloned(),
            None => None,
        };

        let mut state = CaState::default();
        let result = match own {
            Some(entity) => {
                let mut cert = CertificateParser::parse_certificate(&entity.pem_serialized)?;
                let subject = cert.subject.to_string();
                state.cert = Some(cert.clone());
                state.chain.push(cert.clone());

                while cert.subject != cert.issuer && state.chain.len() < MAX_CHAIN_DEPTH {
                    let Some(issuer) = ledger.get_by_subject(&cert.issuer.to_string()) else {
                        tracing::warn!("Issuer {} of {} is not on the chain", cert.issuer, cert.subject);
                        break;
                    };
                    cert = CertificateParser::parse_certificate(&issuer.pem_serialized)?;
                    state.chain.push(cert.clone());
                }
                Some(subject)
            }
            None => {
                let roots = ledger.list_by_role(CertRole::CaRoot, 1, 0);
                let Some(root) = roots.first() else {
                    return Err(DpkiError::CaNotFound("Not found active CA root cert".to_string()));
                };
                state
                    .chain
                    .push(CertificateParser::parse_certificate(&root.pem_serialized)?);
                None
            }
        };

        tracing::debug!("CA chain length {}", state.chain.len());
        *self.write_state() = state;
        Ok(result)
    }

    /// Distance from this CA to the CSR subject, 0 when it cannot issue
    pub fn can_issue_csr(&self, csr: &ParsedCsr) -> u32 {
        match &self.read_state().cert {
            Some(cert) => can_issue(&cert.subject, &csr.subject),
            None => 0,
        }
    }

    /// Schedule issuing a certificate for `csr`. Returns the task id when scheduled.
    pub fn issue(self: &Arc<Self>, csr: ParsedCsr) -> Option<u64> {
        if self.key.is_none() {
            return None;
        }
        let issuer = self.cert()?;

        let distance = can_issue(&issuer.subject, &csr.subject);
        if distance < 1 {
            tracing::debug!("{} is outside of this CA namespace", csr.subject);
            return None;
        }

        let Some(template) = csr.template() else {
            tracing::debug!("CSR for {} matches no template", csr.subject);
            return None;
        };
        if !self.config.allows(template) {
            tracing::debug!("Template {template} is not allowed on this CA");
            return None;
        }

        let mut csr = csr;
        if template == Template::Ca {
            let issuer_path_length = issuer.profile.path_length();
            if issuer_path_length == Some(0) {
                tracing::warn!("Refusing CA request for {}: path length exhausted", csr.subject);
                return None;
            }
            let requested = csr
                .profile
                .path_length()
                .unwrap_or(self.config.next_path_length);
            let allowed = match issuer_path_length {
                Some(len) => requested.min(len - 1),
                None => requested,
            };
            if let Some(bc) = csr.profile.basic_constraints.as_mut() {
                bc.path_length = Some(allowed);
            }
        }

        let delay = self.config.waiting_for_downstream.as_duration() * (distance - 1);
        let valid_days = self.config.valid_days(template);
        let service = Arc::clone(self);

        tracing::info!(
            "Scheduling {template} certificate for {} in {:?} (distance {distance})",
            csr.subject,
            delay
        );
        let id = self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = service.sign_and_send(&issuer, &csr, valid_days).await {
                tracing::error!("Cannot issue certificate for {}: {e}", csr.subject);
            }
        });
        Some(id)
    }

    async fn sign_and_send(
        &self,
        issuer: &ParsedCertificate,
        csr: &ParsedCsr,
        valid_days: u64,
    ) -> Result<()> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| DpkiError::Key("CA key is not configured".to_string()))?;
        let today = Utc::now().date_naive();
        let not_valid_after = today
            .checked_add_days(Days::new(valid_days))
            .ok_or_else(|| DpkiError::InvalidInput(format!("Bad validity of {valid_days} days")))?;

        let pem = apply_csr(csr, &issuer.subject, key, not_valid_after, Some(today))?;
        self.sink.send_tx(pem.into_bytes()).await
    }

    /// Number of pending issuing tasks
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub async fn stop(&self) {
        self.tasks.stop().await;
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CaState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CaState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::config::HumanDuration;
    use crate::cert::{create_csr, parse_date, self_sign, CertEntity, TemplateOptions};
    use crate::names::DistinguishedName;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CollectSink {
        txs: Mutex<Vec<Vec<u8>>>,
    }

    impl TxSink for CollectSink {
        async fn send_tx(&self, tx: Vec<u8>) -> Result<()> {
            self.txs.lock().unwrap().push(tx);
            Ok(())
        }
    }

    fn dn(s: &str) -> DistinguishedName {
        DistinguishedName::parse(s).unwrap()
    }

    fn entity(pem: &str, role: CertRole) -> CertEntity {
        let cert = CertificateParser::parse_certificate(pem).unwrap();
        CertEntity::from_certificate(&cert, Some(role))
    }

    fn csr(subject: &str, template: Template, path_length: Option<u32>) -> ParsedCsr {
        let key = SigningKey::generate().unwrap();
        let options = TemplateOptions {
            path_length,
            ..Default::default()
        };
        let pem = create_csr(&dn(subject), &key, template, &options).unwrap();
        CertificateParser::parse_csr(&pem).unwrap()
    }

    /// Root CA plus an intermediate held by the returned key
    fn ledger_with_ca(ca_path_length: Option<u32>) -> (Ledger, SigningKey) {
        let root_key = SigningKey::generate().unwrap();
        let root_dn = dn("CN=Root Wonderland CA, C=WN");
        let root_csr = create_csr(&root_dn, &root_key, Template::Ca, &TemplateOptions::default()).unwrap();
        let root_csr = CertificateParser::parse_csr(&root_csr).unwrap();
        let root_pem = self_sign(&root_csr, &root_key, parse_date("2070-01-01").unwrap()).unwrap();

        let ca_key = SigningKey::generate().unwrap();
        let ca_dn = dn("CN=CA controlled by Cheshire Cat, STREET=Cat's house, L=Cheshire, C=WN");
        let options = TemplateOptions {
            path_length: ca_path_length,
            ..Default::default()
        };
        let ca_csr = create_csr(&ca_dn, &ca_key, Template::Ca, &options).unwrap();
        let ca_csr = CertificateParser::parse_csr(&ca_csr).unwrap();
        let ca_pem =
            apply_csr(&ca_csr, &root_dn, &root_key, parse_date("2050-01-01").unwrap(), None).unwrap();

        let mut ledger = Ledger::in_memory();
        ledger
            .insert(vec![entity(&root_pem, CertRole::CaRoot), entity(&ca_pem, CertRole::Ca)])
            .unwrap();
        (ledger, ca_key)
    }

    fn fast_config() -> CaConfig {
        CaConfig {
            waiting_for_downstream: "20ms".parse().unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_initialize_loads_chain() {
        let (ledger, key) = ledger_with_ca(Some(7));
        let service = CaService::new(fast_config(), Some(key), Arc::new(CollectSink::default()));
        let subject = service.initialize(&ledger).unwrap();
        assert_eq!(
            subject.as_deref(),
            Some("CN=CA controlled by Cheshire Cat,STREET=Cat's house,L=Cheshire,C=WN")
        );
        assert!(service.is_ready());
        assert_eq!(
            service.root().unwrap().subject,
            dn("CN=Root Wonderland CA, C=WN")
        );
    }

    #[test]
    fn test_initialize_falls_back_to_root() {
        let (ledger, _) = ledger_with_ca(None);
        let other_key = SigningKey::generate().unwrap();
        let service = CaService::new(fast_config(), Some(other_key), Arc::new(CollectSink::default()));
        assert_eq!(service.initialize(&ledger).unwrap(), None);
        assert!(!service.is_ready());
        assert!(service.root().is_some());
    }

    #[test]
    fn test_initialize_without_root() {
        let service: CaService<CollectSink> =
            CaService::new(fast_config(), None, Arc::new(CollectSink::default()));
        let err = service.initialize(&Ledger::in_memory()).unwrap_err();
        assert!(err.to_string().contains("Not found active CA root cert"));
    }

    #[tokio::test]
    async fn test_issue_after_downstream_wait() {
        let (ledger, key) = ledger_with_ca(Some(7));
        let sink = Arc::new(CollectSink::default());
        let service = Arc::new(CaService::new(fast_config(), Some(key), Arc::clone(&sink)));
        service.initialize(&ledger).unwrap();

        let near = csr("CN=Cheshire cat, STREET=Cat's house, L=Cheshire, C=WN", Template::User, None);
        assert_eq!(service.can_issue_csr(&near), 1);
        assert!(service.issue(near).is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let txs = sink.txs.lock().unwrap().clone();
        assert_eq!(txs.len(), 1);
        let cert = CertificateParser::parse_certificate(&String::from_utf8(txs[0].clone()).unwrap())
            .unwrap();
        assert_eq!(cert.issuer, service.cert().unwrap().subject);
        assert_eq!(cert.template(), Some(Template::User));
        let days = (cert.not_after.date_naive() - Utc::now().date_naive()).num_days();
        assert_eq!(days, 365);
    }

    #[tokio::test]
    async fn test_far_subjects_wait_longer() {
        let (ledger, key) = ledger_with_ca(Some(7));
        let sink = Arc::new(CollectSink::default());
        let config = CaConfig {
            waiting_for_downstream: HumanDuration::from_secs(60),
            ..Default::default()
        };
        let service = Arc::new(CaService::new(config, Some(key), Arc::clone(&sink)));
        service.initialize(&ledger).unwrap();

        let far = csr(
            "CN=Kitten, ST=Basket, STREET=Cat's house, L=Cheshire, C=WN",
            Template::User,
            None,
        );
        assert_eq!(service.can_issue_csr(&far), 2);
        service.issue(far);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.txs.lock().unwrap().is_empty());
        service.stop().await;
        assert_eq!(service.pending(), 0);
    }

    #[test]
    fn test_issue_refusals() {
        let (ledger, key) = ledger_with_ca(Some(0));
        let config = CaConfig {
            allow_templates: vec!["CA".to_string(), "User".to_string()],
            ..fast_config()
        };
        let service = Arc::new(CaService::new(config, Some(key), Arc::new(CollectSink::default())));
        service.initialize(&ledger).unwrap();

        // Outside of the namespace
        let outside = csr("CN=Workshop Node, O=Workshop, C=WN", Template::User, None);
        assert_eq!(service.can_issue_csr(&outside), 0);
        assert!(service.issue(outside).is_none());

        // Node template is not allowed here
        let node = csr("CN=Cat's house Node, STREET=Cat's house, L=Cheshire, C=WN", Template::Node, None);
        assert!(service.issue(node).is_none());

        // Issuer path length is exhausted
        let sub_ca = csr("CN=Sub CA, STREET=Cat's house, L=Cheshire, C=WN", Template::Ca, None);
        assert!(service.issue(sub_ca).is_none());
    }
}
