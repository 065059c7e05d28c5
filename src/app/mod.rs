//! Chain application: transaction checks, block application and queries.

pub mod checker;
pub mod keeper;

pub use checker::{CheckedTx, TxChecker, TxRejection};
pub use keeper::{role_of, GenesisAppState, TxKeeper};

use crate::ca::CaService;
use crate::cert::{CaRecord, CertRole, CertificateParser};
use crate::chain::rpc::{QueryResponse, CODE_ERROR, CODE_OK};
use crate::chain::TxSink;
use crate::storage::{AppState, Ledger, DEFAULT_LIST_LIMIT};
use crate::utils::errors::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

const CA_LIST_PATH: &str = "ca/list";

pub struct Application<S: TxSink> {
    ledger: RwLock<Ledger>,
    keeper: Mutex<TxKeeper>,
    ca: Option<Arc<CaService<S>>>,
}

impl<S: TxSink> Application<S> {
    pub fn new(ledger: Ledger, ca: Option<Arc<CaService<S>>>) -> Result<Self> {
        let keeper = TxKeeper::new(&ledger.app_state())?;
        Ok(Self {
            ledger: RwLock::new(ledger),
            keeper: Mutex::new(keeper),
            ca,
        })
    }

    pub fn ca(&self) -> Option<&Arc<CaService<S>>> {
        self.ca.as_ref()
    }

    /// Nothing was committed yet, so genesis still has to be loaded
    pub async fn is_fresh(&self) -> bool {
        self.ledger.read().await.is_empty()
    }

    pub async fn info(&self) -> AppState {
        self.ledger.read().await.app_state()
    }

    /// Load the genesis `app_state` and return the initial app hash
    pub async fn init_chain(&self, app_state: &[u8]) -> Result<Vec<u8>> {
        let mut ledger = self.ledger.write().await;
        let mut keeper = self.keeper.lock().await;
        let app_hash = keeper.load_genesis(&mut ledger, app_state)?;
        tracing::info!(
            "Genesis loaded with {} certificates, app hash {}",
            ledger.len(),
            hex::encode(&app_hash)
        );
        Ok(app_hash)
    }

    pub async fn check_tx(&self, tx: &[u8]) -> std::result::Result<(), TxRejection> {
        let ledger = self.ledger.read().await;
        match TxChecker::new(&ledger).check_tx(tx) {
            Ok(_) => Ok(()),
            Err(rejection) => {
                tracing::debug!("check_tx rejected: {rejection}");
                Err(rejection)
            }
        }
    }

    pub async fn begin_block(&self) {
        self.keeper.lock().await.begin_block();
    }

    /// Apply a transaction to the current block. CSRs go to the local CA.
    pub async fn deliver_tx(&self, tx: &[u8]) -> std::result::Result<(), TxRejection> {
        let ledger = self.ledger.read().await;
        let csr = self.keeper.lock().await.deliver_tx(&ledger, tx)?;

        if let (Some(csr), Some(ca)) = (csr, &self.ca) {
            if ca.is_ready() {
                ca.issue(csr);
            }
        }
        Ok(())
    }

    pub async fn commit(&self) -> Result<AppState> {
        let state = {
            let mut ledger = self.ledger.write().await;
            self.keeper.lock().await.commit(&mut ledger)?
        };
        self.update_app_state(&state).await;
        Ok(state)
    }

    /// Bring the local CA up once the chain is past its first block
    pub async fn update_app_state(&self, state: &AppState) {
        let Some(ca) = &self.ca else {
            return;
        };
        if state.block_height <= 1 || ca.is_ready() {
            return;
        }
        let ledger = self.ledger.read().await;
        match ca.initialize(&ledger) {
            Ok(Some(subject)) => {
                tracing::info!("CA initialized on this node; subject: {subject}");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("CA is not initialized: {e}"),
        }
    }

    /// Answer an ABCI query. Paths are matched case-insensitively.
    pub async fn query(&self, path: &str) -> QueryResponse {
        let ledger = self.ledger.read().await;
        let height = ledger.app_state().block_height;

        if path.eq_ignore_ascii_case(CA_LIST_PATH) {
            let records = ca_records(&ledger);
            return match serde_json::to_vec(&records) {
                Ok(value) => QueryResponse::new(CODE_OK, "", &value, height),
                Err(e) => QueryResponse::new(CODE_ERROR, e.to_string(), &[], height),
            };
        }

        tracing::debug!("Unknown query path {path}");
        QueryResponse::new(CODE_ERROR, "Unknown query path", &[], height)
    }
}

fn ca_records(ledger: &Ledger) -> Vec<CaRecord> {
    ledger
        .list_by_role(CertRole::Ca, DEFAULT_LIST_LIMIT, 0)
        .into_iter()
        .filter_map(|entity| match CertificateParser::parse_certificate(&entity.pem_serialized) {
            Ok(cert) => Some(CaRecord {
                subject: entity.name,
                path_length: cert.profile.path_length(),
                issuer: Some(cert.issuer.to_string()),
            }),
            Err(e) => {
                tracing::warn!("Skipping unreadable CA {}: {e}", entity.name);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::CaConfig;
    use crate::cert::{apply_csr, create_csr, parse_date, self_sign, SigningKey, Template, TemplateOptions};
    use crate::names::DistinguishedName;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CollectSink {
        txs: StdMutex<Vec<Vec<u8>>>,
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

    fn csr(subject: &str, key: &SigningKey, template: Template, path_length: Option<u32>) -> String {
        let options = TemplateOptions {
            path_length,
            ..Default::default()
        };
        create_csr(&dn(subject), key, template, &options).unwrap()
    }

    struct Testnet {
        genesis: Vec<u8>,
        ca_key: SigningKey,
    }

    const ROOT: &str = "CN=Root Wonderland CA, C=WN";
    const CHESHIRE: &str = "CN=CA controlled by Cheshire Cat, STREET=Cat's house, L=Cheshire, C=WN";

    fn testnet() -> Testnet {
        let root_key = SigningKey::generate().unwrap();
        let root_csr = CertificateParser::parse_csr(&csr(ROOT, &root_key, Template::Ca, None)).unwrap();
        let root_pem = self_sign(&root_csr, &root_key, parse_date("2070-01-01").unwrap()).unwrap();

        let ca_key = SigningKey::generate().unwrap();
        let ca_csr = CertificateParser::parse_csr(&csr(CHESHIRE, &ca_key, Template::Ca, Some(7))).unwrap();
        let ca_pem = apply_csr(&ca_csr, &dn(ROOT), &root_key, parse_date("2050-01-01").unwrap(), None).unwrap();

        let genesis = serde_json::to_vec(&GenesisAppState {
            certificates: vec![root_pem, ca_pem],
        })
        .unwrap();
        Testnet { genesis, ca_key }
    }

    #[tokio::test]
    async fn test_ca_list_query() {
        let net = testnet();
        let app: Application<CollectSink> = Application::new(Ledger::in_memory(), None).unwrap();
        assert!(app.is_fresh().await);
        app.init_chain(&net.genesis).await.unwrap();

        let response = app.query("CA/List").await;
        assert!(response.is_ok());
        let records: Vec<CaRecord> = serde_json::from_slice(&response.decode_value().unwrap()).unwrap();
        assert_eq!(
            records,
            vec![CaRecord {
                subject: "CN=CA controlled by Cheshire Cat,STREET=Cat's house,L=Cheshire,C=WN".to_string(),
                path_length: Some(7),
                issuer: Some("CN=Root Wonderland CA,C=WN".to_string()),
            }]
        );

        let response = app.query("cert/list").await;
        assert_eq!(response.code, CODE_ERROR);
        assert_eq!(response.log, "Unknown query path");
    }

    #[tokio::test]
    async fn test_ca_issues_delivered_csr() {
        let net = testnet();
        let sink = Arc::new(CollectSink::default());
        let config = CaConfig {
            waiting_for_downstream: "10ms".parse().unwrap(),
            ..Default::default()
        };
        let ca = Arc::new(CaService::new(config, Some(net.ca_key), Arc::clone(&sink)));
        let app = Application::new(Ledger::in_memory(), Some(Arc::clone(&ca))).unwrap();
        app.init_chain(&net.genesis).await.unwrap();

        // The CA is initialized only after height 1
        app.begin_block().await;
        assert_eq!(app.commit().await.unwrap().block_height, 1);
        assert!(!ca.is_ready());
        app.begin_block().await;
        app.commit().await.unwrap();
        assert!(ca.is_ready());

        let user_key = SigningKey::generate().unwrap();
        let request = csr("CN=Cheshire cat, STREET=Cat's house, L=Cheshire, C=WN", &user_key, Template::User, None);
        app.check_tx(request.as_bytes()).await.unwrap();

        app.begin_block().await;
        app.deliver_tx(request.as_bytes()).await.unwrap();
        app.commit().await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let issued = sink.txs.lock().unwrap().clone();
        assert_eq!(issued.len(), 1);

        app.check_tx(&issued[0]).await.unwrap();
        app.begin_block().await;
        app.deliver_tx(&issued[0]).await.unwrap();
        let state = app.commit().await.unwrap();
        assert_eq!(state.block_height, 4);
        assert_eq!(app.info().await, state);

        // The subject is now taken by the same key
        let err = app.check_tx(request.as_bytes()).await.unwrap_err();
        assert_eq!(err.code, crate::chain::rpc::CODE_ALREADY_EXISTS);
    }
}
