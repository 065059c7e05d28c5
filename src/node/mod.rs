//! Development node: a single-process stand-in for the chain RPC.

pub mod config;
pub mod server;

pub use config::NodeConfig;
pub use server::{create_router, run_block_producer, serve, MempoolSink, NodeApp};

use crate::app::Application;
use crate::ca::CaService;
use crate::cert::SigningKey;
use crate::genesis::GenesisDoc;
use crate::storage::Ledger;
use crate::utils::errors::Result;
use crate::utils::paths::DpkiPaths;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Build the application for a node home, loading genesis on a fresh ledger
pub async fn open_app(home: &Path, config: &NodeConfig, mempool: &MempoolSink) -> Result<Arc<NodeApp>> {
    let ledger_path = config.ledger_path(home);
    if let Some(parent) = ledger_path.parent() {
        DpkiPaths::ensure_dir_exists(parent)?;
    }
    let ledger = Ledger::open(&ledger_path)?;

    let ca = match &config.ca {
        Some(ca_config) => {
            let key = match config.ca_key_path(home) {
                Some(path) => Some(SigningKey::load_tendermint(&path)?),
                None => None,
            };
            tracing::info!(
                "CA service enabled (key {})",
                if key.is_some() { "loaded" } else { "missing" }
            );
            Some(Arc::new(CaService::new(
                ca_config.clone(),
                key,
                Arc::new(mempool.clone()),
            )))
        }
        None => None,
    };

    let app = Arc::new(Application::new(ledger, ca)?);
    if app.is_fresh().await {
        let genesis_path = config.genesis_path(home);
        let genesis = GenesisDoc::load(&genesis_path)?;
        tracing::info!("Loading genesis for chain {}", genesis.chain_id);
        app.init_chain(&serde_json::to_vec(&genesis.app_state)?).await?;
    } else {
        let state = app.info().await;
        app.update_app_state(&state).await;
    }
    Ok(app)
}

/// Run the node until Ctrl-C
pub async fn run(home: &Path) -> Result<()> {
    let config = NodeConfig::load(home)?;
    let (mempool, receiver) = MempoolSink::channel();
    let app = open_app(home, &config, &mempool).await?;

    let state = app.info().await;
    tracing::info!(
        "Node home {} at height {}",
        home.display(),
        state.block_height
    );

    let listener = TcpListener::bind(config.listen_addr()).await?;
    let producer = tokio::spawn(run_block_producer(
        Arc::clone(&app),
        receiver,
        config.node.block_interval.as_duration(),
    ));

    tokio::select! {
        result = serve(listener, Arc::clone(&app), mempool) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    producer.abort();
    if let Some(ca) = app.ca() {
        ca.stop().await;
    }
    Ok(())
}
