use crate::app::{Application, TxRejection};
use crate::chain::rpc::{
    decode_tx, QueryResult, RpcEnvelope, StatusResult, SyncInfo, TxResult, CODE_ERROR, CODE_OK,
};
use crate::chain::TxSink;
use crate::utils::errors::{DpkiError, Result};
use axum::{
    extract::{Form, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Pending transactions waiting for the next block
#[derive(Clone)]
pub struct MempoolSink {
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

pub type MempoolReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

impl MempoolSink {
    pub fn channel() -> (Self, MempoolReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn push(&self, tx: Vec<u8>) -> Result<()> {
        self.sender
            .send(tx)
            .map_err(|_| DpkiError::Query("Mempool is closed".to_string()))
    }
}

impl TxSink for MempoolSink {
    async fn send_tx(&self, tx: Vec<u8>) -> Result<()> {
        self.push(tx)
    }
}

pub type NodeApp = Application<MempoolSink>;

#[derive(Clone)]
struct NodeState {
    app: Arc<NodeApp>,
    mempool: MempoolSink,
}

#[derive(Debug, Deserialize)]
struct QueryParams {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct TxParams {
    tx: String,
}

pub fn create_router(app: Arc<NodeApp>, mempool: MempoolSink) -> Router {
    Router::new()
        .route("/abci_query", get(abci_query))
        .route("/check_tx", get(check_tx_query).post(check_tx_form))
        .route(
            "/broadcast_tx_async",
            get(broadcast_tx_query).post(broadcast_tx_form),
        )
        .route("/status", get(status))
        .with_state(NodeState { app, mempool })
}

async fn abci_query(
    State(state): State<NodeState>,
    Query(params): Query<QueryParams>,
) -> Json<RpcEnvelope<QueryResult>> {
    let path = params.path.trim().trim_matches('"');
    let response = state.app.query(path).await;
    Json(RpcEnvelope::ok(QueryResult { response }))
}

async fn check_tx_query(
    State(state): State<NodeState>,
    Query(params): Query<TxParams>,
) -> Json<RpcEnvelope<TxResult>> {
    check_tx(&state, &params.tx).await
}

async fn check_tx_form(
    State(state): State<NodeState>,
    Form(params): Form<TxParams>,
) -> Json<RpcEnvelope<TxResult>> {
    check_tx(&state, &params.tx).await
}

async fn broadcast_tx_query(
    State(state): State<NodeState>,
    Query(params): Query<TxParams>,
) -> Json<RpcEnvelope<TxResult>> {
    broadcast_tx(&state, &params.tx).await
}

async fn broadcast_tx_form(
    State(state): State<NodeState>,
    Form(params): Form<TxParams>,
) -> Json<RpcEnvelope<TxResult>> {
    broadcast_tx(&state, &params.tx).await
}

async fn check_tx(state: &NodeState, param: &str) -> Json<RpcEnvelope<TxResult>> {
    let tx = decode_tx(param);
    let result = tx_result(&tx, state.app.check_tx(&tx).await);
    Json(RpcEnvelope::ok(result))
}

async fn broadcast_tx(state: &NodeState, param: &str) -> Json<RpcEnvelope<TxResult>> {
    let tx = decode_tx(param);
    let checked = state.app.check_tx(&tx).await;
    let mut result = tx_result(&tx, checked);
    if result.is_ok() {
        if let Err(e) = state.mempool.push(tx) {
            result.code = CODE_ERROR;
            result.log = e.to_string();
        } else {
            tracing::debug!("Queued tx {}", result.hash);
        }
    }
    Json(RpcEnvelope::ok(result))
}

async fn status(State(state): State<NodeState>) -> Json<RpcEnvelope<StatusResult>> {
    let info = state.app.info().await;
    Json(RpcEnvelope::ok(StatusResult {
        sync_info: SyncInfo {
            latest_block_height: info.block_height.to_string(),
            latest_app_hash: info.app_hash.to_uppercase(),
        },
    }))
}

fn tx_result(tx: &[u8], checked: std::result::Result<(), TxRejection>) -> TxResult {
    let hash = hex::encode_upper(Sha256::digest(tx));
    match checked {
        Ok(()) => TxResult {
            code: CODE_OK,
            log: String::new(),
            hash,
        },
        Err(rejection) => TxResult {
            code: rejection.code,
            log: rejection.log,
            hash,
        },
    }
}

/// Drain the mempool into a block every `interval`. Empty blocks are skipped.
pub async fn run_block_producer(
    app: Arc<NodeApp>,
    mut mempool: MempoolReceiver,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;

        let mut txs = Vec::new();
        let closed = loop {
            match mempool.try_recv() {
                Ok(tx) => txs.push(tx),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if txs.is_empty() {
            if closed {
                tracing::debug!("Mempool closed, stopping block producer");
                return;
            }
            continue;
        }

        app.begin_block().await;
        for tx in &txs {
            if let Err(rejection) = app.deliver_tx(tx).await {
                tracing::warn!("Dropped tx from block: {rejection}");
            }
        }
        match app.commit().await {
            Ok(state) => tracing::info!(
                "Committed block {} with {} txs, app hash {}",
                state.block_height,
                txs.len(),
                state.app_hash
            ),
            Err(e) => tracing::error!("Commit failed: {e}"),
        }
    }
}

/// Serve the RPC endpoint on an already bound listener
pub async fn serve(listener: TcpListener, app: Arc<NodeApp>, mempool: MempoolSink) -> Result<()> {
    let router = create_router(app, mempool);
    tracing::info!("Node RPC listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
