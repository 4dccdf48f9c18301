use crate::peer::normalize_peer;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{
    mine::mine, Block, ChainSnapshot, ConsensusResolver, Ledger, Number, PeerFetcher, PeerSet,
    PreviousHash, Transaction,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing values: {0}")]
    MissingValues(String),
    #[error("please supply a valid list of nodes")]
    MissingNodes,
    #[error("invalid peer address {0:?}")]
    InvalidPeer(String),
    #[error("mining task failed: {0}")]
    Mining(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Mining(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub peers: Arc<RwLock<PeerSet>>,
    pub resolver: Arc<ConsensusResolver<dyn PeerFetcher>>,
    pub node_id: Arc<str>,
}

impl AppState {
    pub fn new(node_id: impl Into<Arc<str>>, fetcher: Arc<dyn PeerFetcher>) -> Self {
        Self {
            ledger: Arc::new(Ledger::new()),
            peers: Arc::new(RwLock::new(PeerSet::new())),
            resolver: Arc::new(ConsensusResolver::new(fetcher)),
            node_id: node_id.into(),
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Deserialize)]
struct TxIn {
    sender: String,
    recipient: String,
    amount: Number,
}

#[derive(Serialize)]
struct TxAccepted {
    message: String,
    index: u64,
}

#[derive(Serialize)]
struct Mined {
    message: &'static str,
    index: u64,
    transactions: Vec<Transaction>,
    proof: u64,
    previous_hash: PreviousHash,
}

impl From<Block> for Mined {
    fn from(block: Block) -> Self {
        Self {
            message: "New Block Forged",
            index: block.index,
            transactions: block.transactions,
            proof: block.proof,
            previous_hash: block.previous_hash,
        }
    }
}

#[derive(Deserialize)]
struct RegisterIn {
    nodes: Option<Vec<String>>,
}

#[derive(Serialize)]
struct Registered {
    message: &'static str,
    total_nodes: Vec<String>,
}

#[derive(Serialize)]
struct Resolved {
    message: &'static str,
    replaced: bool,
    chain: Vec<Block>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/transactions/new", post(new_transaction))
        .route("/mine", get(mine_block))
        .route("/chain", get(full_chain))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(consensus))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn new_transaction(
    State(state): State<AppState>,
    payload: Result<Json<TxIn>, JsonRejection>,
) -> Result<(StatusCode, Json<TxAccepted>), ApiError> {
    let Json(tx) = payload.map_err(|e| ApiError::MissingValues(e.body_text()))?;
    let index = state.ledger.new_transaction(tx.sender, tx.recipient, tx.amount);
    Ok((
        StatusCode::CREATED,
        Json(TxAccepted {
            message: format!("Transaction will be added to Block {index}"),
            index,
        }),
    ))
}

async fn mine_block(State(state): State<AppState>) -> Result<Json<Mined>, ApiError> {
    let ledger = state.ledger.clone();
    let node_id = state.node_id.clone();
    let block = tokio::task::spawn_blocking(move || mine(&ledger, &node_id))
        .await
        .map_err(|e| ApiError::Mining(e.to_string()))?;
    Ok(Json(block.into()))
}

async fn full_chain(State(state): State<AppState>) -> Json<ChainSnapshot> {
    Json(ChainSnapshot::of(&state.ledger))
}

async fn register_nodes(
    State(state): State<AppState>,
    payload: Result<Json<RegisterIn>, JsonRejection>,
) -> Result<(StatusCode, Json<Registered>), ApiError> {
    let Json(body) = payload.map_err(|_| ApiError::MissingNodes)?;
    let nodes = body.nodes.ok_or(ApiError::MissingNodes)?;
    let normalized = nodes
        .iter()
        .map(|n| normalize_peer(n))
        .collect::<Result<Vec<_>, _>>()?;

    let mut peers = state.peers.write();
    for peer in normalized {
        if peers.insert(peer.clone()) {
            info!(%peer, "registered peer");
        }
    }
    let mut total_nodes: Vec<String> = peers.iter().map(str::to_string).collect();
    total_nodes.sort();
    Ok((
        StatusCode::CREATED,
        Json(Registered {
            message: "New nodes have been added",
            total_nodes,
        }),
    ))
}

async fn consensus(State(state): State<AppState>) -> Json<Resolved> {
    let peers = state.peers.read().clone();
    let replaced = state.resolver.resolve_conflicts(&state.ledger, &peers).await;
    let message = if replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };
    Json(Resolved {
        message,
        replaced,
        chain: state.ledger.chain(),
    })
}
