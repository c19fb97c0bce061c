//! HTTP control surface: inspect the chain, mine blocks, manage peers.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::chain::Block;
use crate::node::{NodeError, NodeHandle};
use crate::transport::PeerAddress;

/// Body of `POST /addBlock`
#[derive(Debug, Deserialize)]
pub struct AddBlockRequest {
    #[serde(default)]
    pub data: Value,
}

/// Body of `POST /addPeer`
#[derive(Debug, Deserialize)]
pub struct AddPeerRequest {
    pub peer: String,
}

type ApiError = (StatusCode, String);

fn node_error(e: NodeError) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Build the router over a running node
pub fn router(handle: NodeHandle) -> Router {
    Router::new()
        .route("/blockchain", get(list_blocks))
        .route("/addBlock", post(add_block))
        .route("/peers", get(list_peers))
        .route("/addPeer", post(add_peer))
        .with_state(handle)
}

/// GET /blockchain
pub async fn list_blocks(State(node): State<NodeHandle>) -> Result<Json<Vec<Block>>, ApiError> {
    node.blocks().await.map(Json).map_err(node_error)
}

/// POST /addBlock
pub async fn add_block(
    State(node): State<NodeHandle>,
    Json(payload): Json<AddBlockRequest>,
) -> Result<Json<Block>, ApiError> {
    node.mine_block(payload.data).await.map(Json).map_err(node_error)
}

/// GET /peers
pub async fn list_peers(State(node): State<NodeHandle>) -> Result<Json<Vec<String>>, ApiError> {
    node.peers().await.map(Json).map_err(node_error)
}

/// POST /addPeer
pub async fn add_peer(
    State(node): State<NodeHandle>,
    Json(payload): Json<AddPeerRequest>,
) -> Result<StatusCode, ApiError> {
    let address = PeerAddress::parse(&payload.peer)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    node.add_peer(address).await.map_err(node_error)?;
    Ok(StatusCode::OK)
}
