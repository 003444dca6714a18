//! Node-to-node endpoints.

use crate::node::Node;
use crate::replication::anti_entropy::answer_sync;
use crate::replication::protocol::{
    ConfigAck, ConfigAnnouncement, EntryResponse, ReplicateRequest, ReplicateResponse,
    SyncRequest, SyncResponse,
};

use axum::{
    Json,
    extract::{Extension, Path},
};
use std::sync::Arc;

pub async fn handle_replicate(
    Extension(node): Extension<Arc<Node>>,
    Json(req): Json<ReplicateRequest>,
) -> Json<ReplicateResponse> {
    let received = req.entries.len();
    let applied = req
        .entries
        .into_iter()
        .filter(|item| node.store.apply(&item.key, item.entry.clone()))
        .count();
    tracing::debug!("Applied {}/{} replicated entries", applied, received);
    Json(ReplicateResponse { applied })
}

pub async fn handle_config(
    Extension(node): Extension<Arc<Node>>,
    Json(req): Json<ConfigAnnouncement>,
) -> Json<ConfigAck> {
    let adopted = node.membership.adopt(&req.config);
    Json(ConfigAck { adopted })
}

pub async fn handle_sync(
    Extension(node): Extension<Arc<Node>>,
    Json(req): Json<SyncRequest>,
) -> Json<SyncResponse> {
    Json(answer_sync(&node.store, &node.membership, req))
}

pub async fn handle_entry(
    Extension(node): Extension<Arc<Node>>,
    Path(key): Path<String>,
) -> Json<EntryResponse> {
    Json(EntryResponse {
        entry: node.store.get_entry(&key),
    })
}
