//! Replication Network Protocol
//!
//! Endpoints and DTOs exchanged between nodes. Everything travels as JSON over HTTP.

use crate::causal::clock::VectorClock;
use crate::membership::types::ClusterConfig;
use crate::storage::types::Entry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- API Endpoints ---

/// Pushes versions of keys to a replica.
pub const ENDPOINT_REPLICATE: &str = "/internal/replicate";
/// Announces a new cluster configuration.
pub const ENDPOINT_CONFIG: &str = "/internal/config";
/// Anti-entropy digest exchange.
pub const ENDPOINT_SYNC: &str = "/internal/sync";
/// Direct read of one stored version (tombstones included), bypassing routing.
pub const ENDPOINT_ENTRY: &str = "/internal/entry";

/// Set on client requests relayed to the owning shard. Such requests are never relayed again.
pub const FORWARDED_HEADER: &str = "x-kvs-forwarded";

// --- Data Transfer Objects ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub key: String,
    pub entry: Entry,
}

impl From<(String, Entry)> for KeyEntry {
    fn from((key, entry): (String, Entry)) -> Self {
        Self { key, entry }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub entries: Vec<KeyEntry>,
}

/// Acknowledgment for a replicate batch.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicateResponse {
    /// Number of entries that changed the receiver's state.
    pub applied: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigAnnouncement {
    pub config: ClusterConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigAck {
    pub adopted: bool,
}

/// Anti-entropy request: who is asking, what configuration they hold and a
/// key -> clock summary of everything they store.
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncRequest {
    pub from: String,
    pub config: ClusterConfig,
    pub digest: BTreeMap<String, VectorClock>,
}

/// The responder's configuration plus the entries the requester is missing.
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub config: ClusterConfig,
    pub entries: Vec<KeyEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntryResponse {
    pub entry: Option<Entry>,
}
