//! Causally Consistent Sharded Key-Value Store
//!
//! This library crate defines the modules that make up one node of the cluster.
//! The binary (`main.rs`) only parses configuration and serves a `node::Node`.
//!
//! ## Architecture Modules
//!
//! - **`causal`**: Vector clocks and the per-key causal context carried by clients as `payload`.
//! - **`storage`**: The in-memory store of versioned entries, key hashing, and the
//!   `KeyValueService` that enforces causal reads and writes.
//! - **`membership`**: The cluster view and shard count as epoch-stamped snapshots, and
//!   the shard layout derived from them.
//! - **`replication`**: Write propagation, key migration on topology changes, and
//!   anti-entropy gossip between nodes.
//! - **`gateway`**: The external HTTP API and the internal node-to-node endpoints.

pub mod causal;
pub mod config;
pub mod error;
pub mod gateway;
pub mod membership;
pub mod node;
pub mod replication;
pub mod storage;
