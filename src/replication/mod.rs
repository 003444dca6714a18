//! Replication Module
//!
//! Moves versions of keys between nodes. Nothing in here blocks a client response.
//!
//! ## Core Mechanisms
//! - **Propagation**: Every accepted write is queued for the other members of its shard.
//!   Each destination has its own bounded worker queue, so a slow or partitioned replica
//!   only delays (or drops) deliveries addressed to itself.
//! - **Rebalancing**: When the cluster configuration changes, keys whose owning shard
//!   changed are pushed to their new owners and dropped locally once acknowledged.
//! - **Anti-Entropy**: A periodic digest exchange repairs anything propagation dropped,
//!   and carries the cluster configuration so views converge after a partition heals.

pub mod anti_entropy;
pub mod client;
pub mod migration;
pub mod protocol;
pub mod replicator;

#[cfg(test)]
mod tests;
