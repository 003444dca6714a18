//! Membership & Sharding Module
//!
//! Maintains the cluster view (the set of live node addresses) and the shard
//! layout derived from it.
//!
//! ## Core Mechanisms
//! - **Configuration Snapshots**: View and shard count live together in an immutable,
//!   epoch-stamped `ClusterConfig`; changes swap in a new snapshot.
//! - **Deterministic Layout**: The sorted view is dealt round-robin into shards, so every
//!   node holding the same snapshot computes the same layout.
//! - **Convergence**: Snapshots are totally ordered by `(epoch, origin)`; nodes adopt any
//!   newer snapshot they hear about through announcements or anti-entropy gossip.

pub mod service;
pub mod types;
