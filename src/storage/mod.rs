//! Storage Module
//!
//! Implements the sharded, replicated, causally consistent key-value store.
//!
//! ## Core Concepts
//! - **Local Store**: `LocalStore` keeps each key's latest version and vector clock in memory.
//! - **Partitioning**: `partitioner` maps a key to a shard from nothing but the key and the shard count.
//! - **Service**: `KeyValueService` enforces causal reads, repairs missing dependencies from shard
//!   peers and hands every accepted write to the replication engine.

pub mod memory;
pub mod partitioner;
pub mod service;
pub mod types;
