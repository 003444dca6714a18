//! HTTP API Gateway
//!
//! Marshals the external key-value, view and shard API onto the node's services,
//! and exposes the internal endpoints other nodes call.
//!
//! ## Request Flow
//! A key request is first routed: if the key's shard does not include this node it is
//! relayed to the shard's members. Otherwise fields are extracted from the body or query
//! string, the `payload` is decoded into a causal context, the operation runs, and the
//! merged context goes back to the client in every key-value response, errors included.

pub mod forward;
pub mod handlers;
pub mod internal;
pub mod params;
pub mod protocol;
