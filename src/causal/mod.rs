//! Causal Context Module
//!
//! Tracks the happens-before relation between writes so that no client ever
//! observes a value older than one it has already seen.
//!
//! ## Core Concepts
//! - **Vector Clock**: Each key carries a map of `node -> counter`. A node bumps its own
//!   counter every time it accepts a write for that key.
//! - **Causal Context**: The opaque `payload` exchanged with clients. It maps every key the
//!   client has touched to the clock of the newest version the client has observed.
//! - **Dominance**: A node may serve a read only when its local clock for the key dominates
//!   the clock the client presents for that key.

pub mod clock;
pub mod context;
