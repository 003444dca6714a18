use crate::causal::clock::{CausalOrdering, VectorClock};
use serde::{Deserialize, Serialize};

/// One version of a key as stored and replicated.
///
/// `value == None` is a tombstone left behind by a delete, so the deletion
/// replicates like any other write and cannot be undone by anti-entropy.
/// Tombstones are never garbage-collected: they stay in the store and in
/// sync digests for the lifetime of the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub value: Option<String>,
    pub clock: VectorClock,
    /// Wall-clock time (ms) at the accepting node; only breaks ties between concurrent writes.
    pub timestamp: u64,
    /// Address of the node that accepted the write.
    pub writer: String,
}

impl Entry {
    pub fn is_live(&self) -> bool {
        self.value.is_some()
    }

    /// Whether this version should replace `other` in a replica.
    ///
    /// Causally newer versions always win. Concurrent versions are ordered by
    /// `(timestamp, writer, value)` so every replica picks the same winner.
    pub fn supersedes(&self, other: &Entry) -> bool {
        match self.clock.compare(&other.clock) {
            CausalOrdering::After => true,
            CausalOrdering::Before | CausalOrdering::Equal => false,
            CausalOrdering::Concurrent => {
                (self.timestamp, &self.writer, &self.value)
                    > (other.timestamp, &other.writer, &other.value)
            }
        }
    }
}

/// Result of a local write or delete.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Whether a live value existed before the operation.
    pub existed: bool,
    /// The entry now stored (or the merged clock, for a no-op delete).
    pub entry: Entry,
    /// False when nothing was written (deleting a missing key).
    pub changed: bool,
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
