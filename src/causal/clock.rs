use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relation between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrdering {
    Equal,
    /// The left clock happened before the right one.
    Before,
    /// The left clock happened after the right one.
    After,
    Concurrent,
}

/// A vector clock keyed by node address.
///
/// Missing entries count as zero, so the empty clock is the bottom element and
/// `merge` is a join: associative, commutative and idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: &str) -> u64 {
        self.0.get(node).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|&counter| counter == 0)
    }

    /// Advances the counter of `node` and returns its new value.
    pub fn increment(&mut self, node: &str) -> u64 {
        let counter = self.0.entry(node.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Pointwise maximum with `other`.
    pub fn merge(&mut self, other: &VectorClock) {
        for (node, &counter) in &other.0 {
            let entry = self.0.entry(node.clone()).or_insert(0);
            if counter > *entry {
                *entry = counter;
            }
        }
    }

    pub fn merged(&self, other: &VectorClock) -> VectorClock {
        let mut joined = self.clone();
        joined.merge(other);
        joined
    }

    /// True when every counter in `other` is covered by this clock.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other
            .0
            .iter()
            .all(|(node, &counter)| self.get(node) >= counter)
    }

    pub fn compare(&self, other: &VectorClock) -> CausalOrdering {
        match (self.dominates(other), other.dominates(self)) {
            (true, true) => CausalOrdering::Equal,
            (true, false) => CausalOrdering::After,
            (false, true) => CausalOrdering::Before,
            (false, false) => CausalOrdering::Concurrent,
        }
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(node, counter)| (node.into(), counter)).collect())
    }
}
