//! The client-visible causal payload.
//!
//! On the wire the payload is an opaque string. Internally it is a JSON object
//! `{ "<key>": { "<node>": <counter> } }`; the server never interprets it beyond
//! merge and dominance.

use super::clock::VectorClock;
use crate::error::KvsError;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CausalContext(BTreeMap<String, VectorClock>);

impl CausalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The newest version of `key` the client has observed (bottom if none).
    pub fn dependency(&self, key: &str) -> VectorClock {
        self.0.get(key).cloned().unwrap_or_default()
    }

    /// Records that the client has now observed `clock` for `key`.
    pub fn observe(&mut self, key: &str, clock: &VectorClock) {
        if clock.is_empty() {
            return;
        }
        self.0
            .entry(key.to_string())
            .or_default()
            .merge(clock);
    }

    pub fn merge(&mut self, other: &CausalContext) {
        for (key, clock) in &other.0 {
            self.observe(key, clock);
        }
    }

    pub fn dominates(&self, other: &CausalContext) -> bool {
        other
            .0
            .iter()
            .all(|(key, clock)| self.dependency(key).dominates(clock))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(VectorClock::is_empty)
    }

    /// Decodes a payload as sent by a client.
    ///
    /// Accepts the empty string, `null`, `{}`, the JSON object itself, or that
    /// object wrapped once more as a JSON string.
    pub fn from_wire(raw: &str) -> Result<Self, KvsError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }

        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| KvsError::InvalidPayload(e.to_string()))?;

        match value {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::String(inner) => {
                let inner = inner.trim();
                if inner.is_empty() {
                    return Ok(Self::default());
                }
                serde_json::from_str(inner).map_err(|e| KvsError::InvalidPayload(e.to_string()))
            }
            other @ serde_json::Value::Object(_) => {
                serde_json::from_value(other).map_err(|e| KvsError::InvalidPayload(e.to_string()))
            }
            other => Err(KvsError::InvalidPayload(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
