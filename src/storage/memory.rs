//! Per-node key-value state.
//!
//! Every operation on a key runs under that key's `DashMap` shard lock, which makes
//! put, delete and the causal merge atomic with respect to concurrent requests for
//! the same key.

use super::types::{Entry, WriteOutcome, now_ms};
use crate::causal::clock::VectorClock;
use crate::error::KvsError;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as Slot;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct LocalStore {
    entries: DashMap<String, Entry>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `value`, merging the client's dependency into the key's clock and
    /// advancing `writer`'s counter.
    pub fn put(&self, key: &str, value: String, dependency: &VectorClock, writer: &str) -> WriteOutcome {
        self.write(key, Some(value), dependency, writer)
    }

    /// Replaces a live value by a tombstone. Deleting a missing key changes nothing.
    pub fn delete(&self, key: &str, dependency: &VectorClock, writer: &str) -> WriteOutcome {
        self.write(key, None, dependency, writer)
    }

    fn write(
        &self,
        key: &str,
        value: Option<String>,
        dependency: &VectorClock,
        writer: &str,
    ) -> WriteOutcome {
        let deleting = value.is_none();

        match self.entries.entry(key.to_string()) {
            Slot::Occupied(mut slot) => {
                let current = slot.get_mut();
                let existed = current.is_live();

                if deleting && !existed {
                    let mut entry = current.clone();
                    entry.clock.merge(dependency);
                    return WriteOutcome {
                        existed,
                        changed: false,
                        entry,
                    };
                }

                current.clock.merge(dependency);
                current.clock.increment(writer);
                // Keep timestamps monotonic per key even if the wall clock steps back.
                current.timestamp = now_ms().max(current.timestamp + 1);
                current.writer = writer.to_string();
                current.value = value;

                WriteOutcome {
                    existed,
                    changed: true,
                    entry: current.clone(),
                }
            }
            Slot::Vacant(slot) => {
                if deleting {
                    return WriteOutcome {
                        existed: false,
                        changed: false,
                        entry: Entry {
                            value: None,
                            clock: dependency.clone(),
                            timestamp: now_ms(),
                            writer: writer.to_string(),
                        },
                    };
                }

                let mut clock = dependency.clone();
                clock.increment(writer);
                let entry = Entry {
                    value,
                    clock,
                    timestamp: now_ms(),
                    writer: writer.to_string(),
                };
                slot.insert(entry.clone());

                WriteOutcome {
                    existed: false,
                    changed: true,
                    entry,
                }
            }
        }
    }

    /// True when the local version of `key` already reflects `dependency`.
    pub fn covers(&self, key: &str, dependency: &VectorClock) -> bool {
        if dependency.is_empty() {
            return true;
        }
        self.entries
            .get(key)
            .map(|entry| entry.clock.dominates(dependency))
            .unwrap_or(false)
    }

    /// Causally safe read of a live value.
    pub fn read(&self, key: &str, dependency: &VectorClock) -> Result<Entry, KvsError> {
        if !self.covers(key, dependency) {
            return Err(KvsError::CausalNotSatisfied {
                key: key.to_string(),
            });
        }
        match self.entries.get(key) {
            Some(entry) if entry.is_live() => Ok(entry.clone()),
            _ => Err(KvsError::KeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Raw access, tombstones included.
    pub fn get_entry(&self, key: &str) -> Option<Entry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn clock_of(&self, key: &str) -> Option<VectorClock> {
        self.entries.get(key).map(|entry| entry.clock.clone())
    }

    /// Merges a version received from another node. Returns true if local state changed.
    pub fn apply(&self, key: &str, incoming: Entry) -> bool {
        match self.entries.entry(key.to_string()) {
            Slot::Occupied(mut slot) => {
                let current = slot.get_mut();
                if incoming.supersedes(current) {
                    let mut winner = incoming;
                    winner.clock.merge(&current.clock);
                    *current = winner;
                    true
                } else if !current.clock.dominates(&incoming.clock) {
                    // Concurrent loser: keep our value but remember the history we saw.
                    current.clock.merge(&incoming.clock);
                    true
                } else {
                    false
                }
            }
            Slot::Vacant(slot) => {
                slot.insert(incoming);
                true
            }
        }
    }

    /// Drops `key` unless it was rewritten after `clock` was read.
    pub fn evict_if_unchanged(&self, key: &str, clock: &VectorClock) -> bool {
        self.entries
            .remove_if(key, |_, entry| entry.clock == *clock)
            .is_some()
    }

    pub fn snapshot(&self) -> Vec<(String, Entry)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Entries matching `filter`.
    pub fn snapshot_where<F>(&self, filter: F) -> Vec<(String, Entry)>
    where
        F: Fn(&str) -> bool,
    {
        self.entries
            .iter()
            .filter(|entry| filter(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Key -> clock summary used by anti-entropy.
    pub fn digest(&self) -> BTreeMap<String, VectorClock> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clock.clone()))
            .collect()
    }

    /// Entries the holder of `digest` has not fully seen, restricted to keys accepted by `filter`.
    pub fn missing_from<F>(&self, digest: &BTreeMap<String, VectorClock>, filter: F) -> Vec<(String, Entry)>
    where
        F: Fn(&str) -> bool,
    {
        self.entries
            .iter()
            .filter(|entry| filter(entry.key()))
            .filter(|entry| {
                digest
                    .get(entry.key())
                    .map(|theirs| !theirs.dominates(&entry.value().clock))
                    .unwrap_or(true)
            })
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of live keys accepted by `filter`.
    pub fn live_count<F>(&self, filter: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_live() && filter(entry.key()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
