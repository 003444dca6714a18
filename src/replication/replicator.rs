use super::client::PeerClient;
use super::protocol::KeyEntry;
use crate::storage::types::Entry;

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Upper bound of entries shipped in one replicate request.
const MAX_BATCH: usize = 64;

/// Fire-and-forget propagation of writes to replicas.
///
/// Each destination gets its own bounded queue drained by a dedicated worker
/// task. Enqueueing never waits: when a queue is full the delivery is dropped
/// and left to anti-entropy.
pub struct Replicator {
    client: Arc<PeerClient>,
    queues: DashMap<String, mpsc::Sender<KeyEntry>>,
    capacity: usize,
}

impl Replicator {
    pub fn new(client: Arc<PeerClient>, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            client,
            queues: DashMap::new(),
            capacity: capacity.max(1),
        })
    }

    /// Queues `entry` for every destination. Returns immediately.
    pub fn propagate(&self, destinations: &[String], key: &str, entry: &Entry) {
        for destination in destinations {
            let item = KeyEntry {
                key: key.to_string(),
                entry: entry.clone(),
            };
            match self.sender(destination).try_send(item) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(item)) => {
                    tracing::warn!(
                        "Replication queue to {} is full, dropping {}",
                        destination,
                        item.key
                    );
                }
                Err(mpsc::error::TrySendError::Closed(item)) => {
                    // Worker is gone; start a fresh one and try once more.
                    self.queues.remove(destination);
                    if self.sender(destination).try_send(item).is_err() {
                        tracing::warn!("Dropping replication to {}", destination);
                    }
                }
            }
        }
    }

    fn sender(&self, destination: &str) -> mpsc::Sender<KeyEntry> {
        self.queues
            .entry(destination.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.capacity);
                tokio::spawn(delivery_worker(
                    self.client.clone(),
                    destination.to_string(),
                    rx,
                ));
                tx
            })
            .clone()
    }

    /// Stops the workers of destinations that left the view.
    pub fn retain_destinations(&self, view: &BTreeSet<String>) {
        self.queues.retain(|destination, _| view.contains(destination));
    }

    pub fn destinations(&self) -> usize {
        self.queues.len()
    }
}

async fn delivery_worker(
    client: Arc<PeerClient>,
    destination: String,
    mut rx: mpsc::Receiver<KeyEntry>,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while batch.len() < MAX_BATCH {
            match rx.try_recv() {
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }

        let count = batch.len();
        match client.replicate(&destination, batch).await {
            Ok(applied) => {
                tracing::debug!(
                    "Replicated {} entries to {} ({} applied)",
                    count,
                    destination,
                    applied
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Dropped {} entries for {}: {}",
                    count,
                    destination,
                    e
                );
            }
        }
    }
    tracing::debug!("Replication worker for {} stopped", destination);
}
