//! HTTP client for node-to-node traffic.
//!
//! All peer calls go through two retrying primitives with exponential backoff and
//! jitter. Callers decide how many attempts an operation deserves: replica
//! deliveries retry, interactive paths (read repair, forwarding) try once.

use super::protocol::*;
use crate::membership::types::ClusterConfig;
use crate::storage::types::Entry;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, header};
use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Relayed answer of another node.
#[derive(Debug)]
pub struct PeerReply {
    pub status: u16,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

pub struct PeerClient {
    http_client: reqwest::Client,
    timeout: Duration,
    attempts: usize,
}

impl PeerClient {
    pub fn new(timeout: Duration, attempts: usize) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            timeout,
            attempts: attempts.max(1),
        }
    }

    fn url(addr: &str, endpoint: &str) -> Result<Url> {
        Url::parse(&format!("http://{}{}", addr, endpoint))
            .with_context(|| format!("Invalid peer address {}", addr))
    }

    async fn post_with_retry<T: Serialize>(
        &self,
        url: Url,
        payload: &T,
        attempts: usize,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }

    async fn get_with_retry(&self, url: Url, attempts: usize) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self
                .http_client
                .get(url.clone())
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<R> {
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("{} failed: {}", what, response.status()));
        }
        Ok(response.json::<R>().await?)
    }

    /// Delivers a batch of versions. Returns how many changed the receiver.
    pub async fn replicate(&self, addr: &str, entries: Vec<KeyEntry>) -> Result<usize> {
        let url = Self::url(addr, ENDPOINT_REPLICATE)?;
        let response = self
            .post_with_retry(url, &ReplicateRequest { entries }, self.attempts)
            .await?;
        let ack: ReplicateResponse = Self::decode(response, "Replication").await?;
        Ok(ack.applied)
    }

    pub async fn announce(&self, addr: &str, config: &ClusterConfig) -> Result<bool> {
        let url = Self::url(addr, ENDPOINT_CONFIG)?;
        let announcement = ConfigAnnouncement {
            config: config.clone(),
        };
        let response = self
            .post_with_retry(url, &announcement, self.attempts)
            .await?;
        let ack: ConfigAck = Self::decode(response, "Config announcement").await?;
        Ok(ack.adopted)
    }

    pub async fn sync(&self, addr: &str, request: &SyncRequest) -> Result<SyncResponse> {
        let url = Self::url(addr, ENDPOINT_SYNC)?;
        let response = self.post_with_retry(url, request, 1).await?;
        Self::decode(response, "Sync").await
    }

    /// Reads the stored version of `key` on `addr`, tombstones included.
    pub async fn fetch_entry(&self, addr: &str, key: &str) -> Result<Option<Entry>> {
        let mut url = Self::url(addr, ENDPOINT_ENTRY)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Invalid peer address {}", addr))?
            .push(key);
        let response = self.get_with_retry(url, 1).await?;
        let reply: EntryResponse = Self::decode(response, "Entry fetch").await?;
        Ok(reply.entry)
    }

    /// Relays a client request verbatim and hands back whatever the peer answered.
    pub async fn forward(
        &self,
        addr: &str,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<PeerReply> {
        let url = Self::url(addr, path_and_query)?;
        let mut request = self
            .http_client
            .request(method, url)
            .header(FORWARDED_HEADER, "1")
            .timeout(self.timeout)
            .body(body);
        if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
            request = request.header(header::CONTENT_TYPE, content_type.clone());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response.bytes().await?;

        Ok(PeerReply {
            status,
            content_type,
            body,
        })
    }
}
