//! Node configuration.
//!
//! Every option can be given as a flag or through the environment, which is how
//! containers of a cluster are usually launched (`IP_PORT`, `VIEW`, `S`).

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_GOSSIP_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_GOSSIP_FANOUT: usize = 2;
pub const DEFAULT_PEER_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_REPLICATION_ATTEMPTS: usize = 3;
pub const DEFAULT_REPLICATION_QUEUE: usize = 1024;

#[derive(Parser, Debug, Clone)]
#[command(name = "causal-kvs", about = "Causally consistent sharded key-value node")]
pub struct Config {
    /// This node's cluster address (host:port); also its identity.
    #[arg(long, env = "IP_PORT")]
    pub ip_port: String,

    /// Comma-separated initial view. Defaults to just this node.
    #[arg(long, env = "VIEW")]
    pub view: Option<String>,

    /// Initial number of shards.
    #[arg(long = "shards", env = "S", default_value_t = 1)]
    pub shards: usize,

    /// Listen address. Defaults to 0.0.0.0 on the port of `ip_port`.
    #[arg(long, env = "BIND_ADDR")]
    pub bind: Option<SocketAddr>,

    #[arg(long, env = "GOSSIP_INTERVAL_MS", default_value_t = DEFAULT_GOSSIP_INTERVAL_MS)]
    pub gossip_interval_ms: u64,

    #[arg(long, env = "GOSSIP_FANOUT", default_value_t = DEFAULT_GOSSIP_FANOUT)]
    pub gossip_fanout: usize,

    #[arg(long, env = "PEER_TIMEOUT_MS", default_value_t = DEFAULT_PEER_TIMEOUT_MS)]
    pub peer_timeout_ms: u64,

    #[arg(long, env = "REPLICATION_ATTEMPTS", default_value_t = DEFAULT_REPLICATION_ATTEMPTS)]
    pub replication_attempts: usize,

    #[arg(long, env = "REPLICATION_QUEUE", default_value_t = DEFAULT_REPLICATION_QUEUE)]
    pub replication_queue: usize,
}

impl Config {
    /// Builds a configuration programmatically, with every tuning knob at its default.
    pub fn new(ip_port: impl Into<String>, view: &[String], shards: usize) -> Self {
        Self {
            ip_port: ip_port.into(),
            view: Some(view.join(",")),
            shards,
            bind: None,
            gossip_interval_ms: DEFAULT_GOSSIP_INTERVAL_MS,
            gossip_fanout: DEFAULT_GOSSIP_FANOUT,
            peer_timeout_ms: DEFAULT_PEER_TIMEOUT_MS,
            replication_attempts: DEFAULT_REPLICATION_ATTEMPTS,
            replication_queue: DEFAULT_REPLICATION_QUEUE,
        }
    }

    /// The initial view as a list of addresses.
    pub fn initial_view(&self) -> Vec<String> {
        match &self.view {
            Some(raw) => parse_view(raw),
            None => vec![self.ip_port.clone()],
        }
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        if let Some(addr) = self.bind {
            return Ok(addr);
        }
        let port = self
            .ip_port
            .rsplit_once(':')
            .map(|(_, port)| port)
            .ok_or_else(|| anyhow::anyhow!("IP_PORT must look like host:port, got {}", self.ip_port))?
            .parse::<u16>()?;
        Ok(SocketAddr::from(([0, 0, 0, 0], port)))
    }

    pub fn gossip_interval(&self) -> Duration {
        Duration::from_millis(self.gossip_interval_ms.max(1))
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms.max(1))
    }
}

pub fn parse_view(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env_style_arguments() {
        let config = Config::parse_from([
            "causal-kvs",
            "--ip-port",
            "10.0.0.2:8080",
            "--view",
            "10.0.0.2:8080, 10.0.0.3:8080,",
            "--shards",
            "2",
        ]);

        assert_eq!(config.shards, 2);
        assert_eq!(
            config.initial_view(),
            vec!["10.0.0.2:8080".to_string(), "10.0.0.3:8080".to_string()]
        );
        assert_eq!(config.bind_addr().unwrap(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.gossip_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_view_defaults_to_self() {
        let config = Config::parse_from(["causal-kvs", "--ip-port", "127.0.0.1:9000"]);
        assert_eq!(config.initial_view(), vec!["127.0.0.1:9000".to_string()]);
        assert_eq!(config.shards, 1);
    }

    #[test]
    fn test_bind_addr_requires_port() {
        let mut config = Config::new("localhost", &[], 1);
        config.view = None;
        assert!(config.bind_addr().is_err());
    }
}
