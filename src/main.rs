use causal_kvs::config::Config;
use causal_kvs::node::{Node, serve};

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    let bind_addr = config.bind_addr()?;

    tracing::info!("Starting node {} on {}", config.ip_port, bind_addr);
    tracing::info!(
        "Initial view: {:?}, {} shard(s)",
        config.initial_view(),
        config.shards
    );

    let node = Node::new(config);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("HTTP server listening on {}", bind_addr);

    serve(node, listener).await
}
