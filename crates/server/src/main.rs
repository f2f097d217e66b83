//! tilesync server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tilesync_client::OfflineCache;
use tilesync_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod jobs;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let cache = OfflineCache::from_config(&config)
        .await
        .context("opening tile cache")?;

    tracing::info!("Starting tilesync server on stdio transport");

    let cache = Arc::new(cache);
    let handler = handler::McpTileServer::new(cache.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    cache.close().await.context("closing tile cache")?;
    tracing::info!("tilesync server stopped");

    Ok(())
}
