//! verity server entry point.
//!
//! Loads configuration, builds the analysis pipeline and serves it over the
//! configured transport: HTTP (axum) or MCP on stdio. Logging goes to stderr
//! so it never interferes with JSON-RPC on stdout.

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use verity_core::{AppConfig, Transport};

mod error;
mod handler;
mod http;
mod pipeline;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let transport = config.transport;
    let addr = config.socket_addr()?;

    let pipeline = Arc::new(pipeline::AnalysisPipeline::from_config(config).await?);
    let sweepers = pipeline.spawn_sweepers();

    match transport {
        Transport::Http => {
            tracing::info!("Starting verity on HTTP transport");
            http::serve(pipeline, addr).await?;
        }
        Transport::Stdio => {
            tracing::info!("Starting verity on stdio transport");
            let handler = handler::VerityServer::new(pipeline);
            let server = serve_server(handler, stdio()).await?;
            server.waiting().await?;
        }
    }

    for sweeper in sweepers {
        sweeper.abort();
    }
    tracing::info!("verity stopped");

    Ok(())
}
