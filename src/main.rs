//! MCP Fetch Server
//!
//! Exposes HTTP fetch tools to MCP clients over streamable HTTP or stdio.

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mcp_fetch_server::config::{Args, Config, LogFormat, Transport};
use mcp_fetch_server::error::{Error, Result};
use mcp_fetch_server::mcp::server::McpServer;
use mcp_fetch_server::mcp::transport::StdioTransport;
use mcp_fetch_server::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Build configuration from args
    let config: Config = args.into();
    init_logging(&config)?;

    info!("MCP Fetch Server v{}", VERSION);
    info!("Transport: {:?}", config.transport);

    let server = Arc::new(McpServer::from_config(&config));
    info!("Registered {} MCP tools", server.registry().tool_count());

    match config.transport {
        Transport::Stdio => {
            info!("Starting stdio transport...");
            server.run(StdioTransport::new()).await?;
        }
        Transport::Http => {
            info!("Starting HTTP transport on port {}...", config.port);
            mcp_fetch_server::http::start_server(&config, server).await?;
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays reserved for the stdio transport.
fn init_logging(config: &Config) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            Error::Config(format!("invalid log level '{}': {}", config.log_level, e))
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| Error::Config(format!("failed to install tracing subscriber: {}", e)))
}
