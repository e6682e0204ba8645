//! Analytics Reporting MCP Server
//!
//! Runs Google Analytics Reporting API queries and returns typed tables over the Model Context Protocol.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

use ga_report_mcp::api::ReportClient;
use ga_report_mcp::auth::OAuth2Client;
use ga_report_mcp::config::Config;
use ga_report_mcp::debug::DebugLogger;
use ga_report_mcp::reporting::AnalyticsReportingClient;
use ga_report_mcp::server::AnalyticsReportServer;

#[derive(Parser, Debug)]
#[command(name = "ga-report-mcp")]
#[command(author, version, about = "Analytics Reporting MCP Server", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Enable debug mode (logs all tool calls)
    #[arg(short, long)]
    debug: bool,
}

/// Log to stderr; stdout carries the MCP transport.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;
    let debug_enabled = args.debug || config.debug;

    init_tracing(debug_enabled);

    let debug = Arc::new(DebugLogger::new(debug_enabled));

    let mode = if config.uses_static_token() {
        "static-token"
    } else {
        "oauth2"
    };
    tracing::info!(
        config = %args.config,
        mode,
        base_url = %config.api_base_url,
        "Analytics Reporting MCP Server starting"
    );
    if let Some(path) = debug.trace_path() {
        tracing::info!(path = %path.display(), "Trace file");
    }

    let timeout = config.timeout();
    let base_url = config.api_base_url.clone();
    let auth_client = OAuth2Client::new(config)?;
    let session = AnalyticsReportingClient::new(base_url, auth_client, timeout)?;
    let client = ReportClient::new(Arc::new(session));

    let server = AnalyticsReportServer::new(client, debug.clone());

    debug.log("Starting MCP server on stdio transport...");

    let service = server.serve(stdio()).await?;

    debug.log("MCP server started, waiting for messages...");

    service.waiting().await?;

    debug.log("MCP server shutting down");

    Ok(())
}
