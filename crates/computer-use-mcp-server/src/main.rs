//! computer-use-mcp: desktop automation MCP server over stdio

use anyhow::Result;
use computer_use_mcp_server::mcp::ComputerUseMcpServer;
use rmcp::{ServiceExt, transport::stdio};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_LOG_FILTER: &str = "computer_use_mcp_server=info,computer_use_core=info";

/// Logs go to stderr; stdout carries the JSON-RPC stream
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false);

    if std::env::var("COMPUTER_USE_LOG_JSON").is_ok_and(|v| v == "1") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("computer-use-mcp server starting...");
    info!("Transport: stdio");

    let server = ComputerUseMcpServer::system();
    let handle = server.clone();
    let service = server.serve(stdio()).await?;

    info!("Server info: {:?}", service.peer_info());
    info!("Waiting for MCP requests...");

    service.waiting().await?;

    let report = handle.dispatcher().context().displays().cleanup_all().await;
    if report.stopped_servers > 0 {
        info!("Stopped {} X server(s)", report.stopped_servers);
    }

    info!("computer-use-mcp server shutting down");
    Ok(())
}
