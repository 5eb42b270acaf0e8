//! MCP server for Prometheus.
//!
//! Run with `PROMETHEUS_URL=http://localhost:9090 prometheus-mcp`, optionally
//! `--transport http|sse` to listen on the network instead of stdio.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use prometheus_mcp::{Args, Config, McpServer, PrometheusClient, ToolRegistry, TransportMode};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // Logs go to stderr; stdout belongs to the stdio transport
    let default_directive = if args.verbose {
        "prometheus_mcp=debug"
    } else {
        "prometheus_mcp=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let client = match PrometheusClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        prometheus_url = %config.prometheus_url,
        transport = %config.transport,
        auth = ?config.auth,
        links = !config.disable_links,
        "starting prometheus-mcp"
    );

    // Create registry and server
    let registry = ToolRegistry::new(Arc::new(client), &config);
    let server = McpServer::new(Arc::new(registry));

    // Run the server
    let result = match config.transport {
        TransportMode::Stdio => server.run_stdio().await,
        mode => prometheus_mcp::serve(server, mode, &config.bind_host, config.bind_port).await,
    };

    if let Err(e) = result {
        eprintln!("Error: Server error: {}", e);
        std::process::exit(1);
    }
}
