//! # prometheus-mcp
//!
//! MCP (Model Context Protocol) server for Prometheus.
//!
//! This crate exposes a Prometheus server as MCP tools for AI agents. Query
//! results are rewritten for LLM consumption: sample timestamps become
//! ISO 8601 UTC strings and query results carry a link into the Prometheus UI.
//!
//! ## Features
//!
//! - **6 tools**: `execute_query`, `execute_range_query`, `list_metrics`,
//!   `get_metric_metadata`, `get_targets`, `health_check`
//! - **Three transports**: JSON-RPC over stdio, streamable HTTP, and SSE
//! - **Auth**: basic or bearer credentials, optional `X-Scope-OrgID` tenant header
//! - **Progress**: `notifications/progress` for range queries and metric listing
//! - **Structured errors**: every failed tool call returns a `{kind, message}` value
//!
//! ## Usage
//!
//! The server is typically run as an executable and configured in AI tools like Claude Desktop:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "prometheus": {
//!       "command": "/path/to/prometheus-mcp",
//!       "env": { "PROMETHEUS_URL": "http://localhost:9090" }
//!     }
//!   }
//! }
//! ```
//!
//! ## Library Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use prometheus_mcp::{Config, McpServer, PrometheusClient, ToolRegistry};
//!
//! # async fn run() -> prometheus_mcp::Result<()> {
//! let config = Config::new("http://localhost:9090")?;
//! let client = PrometheusClient::new(&config)?;
//! let registry = ToolRegistry::new(Arc::new(client), &config);
//! let server = McpServer::new(Arc::new(registry));
//!
//! // Reads from stdin, writes to stdout
//! server.run_stdio().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod http;
mod links;
mod normalize;
mod progress;
mod server;
mod timeparse;
mod tools;

pub use client::{Backend, PrometheusClient, ORG_ID_HEADER};
pub use config::{Args, Auth, Config, TransportMode};
pub use error::{ErrorKind, McpError, Result, ToolError};
pub use http::{router, serve};
pub use links::{LinkAnnotator, LinkWindow};
pub use normalize::{epoch_to_iso, normalize, Shape};
pub use progress::{Outbox, Progress, PROGRESS_TOTAL};
pub use server::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpServer, ServerMessage};
pub use tools::{Outcome, ServerInfo, Stage, ToolDef, ToolRegistry, ToolRequest, TOOL_NAMES};
pub use timeparse::{Step, TimeArg};
pub use tools::query::{InstantQuery, RangeQuery};
