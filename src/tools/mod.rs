//! Tool registry and dispatch.
//!
//! Provides the infrastructure for registering MCP tools and running each
//! invocation through validate -> execute -> normalize -> annotate.

pub mod discovery;
pub mod health;
pub mod pipeline;
pub mod query;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::client::Backend;
use crate::config::Config;
use crate::error::{McpError, Result};
use crate::links::LinkAnnotator;
use crate::progress::Progress;

pub use health::ServerInfo;
pub use pipeline::{Outcome, Stage, ToolRequest};

/// Names of every tool this server knows about.
pub const TOOL_NAMES: &[&str] = &[
    query::EXECUTE_QUERY,
    query::EXECUTE_RANGE_QUERY,
    discovery::LIST_METRICS,
    discovery::GET_METRIC_METADATA,
    discovery::GET_TARGETS,
    health::HEALTH_CHECK,
];

/// A tool definition for the MCP tools/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool name (e.g., "execute_query")
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for the input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonValue,
}

impl ToolDef {
    /// Create a new tool definition.
    pub fn new(name: &str, description: &str, input_schema: JsonValue) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// Registry of enabled tools plus everything needed to run them.
///
/// Immutable after construction; share it behind an `Arc`.
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
    enabled: BTreeSet<String>,
    backend: Arc<dyn Backend>,
    annotator: LinkAnnotator,
    info: ServerInfo,
}

impl ToolRegistry {
    /// Create a registry exposing the tools `config` enables.
    pub fn new(backend: Arc<dyn Backend>, config: &Config) -> Self {
        let mut tools = Vec::new();

        // Register all tool categories
        tools.extend(query::tools());
        tools.extend(discovery::tools());
        tools.extend(health::tools());

        tools.retain(|t| config.tool_enabled(&t.name));
        let enabled = tools.iter().map(|t| t.name.clone()).collect();

        Self {
            tools,
            enabled,
            backend,
            annotator: LinkAnnotator::from_config(config),
            info: ServerInfo::from_config(config),
        }
    }

    /// Get all enabled tool definitions.
    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    /// Whether `name` can be called.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    /// Run a tool call and return its result or error.
    pub async fn dispatch(&self, name: &str, args: Map<String, JsonValue>) -> Result<JsonValue> {
        self.invoke(name, args).await.result
    }

    /// Run a tool call, sending progress reports where the tool has them.
    pub async fn dispatch_with_progress(
        &self,
        name: &str,
        args: Map<String, JsonValue>,
        progress: &Progress,
    ) -> Result<JsonValue> {
        self.invoke_with_progress(name, args, progress).await.result
    }

    /// Run a tool call, also reporting the terminal pipeline stage.
    pub async fn invoke(&self, name: &str, args: Map<String, JsonValue>) -> Outcome {
        self.invoke_with_progress(name, args, &Progress::none()).await
    }

    /// [`invoke`](Self::invoke) with a progress sink.
    pub async fn invoke_with_progress(
        &self,
        name: &str,
        args: Map<String, JsonValue>,
        progress: &Progress,
    ) -> Outcome {
        let started = Instant::now();
        let mut stage = Stage::Received;
        let result = self.run(name, &args, &mut stage, progress).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(tool = name, elapsed_ms, "tool call completed"),
            Err(e) => tracing::warn!(
                tool = name,
                stage = ?stage,
                kind = ?e.kind(),
                elapsed_ms,
                "tool call failed: {}",
                e
            ),
        }

        Outcome { stage, result }
    }

    async fn run(
        &self,
        name: &str,
        args: &Map<String, JsonValue>,
        stage: &mut Stage,
        progress: &Progress,
    ) -> Result<JsonValue> {
        let request = match self.validate(name, args) {
            Ok(request) => request,
            Err(e) => {
                stage.advance(name, Stage::Rejected);
                return Err(e);
            }
        };
        stage.advance(name, Stage::Validated);

        stage.advance(name, Stage::Executing);
        request.report_started(progress);
        let raw = match request.execute(self.backend.as_ref(), &self.info).await {
            Ok(raw) => raw,
            Err(e) => {
                stage.advance(name, Stage::Failed);
                return Err(e);
            }
        };

        stage.advance(name, Stage::Transforming);
        request.report_fetched(progress);
        let result = request.transform(raw, &self.annotator);

        stage.advance(name, Stage::Completed);
        request.report_completed(progress, &result);
        Ok(result)
    }

    fn validate(&self, name: &str, args: &Map<String, JsonValue>) -> Result<ToolRequest> {
        if !self.is_enabled(name) {
            return Err(McpError::ToolDisabled(name.to_string()));
        }
        ToolRequest::parse(name, args)
    }
}

/// Helper macro for creating JSON Schema for tool input parameters.
#[macro_export]
macro_rules! schema {
    // Object with required and optional properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? },
        optional: { $($opt_name:literal : $opt_type:tt),* $(,)? }
    }) => {{
        let mut required: Vec<&str> = Vec::new();
        $(required.push($req_name);)*

        let mut props = serde_json::Map::new();
        $(props.insert($req_name.to_string(), schema!(@type $req_type));)*
        $(props.insert($opt_name.to_string(), schema!(@type $opt_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }};

    // Object with only required properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? }
    }) => {{
        let mut required: Vec<&str> = Vec::new();
        $(required.push($req_name);)*

        let mut props = serde_json::Map::new();
        $(props.insert($req_name.to_string(), schema!(@type $req_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }};

    // Empty object (no parameters)
    (object {}) => {{
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }};

    // Type mappings
    (@type string) => { serde_json::json!({"type": "string"}) };
    (@type time) => {
        serde_json::json!({
            "type": "string",
            "description": "RFC 3339 time (2023-01-01T00:00:00Z) or Unix timestamp in seconds"
        })
    };
    (@type duration) => {
        serde_json::json!({
            "type": "string",
            "description": "Prometheus duration (15s, 1m, 1h30m) or number of seconds"
        })
    };
}
