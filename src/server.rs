//! MCP server implementation.
//!
//! Handles JSON-RPC 2.0 according to the MCP protocol specification and runs
//! the stdio transport. The network transports live in [`crate::http`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::error::{rpc_codes, McpError, Result};
use crate::progress::{Outbox, Progress};
use crate::tools::ToolRegistry;

/// Protocol versions we can speak, newest first.
const PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Server information.
const SERVER_NAME: &str = "prometheus-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<JsonValue>,
    pub method: String,
    #[serde(default)]
    pub params: Option<JsonValue>,
}

impl JsonRpcRequest {
    /// Notifications carry no id and get no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

/// JSON-RPC 2.0 notification sent by the server.
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: JsonValue,
}

impl JsonRpcNotification {
    /// Create a notification.
    pub fn new(method: &str, params: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// Anything the server writes to a client stream.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Answer to a request
    Response(JsonRpcResponse),
    /// Server-initiated notification
    Notification(JsonRpcNotification),
}

impl From<JsonRpcResponse> for ServerMessage {
    fn from(response: JsonRpcResponse) -> Self {
        ServerMessage::Response(response)
    }
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<JsonValue>, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<JsonValue>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Create an error response from an McpError.
    pub fn from_error(id: Option<JsonValue>, err: McpError) -> Self {
        Self::error(id, err.rpc_code(), err.to_string())
    }
}

/// MCP server. Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
}

impl McpServer {
    /// Create a new MCP server around the given registry.
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// The tool registry.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the server, reading from stdin and writing to stdout.
    ///
    /// Tool calls run concurrently. A `notifications/cancelled` for an
    /// in-flight request aborts it, dropping its backend call; EOF aborts
    /// everything still running.
    pub async fn run_stdio(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(message) = rx.recv().await {
                let response_json = serde_json::to_string(&message)?;
                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            Ok::<(), McpError>(())
        });

        let mut in_flight: HashMap<String, AbortHandle> = HashMap::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                // EOF - client disconnected
                break;
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // Parse the request
            let request = match serde_json::from_str::<JsonRpcRequest>(line) {
                Ok(request) => request,
                Err(e) => {
                    let _ = tx.send(
                        JsonRpcResponse::error(None, rpc_codes::PARSE_ERROR, format!("Parse error: {}", e))
                            .into(),
                    );
                    continue;
                }
            };

            if request.method == "notifications/cancelled" {
                if let Some(key) = cancelled_request_key(&request) {
                    if let Some(handle) = in_flight.remove(&key) {
                        tracing::debug!(request_id = %key, "cancelling in-flight request");
                        handle.abort();
                    }
                }
                continue;
            }

            if request.method != "tools/call" {
                if let Some(response) = self.handle_request(request).await {
                    let _ = tx.send(response.into());
                }
                continue;
            }

            in_flight.retain(|_, handle| !handle.is_finished());
            let key = request.id.as_ref().map(|id| id.to_string());
            let server = self.clone();
            let tx = tx.clone();
            let task = tokio::spawn(async move {
                if let Some(response) = server.handle_request_with_outbox(request, &tx).await {
                    let _ = tx.send(response.into());
                }
            });
            if let Some(key) = key {
                in_flight.insert(key, task.abort_handle());
            }
        }

        for handle in in_flight.values() {
            handle.abort();
        }
        drop(tx);

        writer
            .await
            .map_err(|e| McpError::Internal(format!("stdout writer failed: {}", e)))?
    }

    /// Parse and handle one raw JSON-RPC message.
    pub async fn handle_message(&self, raw: &str) -> Option<JsonRpcResponse> {
        self.process_message(raw, None).await
    }

    /// Like [`handle_message`](Self::handle_message), pushing progress
    /// notifications to `outbox` while the call runs.
    pub async fn handle_message_with_outbox(&self, raw: &str, outbox: &Outbox) -> Option<JsonRpcResponse> {
        self.process_message(raw, Some(outbox)).await
    }

    async fn process_message(&self, raw: &str, outbox: Option<&Outbox>) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(raw) {
            Ok(request) => self.process(request, outbox).await,
            Err(e) => Some(JsonRpcResponse::error(
                None,
                rpc_codes::PARSE_ERROR,
                format!("Parse error: {}", e),
            )),
        }
    }

    /// Handle a single JSON-RPC request. Notifications yield `None`.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        self.process(request, None).await
    }

    /// Handle a request whose client can receive progress notifications.
    pub async fn handle_request_with_outbox(
        &self,
        request: JsonRpcRequest,
        outbox: &Outbox,
    ) -> Option<JsonRpcResponse> {
        self.process(request, Some(outbox)).await
    }

    async fn process(&self, request: JsonRpcRequest, outbox: Option<&Outbox>) -> Option<JsonRpcResponse> {
        // Validate JSON-RPC version
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                rpc_codes::INVALID_REQUEST,
                "Invalid JSON-RPC version".to_string(),
            ));
        }

        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification");
            return None;
        }

        // Route to appropriate handler
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "tools/list" => self.handle_tools_list(request),
            "tools/call" => self.handle_tools_call(request, outbox).await,
            "ping" => JsonRpcResponse::success(request.id, serde_json::json!({})),
            _ => JsonRpcResponse::error(
                request.id,
                rpc_codes::METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            ),
        };
        Some(response)
    }

    /// Handle the initialize request.
    fn handle_initialize(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let requested = request
            .params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(|v| v.as_str());
        let version = requested
            .and_then(|r| PROTOCOL_VERSIONS.iter().find(|v| **v == r))
            .unwrap_or(&PROTOCOL_VERSIONS[0]);

        tracing::info!(protocol_version = %version, "client initialized");

        JsonRpcResponse::success(
            request.id,
            serde_json::json!({
                "protocolVersion": version,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": SERVER_VERSION
                }
            }),
        )
    }

    /// Handle the tools/list request.
    fn handle_tools_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let tools: Vec<JsonValue> = self
            .registry
            .tools()
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema
                })
            })
            .collect();

        JsonRpcResponse::success(request.id, serde_json::json!({ "tools": tools }))
    }

    /// Handle the tools/call request.
    async fn handle_tools_call(&self, request: JsonRpcRequest, outbox: Option<&Outbox>) -> JsonRpcResponse {
        // Extract name and arguments from params
        let params = match &request.params {
            Some(JsonValue::Object(obj)) => obj,
            _ => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "Missing params object".to_string(),
                )
            }
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n.to_string(),
            None => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "Missing 'name' in params".to_string(),
                )
            }
        };

        let arguments = match params.get("arguments") {
            Some(JsonValue::Object(obj)) => obj.clone(),
            Some(JsonValue::Null) | None => Map::new(),
            _ => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "'arguments' must be an object".to_string(),
                )
            }
        };

        // Tool failures are results with isError set, never JSON-RPC errors
        let progress = Progress::from_params(params, outbox);
        let (payload, is_error) = match self.registry.dispatch_with_progress(&name, arguments, &progress).await {
            Ok(result) => (result, false),
            Err(err) => (serde_json::to_value(err.to_tool_error()).unwrap_or(JsonValue::Null), true),
        };

        JsonRpcResponse::success(
            request.id,
            serde_json::json!({
                "content": [{
                    "type": "text",
                    "text": serde_json::to_string(&payload).unwrap_or_else(|_| "null".to_string())
                }],
                "isError": is_error
            }),
        )
    }
}

/// Key of the request a `notifications/cancelled` refers to.
fn cancelled_request_key(request: &JsonRpcRequest) -> Option<String> {
    request
        .params
        .as_ref()?
        .get("requestId")
        .filter(|id| !id.is_null())
        .map(|id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Backend;
    use crate::config::Config;
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticBackend;

    #[async_trait]
    impl Backend for StaticBackend {
        async fn query(&self, _expression: &str, _time: Option<&str>) -> Result<JsonValue> {
            Ok(json!({"resultType": "vector", "result": [{"metric": {"__name__": "up"}, "value": [1617898448.214, "1"]}]}))
        }
        async fn query_range(&self, _e: &str, _s: &str, _en: &str, _st: &str) -> Result<JsonValue> {
            Ok(json!({"resultType": "matrix", "result": []}))
        }
        async fn list_metrics(&self) -> Result<JsonValue> {
            Ok(json!(["up"]))
        }
        async fn metric_metadata(&self, _metric: &str) -> Result<JsonValue> {
            Ok(json!({}))
        }
        async fn list_targets(&self) -> Result<JsonValue> {
            Err(McpError::BackendUnreachable("connection refused".into()))
        }
    }

    fn server() -> McpServer {
        let config = Config::new("http://prom:9090").unwrap();
        McpServer::new(Arc::new(ToolRegistry::new(Arc::new(StaticBackend), &config)))
    }

    fn request(value: JsonValue) -> JsonRpcRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_json_rpc_response_success() {
        let response = JsonRpcResponse::success(Some(JsonValue::Number(1.into())), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_json_rpc_response_error() {
        let response = JsonRpcResponse::error(Some(JsonValue::Number(1.into())), -32600, "Invalid".to_string());
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\""));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn test_cancelled_request_key() {
        let r = request(json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 7}}));
        assert_eq!(cancelled_request_key(&r).as_deref(), Some("7"));
        let r = request(json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {}}));
        assert_eq!(cancelled_request_key(&r), None);
    }

    #[tokio::test]
    async fn test_initialize_negotiates_version() {
        let response = server()
            .handle_request(request(json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {"protocolVersion": "2024-11-05"}
            })))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "prometheus-mcp");

        let response = server()
            .handle_request(request(json!({
                "jsonrpc": "2.0", "id": 2, "method": "initialize",
                "params": {"protocolVersion": "1999-01-01"}
            })))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["protocolVersion"], PROTOCOL_VERSIONS[0]);
    }

    #[tokio::test]
    async fn test_notification_has_no_response() {
        let response = server()
            .handle_request(request(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})))
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_tools_call_success() {
        let response = server()
            .handle_request(request(json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "execute_query", "arguments": {"query": "up"}}
            })))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
        let payload: JsonValue = serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(payload["result"][0]["value"][0], "2021-04-08T16:14:08Z");
        assert_eq!(payload["links"][0]["rel"], "prometheus-ui");
    }

    #[tokio::test]
    async fn test_tools_call_error_is_structured() {
        let response = server()
            .handle_request(request(json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "get_targets"}
            })))
            .await
            .unwrap();
        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        let payload: JsonValue = serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(payload["kind"], "backend_unreachable");
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = server()
            .handle_message(r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, rpc_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let response = server().handle_message("{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, rpc_codes::PARSE_ERROR);
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<JsonValue> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(serde_json::to_value(&message).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_tools_call_reports_progress() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let response = server()
            .handle_request_with_outbox(
                request(json!({
                    "jsonrpc": "2.0", "id": 6, "method": "tools/call",
                    "params": {"name": "list_metrics", "_meta": {"progressToken": "abc"}}
                })),
                &tx,
            )
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["isError"], false);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        for n in &sent {
            assert_eq!(n["method"], "notifications/progress");
            assert_eq!(n["params"]["progressToken"], "abc");
            assert_eq!(n["params"]["total"], 100);
            assert!(n.get("id").is_none());
        }
        assert_eq!(sent[0]["params"]["progress"], 0);
        assert_eq!(sent[1]["params"]["progress"], 100);
        assert_eq!(sent[1]["params"]["message"], "Found 1 metrics");
    }

    #[tokio::test]
    async fn test_tools_call_without_token_sends_no_progress() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        server()
            .handle_request_with_outbox(
                request(json!({
                    "jsonrpc": "2.0", "id": 7, "method": "tools/call",
                    "params": {"name": "list_metrics"}
                })),
                &tx,
            )
            .await
            .unwrap();
        assert!(drain(&mut rx).is_empty());
    }
}
