//! Error types for the MCP server.
//!
//! Every failure inside a tool call is surfaced to the client as a structured
//! [`ToolError`]; only protocol-level problems become JSON-RPC errors.

use serde::{Deserialize, Serialize};

/// MCP server errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum McpError {
    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArg(String),

    /// Invalid argument value.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArg {
        /// Argument name
        name: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Tool is unknown or not in the enabled set.
    #[error("tool not available: {0}")]
    ToolDisabled(String),

    /// Prometheus could not be reached.
    #[error("prometheus unreachable: {0}")]
    BackendUnreachable(String),

    /// The Prometheus request exceeded its timeout.
    #[error("prometheus request timed out: {0}")]
    BackendTimeout(String),

    /// Prometheus answered with a failure status or body.
    #[error("prometheus error (HTTP {status}): {message}")]
    BackendError {
        /// HTTP status returned by Prometheus
        status: u16,
        /// Backend-reported detail
        message: String,
    },

    /// Conflicting or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON-RPC protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            McpError::BackendTimeout(err.to_string())
        } else if err.is_connect() {
            McpError::BackendUnreachable(err.to_string())
        } else if let Some(status) = err.status() {
            McpError::BackendError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            McpError::BackendUnreachable(err.to_string())
        }
    }
}

/// Machine-readable classification of a failed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing tool arguments.
    InvalidArgument,
    /// Requested tool is not in the enabled set.
    ToolDisabled,
    /// Connection to Prometheus failed.
    BackendUnreachable,
    /// Prometheus did not answer within the configured timeout.
    BackendTimeout,
    /// Prometheus answered with a failure.
    BackendError,
    /// Configuration is missing or contradictory.
    ConfigurationError,
    /// Anything else.
    Internal,
}

/// Structured error returned to the client in place of a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Error class
    pub kind: ErrorKind,
    /// Human-readable explanation
    pub message: String,
}

/// JSON-RPC error codes.
pub mod rpc_codes {
    /// Parse error - Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The method does not exist / is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params - Invalid method parameter(s).
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl McpError {
    /// Classify this error for tool results.
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::MissingArg(_) | McpError::InvalidArg { .. } => ErrorKind::InvalidArgument,
            McpError::ToolDisabled(_) => ErrorKind::ToolDisabled,
            McpError::BackendUnreachable(_) => ErrorKind::BackendUnreachable,
            McpError::BackendTimeout(_) => ErrorKind::BackendTimeout,
            McpError::BackendError { .. } => ErrorKind::BackendError,
            McpError::Config(_) => ErrorKind::ConfigurationError,
            McpError::Protocol(_) | McpError::Io(_) | McpError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Build the structured error handed back to the client.
    pub fn to_tool_error(&self) -> ToolError {
        ToolError {
            kind: self.kind(),
            message: self.to_string(),
        }
    }

    /// Convert to JSON-RPC error code.
    pub fn rpc_code(&self) -> i32 {
        match self {
            McpError::ToolDisabled(_) => rpc_codes::METHOD_NOT_FOUND,
            McpError::MissingArg(_) | McpError::InvalidArg { .. } => rpc_codes::INVALID_PARAMS,
            McpError::Protocol(_) => rpc_codes::INVALID_REQUEST,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;
