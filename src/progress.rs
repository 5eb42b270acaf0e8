//! MCP progress reporting.
//!
//! A client opts in by sending `_meta.progressToken` with `tools/call`. The
//! server then emits `notifications/progress` on the same stream the response
//! will arrive on. Without a token, or on a transport that cannot push
//! (plain `POST /mcp`), reporting is a no-op.

use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;

use crate::server::{JsonRpcNotification, ServerMessage};

/// Channel carrying everything the server sends to one client.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Every report is a percentage of this.
pub const PROGRESS_TOTAL: u32 = 100;

/// Progress sink for a single tool call.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    target: Option<(JsonValue, Outbox)>,
}

impl Progress {
    /// A reporter that drops every report.
    pub fn none() -> Self {
        Self::default()
    }

    /// Report under `token` on `outbox`.
    pub fn new(token: JsonValue, outbox: Outbox) -> Self {
        Self {
            target: Some((token, outbox)),
        }
    }

    /// Build a reporter from `tools/call` params, if the client asked for one.
    pub fn from_params(params: &serde_json::Map<String, JsonValue>, outbox: Option<&Outbox>) -> Self {
        let token = params
            .get("_meta")
            .and_then(|meta| meta.get("progressToken"))
            .filter(|token| token.is_string() || token.is_number());
        match (token, outbox) {
            (Some(token), Some(outbox)) => Self::new(token.clone(), outbox.clone()),
            _ => Self::none(),
        }
    }

    /// Whether reports reach a client.
    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    /// Send `notifications/progress` with `progress` out of [`PROGRESS_TOTAL`].
    pub fn report(&self, progress: u32, message: &str) {
        let Some((token, outbox)) = &self.target else {
            return;
        };
        let notification = JsonRpcNotification::new(
            "notifications/progress",
            json!({
                "progressToken": token,
                "progress": progress,
                "total": PROGRESS_TOTAL,
                "message": message,
            }),
        );
        if outbox.send(ServerMessage::Notification(notification)).is_err() {
            tracing::debug!(progress, "client went away before progress report");
        }
    }
}
