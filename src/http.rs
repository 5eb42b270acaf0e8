//! Network transports: streamable HTTP and server-sent events.
//!
//! - `http`: `POST /mcp` with one JSON-RPC message, answered in the body
//!   (`202 Accepted` for notifications).
//! - `sse`: `GET /sse` opens an event stream whose first `endpoint` event
//!   names the URL to `POST` messages to; responses arrive as `message`
//!   events on the stream.
//!
//! Progress notifications are pushed on the SSE stream. The plain HTTP
//! transport answers with a single body and drops them.
//!
//! Both serve `GET /health`. A request is abandoned as soon as its client
//! goes away, which drops the in-flight Prometheus call with it.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::config::TransportMode;
use crate::error::{McpError, Result};
use crate::progress::Outbox;
use crate::server::{McpServer, ServerMessage};

/// Path of the streamable HTTP endpoint.
pub const MCP_PATH: &str = "/mcp";
/// Path clients open the SSE stream on.
pub const SSE_PATH: &str = "/sse";
/// Path SSE clients post messages to.
pub const MESSAGES_PATH: &str = "/messages";

type Sessions = Arc<Mutex<HashMap<String, Outbox>>>;

#[derive(Clone)]
struct HttpState {
    server: McpServer,
    sessions: Sessions,
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: String,
}

/// Build the router for a network transport.
pub fn router(server: McpServer, mode: TransportMode) -> Result<Router> {
    let state = HttpState {
        server,
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    let router = match mode {
        TransportMode::Http => Router::new().route(MCP_PATH, post(mcp_post)),
        TransportMode::Sse => Router::new()
            .route(SSE_PATH, get(sse_connect))
            .route(MESSAGES_PATH, post(sse_message)),
        TransportMode::Stdio => {
            return Err(McpError::Config("stdio is not a network transport".to_string()))
        }
    };

    Ok(router.route("/health", get(health)).with_state(state))
}

/// Bind and serve until Ctrl-C.
pub async fn serve(server: McpServer, mode: TransportMode, host: &str, port: u16) -> Result<()> {
    let app = router(server, mode)?;
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!(transport = %mode, "listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "prometheus-mcp",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn mcp_post(State(state): State<HttpState>, body: String) -> Response {
    match state.server.handle_message(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Removes the session when the event stream is dropped.
struct SessionGuard {
    id: String,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(&self.id);
        }
        tracing::debug!(session_id = %self.id, "sse session closed");
    }
}

async fn sse_connect(
    State(state): State<HttpState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4().simple().to_string();
    let (tx, rx) = mpsc::unbounded_channel::<ServerMessage>();

    if let Ok(mut sessions) = state.sessions.lock() {
        sessions.insert(session_id.clone(), tx);
    }
    tracing::debug!(session_id = %session_id, "sse session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}?session_id={}", MESSAGES_PATH, session_id));

    let guard = SessionGuard {
        id: session_id,
        sessions: state.sessions.clone(),
    };
    let messages = UnboundedReceiverStream::new(rx).map(move |message| {
        let _guard = &guard;
        let data = serde_json::to_string(&message).unwrap_or_else(|_| "null".to_string());
        Ok::<_, Infallible>(Event::default().event("message").data(data))
    });

    let stream = stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn sse_message(
    State(state): State<HttpState>,
    Query(query): Query<SessionQuery>,
    body: String,
) -> Response {
    let tx = state
        .sessions
        .lock()
        .ok()
        .and_then(|sessions| sessions.get(&query.session_id).cloned());
    let Some(tx) = tx else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };

    let server = state.server.clone();
    let session_id = query.session_id;
    tokio::spawn(async move {
        tokio::select! {
            response = server.handle_message_with_outbox(&body, &tx) => {
                if let Some(response) = response {
                    if tx.send(response.into()).is_err() {
                        tracing::debug!(session_id = %session_id, "sse client went away before response");
                    }
                }
            }
            _ = tx.closed() => {
                tracing::debug!(session_id = %session_id, "sse client disconnected, abandoning request");
            }
        }
    });

    StatusCode::ACCEPTED.into_response()
}
