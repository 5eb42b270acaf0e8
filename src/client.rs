//! Prometheus HTTP API client.
//!
//! Thin authenticated wrapper over the query, metadata and target endpoints.
//! Every call is a single HTTP request; failures are classified but never
//! retried.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use url::Url;

use crate::config::{Auth, Config};
use crate::error::{McpError, Result};

/// Tenant header understood by Mimir, Cortex and Thanos.
pub const ORG_ID_HEADER: &str = "X-Scope-OrgID";

/// Largest body excerpt included in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Operations the tool dispatcher needs from a metrics backend.
///
/// Each method returns the `data` member of the backend response.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Instant query; `time` defaults to "now" at the backend.
    async fn query(&self, expression: &str, time: Option<&str>) -> Result<JsonValue>;

    /// Range query over `[start, end]` at `step` resolution.
    async fn query_range(&self, expression: &str, start: &str, end: &str, step: &str) -> Result<JsonValue>;

    /// All metric names.
    async fn list_metrics(&self) -> Result<JsonValue>;

    /// Metadata for one metric.
    async fn metric_metadata(&self, metric: &str) -> Result<JsonValue>;

    /// Active and dropped scrape targets.
    async fn list_targets(&self) -> Result<JsonValue>;
}

/// Response envelope shared by every `/api/v1` endpoint.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Option<JsonValue>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

/// Client for the Prometheus HTTP API.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Auth,
    org_id: Option<String>,
}

impl PrometheusClient {
    /// Build a client from the server configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(!config.ssl_verify)
            .user_agent(concat!("prometheus-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| McpError::Config(format!("failed to build HTTP client: {}", e)))?;

        if !config.ssl_verify {
            tracing::warn!("TLS certificate verification is disabled for {}", config.prometheus_url);
        }

        Ok(Self {
            http,
            base_url: config.prometheus_url.clone(),
            auth: config.auth.clone(),
            org_id: config.org_id.clone(),
        })
    }

    /// Base URL requests are issued against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<JsonValue> {
        let url = join_path(&self.base_url, &format!("api/v1/{}", endpoint));
        let mut request = self.http.get(url).query(params);

        request = match &self.auth {
            Auth::None => request,
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Bearer(token) => request.bearer_auth(token),
        };
        if let Some(org_id) = &self.org_id {
            request = request.header(ORG_ID_HEADER, org_id);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            tracing::debug!(endpoint, error = %e, "prometheus request failed");
            McpError::from(e)
        })?;
        let status = response.status();
        let body = response.bytes().await?;

        tracing::debug!(
            endpoint,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "prometheus response"
        );

        parse_envelope(status, &body)
    }
}

#[async_trait]
impl Backend for PrometheusClient {
    async fn query(&self, expression: &str, time: Option<&str>) -> Result<JsonValue> {
        let mut params = vec![("query", expression)];
        if let Some(time) = time {
            params.push(("time", time));
        }
        self.get("query", &params).await
    }

    async fn query_range(&self, expression: &str, start: &str, end: &str, step: &str) -> Result<JsonValue> {
        self.get(
            "query_range",
            &[("query", expression), ("start", start), ("end", end), ("step", step)],
        )
        .await
    }

    async fn list_metrics(&self) -> Result<JsonValue> {
        self.get("label/__name__/values", &[]).await
    }

    async fn metric_metadata(&self, metric: &str) -> Result<JsonValue> {
        self.get("metadata", &[("metric", metric)]).await
    }

    async fn list_targets(&self) -> Result<JsonValue> {
        self.get("targets", &[]).await
    }
}

/// Append `path` to the path of `base`, keeping any prefix it already has.
pub(crate) fn join_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Unwrap the `data` member or turn the failure into a `BackendError`.
fn parse_envelope(status: StatusCode, body: &[u8]) -> Result<JsonValue> {
    let envelope: Envelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            let message = if status.is_success() {
                format!("invalid JSON response: {}", e)
            } else {
                body_excerpt(body)
            };
            return Err(McpError::BackendError {
                status: status.as_u16(),
                message,
            });
        }
    };

    for warning in &envelope.warnings {
        tracing::warn!(warning = %warning, "prometheus returned a warning");
    }

    if status.is_success() && envelope.status == "success" {
        return Ok(envelope.data.unwrap_or(JsonValue::Null));
    }

    let message = match (envelope.error_type, envelope.error) {
        (Some(kind), Some(error)) => format!("{}: {}", kind, error),
        (None, Some(error)) => error,
        (Some(kind), None) => kind,
        (None, None) => format!("status '{}'", envelope.status),
    };
    Err(McpError::BackendError {
        status: status.as_u16(),
        message,
    })
}

fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return "empty response body".to_string();
    }
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_path() {
        let base = Url::parse("http://prom:9090").unwrap();
        assert_eq!(join_path(&base, "api/v1/query").as_str(), "http://prom:9090/api/v1/query");

        let base = Url::parse("https://gw.example.com/prometheus/?x=1").unwrap();
        assert_eq!(
            join_path(&base, "/api/v1/targets").as_str(),
            "https://gw.example.com/prometheus/api/v1/targets"
        );
    }

    #[test]
    fn test_parse_envelope_success() {
        let body = json!({"status": "success", "data": {"resultType": "vector", "result": []}});
        let data = parse_envelope(StatusCode::OK, body.to_string().as_bytes()).unwrap();
        assert_eq!(data["resultType"], "vector");
    }

    #[test]
    fn test_parse_envelope_backend_error() {
        let body = json!({"status": "error", "errorType": "bad_data", "error": "parse error at char 3"});
        let err = parse_envelope(StatusCode::BAD_REQUEST, body.to_string().as_bytes()).unwrap_err();
        match err {
            McpError::BackendError { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad_data: parse error at char 3");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_envelope_non_json() {
        let err = parse_envelope(StatusCode::BAD_GATEWAY, b"upstream connect error").unwrap_err();
        assert!(matches!(err, McpError::BackendError { status: 502, ref message } if message == "upstream connect error"));

        let err = parse_envelope(StatusCode::OK, b"<html>").unwrap_err();
        assert!(matches!(err, McpError::BackendError { status: 200, .. }));
    }

    #[test]
    fn test_body_excerpt_truncates() {
        let long = "x".repeat(2000);
        let excerpt = body_excerpt(long.as_bytes());
        assert!(excerpt.ends_with("..."));
        assert_eq!(excerpt.len(), MAX_ERROR_BODY + 3);
    }
}
