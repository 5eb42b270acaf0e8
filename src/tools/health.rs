//! Server health tool.
//!
//! Tools: health_check

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value as JsonValue};
use url::Url;

use crate::client::Backend;
use crate::config::Config;
use crate::schema;
use crate::tools::ToolDef;

/// Tool name of the health check.
pub const HEALTH_CHECK: &str = "health_check";

const SERVICE_NAME: &str = "prometheus-mcp";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get all health tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![ToolDef::new(
        HEALTH_CHECK,
        "Report server health, configuration summary and whether Prometheus is reachable.",
        schema!(object {}),
    )]
}

/// Static facts about this server reported by `health_check`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Prometheus base URL
    pub prometheus_url: String,
    /// Active transport name
    pub transport: String,
    /// Whether credentials are configured
    pub authentication_configured: bool,
    /// Whether a tenant header is sent
    pub org_id_configured: bool,
}

impl ServerInfo {
    /// Summarize the configuration. Credentials are not included.
    pub fn from_config(config: &Config) -> Self {
        Self {
            prometheus_url: configured_url(&config.prometheus_url),
            transport: config.transport.to_string(),
            authentication_configured: config.auth.is_configured(),
            org_id_configured: config.org_id.is_some(),
        }
    }
}

/// The base URL as the operator wrote it, without the root slash `Url` adds.
fn configured_url(url: &Url) -> String {
    let text = url.as_str();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        text.trim_end_matches('/').to_string()
    } else {
        text.to_string()
    }
}

/// Query `up` on Prometheus and build the health report.
///
/// A failed `up` query is reported as `degraded`, not as an error.
pub async fn check(backend: &dyn Backend, info: &ServerInfo) -> JsonValue {
    let mut report = json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "transport": info.transport,
        "prometheus_url": info.prometheus_url,
        "configuration": {
            "prometheus_url_configured": !info.prometheus_url.is_empty(),
            "authentication_configured": info.authentication_configured,
            "org_id_configured": info.org_id_configured,
        }
    });

    match backend.query("up", None).await {
        Ok(_) => {
            report["prometheus_connectivity"] = json!("healthy");
        }
        Err(e) => {
            tracing::warn!(error = %e, "health check query failed");
            report["status"] = json!("degraded");
            report["prometheus_connectivity"] = json!("unhealthy");
            report["prometheus_error"] = json!(e.to_string());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_info_echoes_configured_url() {
        let info = ServerInfo::from_config(&Config::new("http://prometheus:9090").unwrap());
        assert_eq!(info.prometheus_url, "http://prometheus:9090");

        let info = ServerInfo::from_config(&Config::new("https://mimir.example.com/prometheus").unwrap());
        assert_eq!(info.prometheus_url, "https://mimir.example.com/prometheus");
    }
}
