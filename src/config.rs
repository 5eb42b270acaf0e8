//! Process-wide configuration.
//!
//! Built once at startup from CLI flags and environment variables, validated,
//! then shared read-only with every component.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use url::Url;

use crate::error::{McpError, Result};
use crate::tools::TOOL_NAMES;

/// MCP server for Prometheus.
///
/// Exposes PromQL queries, metric discovery and scrape targets as MCP tools
/// for AI agents.
#[derive(Debug, Clone, Parser)]
#[command(name = "prometheus-mcp")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Base URL of the Prometheus server (e.g. http://localhost:9090).
    #[arg(long, env = "PROMETHEUS_URL", value_name = "URL")]
    pub url: Option<String>,

    /// Verify the TLS certificate of the Prometheus server.
    #[arg(
        long,
        env = "PROMETHEUS_URL_SSL_VERIFY",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub ssl_verify: bool,

    /// Do not attach Prometheus UI links to query results.
    #[arg(
        long,
        env = "PROMETHEUS_DISABLE_LINKS",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub disable_links: bool,

    /// Username for basic authentication.
    #[arg(long, env = "PROMETHEUS_USERNAME")]
    pub username: Option<String>,

    /// Password for basic authentication.
    #[arg(long, env = "PROMETHEUS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Bearer token. Ignored when basic credentials are also set.
    #[arg(long, env = "PROMETHEUS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Tenant identifier sent as X-Scope-OrgID.
    #[arg(long, env = "ORG_ID")]
    pub org_id: Option<String>,

    /// Per-request timeout against Prometheus, in seconds.
    #[arg(long, env = "PROMETHEUS_REQUEST_TIMEOUT", default_value_t = 30)]
    pub request_timeout: u64,

    /// Transport used to talk to the MCP client.
    #[arg(long, env = "PROMETHEUS_MCP_SERVER_TRANSPORT", value_enum, default_value_t = TransportMode::Stdio)]
    pub transport: TransportMode,

    /// Bind host for the http and sse transports.
    #[arg(long, env = "PROMETHEUS_MCP_BIND_HOST", default_value = "127.0.0.1")]
    pub bind_host: String,

    /// Bind port for the http and sse transports.
    #[arg(long, env = "PROMETHEUS_MCP_BIND_PORT", default_value_t = 8080)]
    pub bind_port: u16,

    /// Comma-separated tool names to hide from clients.
    #[arg(long, env = "PROMETHEUS_MCP_DISABLED_TOOLS", value_delimiter = ',')]
    pub disabled_tools: Vec<String>,

    /// Enable debug logging to stderr.
    #[arg(long, short)]
    pub verbose: bool,
}

/// Transport carrying the MCP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportMode {
    /// JSON-RPC lines over stdin/stdout.
    Stdio,
    /// Streamable HTTP: one POST per JSON-RPC message.
    Http,
    /// Legacy server-sent events transport.
    Sse,
}

impl TransportMode {
    /// Lowercase name as accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Stdio => "stdio",
            TransportMode::Http => "http",
            TransportMode::Sse => "sse",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication scheme applied to every Prometheus request.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Auth {
    /// No credentials.
    #[default]
    None,
    /// HTTP basic authentication.
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },
    /// `Authorization: Bearer <token>`.
    Bearer(String),
}

impl Auth {
    /// Whether any credentials are configured.
    pub fn is_configured(&self) -> bool {
        !matches!(self, Auth::None)
    }
}

// Credentials stay out of logs.
impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Basic { username, .. } => write!(f, "Basic({username}, ***)"),
            Auth::Bearer(_) => f.write_str("Bearer(***)"),
        }
    }
}

/// Validated, immutable server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prometheus base URL
    pub prometheus_url: Url,
    /// Verify TLS certificates
    pub ssl_verify: bool,
    /// Suppress UI links on query results
    pub disable_links: bool,
    /// Authentication scheme
    pub auth: Auth,
    /// Tenant header value
    pub org_id: Option<String>,
    /// Timeout applied to each backend call
    pub request_timeout: Duration,
    /// MCP transport
    pub transport: TransportMode,
    /// Bind host for network transports
    pub bind_host: String,
    /// Bind port for network transports
    pub bind_port: u16,
    /// Tools hidden from clients
    pub disabled_tools: BTreeSet<String>,
}

impl Config {
    /// Minimal configuration pointing at `url`, everything else defaulted.
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            prometheus_url: parse_base_url(url)?,
            ssl_verify: true,
            disable_links: false,
            auth: Auth::None,
            org_id: None,
            request_timeout: Duration::from_secs(30),
            transport: TransportMode::Stdio,
            bind_host: "127.0.0.1".to_string(),
            bind_port: 8080,
            disabled_tools: BTreeSet::new(),
        })
    }

    /// Validate parsed arguments into a configuration.
    pub fn from_args(args: &Args) -> Result<Self> {
        let url = non_empty(args.url.as_deref())
            .ok_or_else(|| McpError::Config("PROMETHEUS_URL must be set".to_string()))?;
        let mut config = Self::new(url)?;

        config.auth = resolve_auth(
            credential(args.username.as_deref()),
            credential(args.password.as_deref()),
            non_empty(args.token.as_deref()),
        )?;

        if args.request_timeout == 0 {
            return Err(McpError::Config(
                "PROMETHEUS_REQUEST_TIMEOUT must be at least one second".to_string(),
            ));
        }

        let mut disabled_tools = BTreeSet::new();
        for name in args.disabled_tools.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if !TOOL_NAMES.contains(&name) {
                return Err(McpError::Config(format!(
                    "unknown tool '{}' in PROMETHEUS_MCP_DISABLED_TOOLS (known: {})",
                    name,
                    TOOL_NAMES.join(", ")
                )));
            }
            disabled_tools.insert(name.to_string());
        }

        config.ssl_verify = args.ssl_verify;
        config.disable_links = args.disable_links;
        config.org_id = non_empty(args.org_id.as_deref()).map(str::to_string);
        config.request_timeout = Duration::from_secs(args.request_timeout);
        config.transport = args.transport;
        config.bind_host = args.bind_host.clone();
        config.bind_port = args.bind_port;
        config.disabled_tools = disabled_tools;

        Ok(config)
    }

    /// Whether a tool is exposed to clients.
    pub fn tool_enabled(&self, name: &str) -> bool {
        TOOL_NAMES.contains(&name) && !self.disabled_tools.contains(name)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Like `non_empty`, but hands back the value untrimmed.
fn credential(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| McpError::Config(format!("invalid PROMETHEUS_URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(McpError::Config(format!(
            "PROMETHEUS_URL must use http or https, got '{}'",
            other
        ))),
    }
}

fn resolve_auth(username: Option<&str>, password: Option<&str>, token: Option<&str>) -> Result<Auth> {
    match (username, password, token) {
        (Some(username), Some(password), token) => {
            if token.is_some() {
                tracing::warn!(
                    "both basic credentials and PROMETHEUS_TOKEN are set; using basic authentication"
                );
            }
            Ok(Auth::Basic {
                username: username.to_string(),
                password: password.to_string(),
            })
        }
        (Some(_), None, _) => Err(McpError::Config(
            "PROMETHEUS_USERNAME is set but PROMETHEUS_PASSWORD is missing".to_string(),
        )),
        (None, Some(_), _) => Err(McpError::Config(
            "PROMETHEUS_PASSWORD is set but PROMETHEUS_USERNAME is missing".to_string(),
        )),
        (None, None, Some(token)) => Ok(Auth::Bearer(token.to_string())),
        (None, None, None) => Ok(Auth::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["prometheus-mcp"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_minimal_config() {
        let config = Config::from_args(&args(&["--url", "http://prom:9090"])).unwrap();
        assert_eq!(config.prometheus_url.as_str(), "http://prom:9090/");
        assert!(config.ssl_verify);
        assert!(!config.disable_links);
        assert_eq!(config.auth, Auth::None);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_url_is_config_error() {
        let mut a = args(&[]);
        a.url = None;
        let err = Config::from_args(&a).unwrap_err();
        assert!(matches!(err, McpError::Config(_)));
    }

    #[test]
    fn test_invalid_url() {
        assert!(Config::new("not a url").is_err());
        assert!(Config::new("ftp://prom:9090").is_err());
    }

    #[test]
    fn test_basic_auth_takes_precedence() {
        let auth = resolve_auth(Some("admin"), Some("secret"), Some("tok")).unwrap();
        assert_eq!(
            auth,
            Auth::Basic {
                username: "admin".into(),
                password: "secret".into()
            }
        );
    }

    #[test]
    fn test_credentials_forwarded_untrimmed() {
        let config = Config::from_args(&args(&[
            "--url",
            "http://prom:9090",
            "--username",
            "admin",
            "--password",
            " pass word ",
        ]))
        .unwrap();
        assert_eq!(
            config.auth,
            Auth::Basic {
                username: "admin".into(),
                password: " pass word ".into()
            }
        );

        let mut a = args(&["--url", "http://prom:9090", "--username", "admin"]);
        a.password = Some("   ".into());
        a.token = None;
        assert!(matches!(Config::from_args(&a), Err(McpError::Config(_))));
    }

    #[test]
    fn test_bearer_auth() {
        assert_eq!(resolve_auth(None, None, Some("tok")).unwrap(), Auth::Bearer("tok".into()));
    }

    #[test]
    fn test_partial_basic_auth_rejected() {
        assert!(resolve_auth(Some("admin"), None, None).is_err());
        assert!(resolve_auth(None, Some("secret"), Some("tok")).is_err());
    }

    #[test]
    fn test_auth_debug_redacts() {
        let auth = Auth::Basic {
            username: "admin".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", auth).contains("hunter2"));
        assert!(!format!("{:?}", Auth::Bearer("abc".into())).contains("abc"));
    }

    #[test]
    fn test_boolish_flags() {
        let config = Config::from_args(&args(&[
            "--url",
            "https://prom.example.com",
            "--ssl-verify",
            "false",
            "--disable-links",
            "true",
        ]))
        .unwrap();
        assert!(!config.ssl_verify);
        assert!(config.disable_links);
    }

    #[test]
    fn test_disabled_tools() {
        let config = Config::from_args(&args(&[
            "--url",
            "http://prom:9090",
            "--disabled-tools",
            "get_targets, list_metrics",
        ]))
        .unwrap();
        assert!(!config.tool_enabled("get_targets"));
        assert!(!config.tool_enabled("list_metrics"));
        assert!(config.tool_enabled("execute_query"));
        assert!(!config.tool_enabled("no_such_tool"));
    }

    #[test]
    fn test_unknown_disabled_tool_rejected() {
        let a = args(&["--url", "http://prom:9090", "--disabled-tools", "drop_database"]);
        assert!(matches!(Config::from_args(&a), Err(McpError::Config(_))));
    }

    #[test]
    fn test_transport_mode() {
        let config = Config::from_args(&args(&[
            "--url",
            "http://prom:9090",
            "--transport",
            "sse",
            "--bind-port",
            "9000",
        ]))
        .unwrap();
        assert_eq!(config.transport, TransportMode::Sse);
        assert_eq!(config.bind_port, 9000);
        assert_eq!(config.transport.to_string(), "sse");
    }
}
