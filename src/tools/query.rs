//! PromQL query tools.
//!
//! Tools: execute_query, execute_range_query

use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};
use crate::links::LinkWindow;
use crate::schema;
use crate::timeparse::{get_arg, get_optional_arg, get_string_arg, parse_step, parse_time, Step, TimeArg};
use crate::tools::ToolDef;

/// Tool name of the instant query.
pub const EXECUTE_QUERY: &str = "execute_query";
/// Tool name of the range query.
pub const EXECUTE_RANGE_QUERY: &str = "execute_range_query";

/// Get all query tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            EXECUTE_QUERY,
            "Execute a PromQL instant query against Prometheus. Returns the result type and \
             one sample per series, with sample timestamps as ISO 8601 UTC strings and a link \
             to the query in the Prometheus UI. Omit 'time' to evaluate at the current time.",
            schema!(object {
                required: { "query": string },
                optional: { "time": time }
            }),
        ),
        ToolDef::new(
            EXECUTE_RANGE_QUERY,
            "Execute a PromQL range query between 'start' and 'end' at 'step' resolution. \
             Returns a matrix of samples per series with ISO 8601 UTC timestamps and a link \
             to the graph in the Prometheus UI.",
            schema!(object {
                required: { "query": string, "start": time, "end": time, "step": duration }
            }),
        ),
    ]
}

/// Validated arguments of `execute_query`.
#[derive(Debug, Clone, PartialEq)]
pub struct InstantQuery {
    /// PromQL expression, forwarded verbatim
    pub expression: String,
    /// Evaluation time, backend "now" when absent
    pub time: Option<TimeArg>,
}

impl InstantQuery {
    /// Validate tool arguments.
    pub fn parse(args: &Map<String, JsonValue>) -> Result<Self> {
        let expression = get_string_arg(args, "query")?;
        let time = get_optional_arg(args, "time")
            .map(|v| parse_time("time", v))
            .transpose()?;
        Ok(Self { expression, time })
    }

    /// Window for the UI link.
    pub fn link_window(&self) -> LinkWindow {
        LinkWindow::Instant {
            time: self.time.as_ref().map(|t| t.at),
        }
    }
}

/// Validated arguments of `execute_range_query`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    /// PromQL expression, forwarded verbatim
    pub expression: String,
    /// Window start
    pub start: TimeArg,
    /// Window end, not before `start`
    pub end: TimeArg,
    /// Resolution
    pub step: Step,
}

impl RangeQuery {
    /// Validate tool arguments.
    pub fn parse(args: &Map<String, JsonValue>) -> Result<Self> {
        let expression = get_string_arg(args, "query")?;
        let start = parse_time("start", get_arg(args, "start")?)?;
        let end = parse_time("end", get_arg(args, "end")?)?;
        let step = parse_step("step", get_arg(args, "step")?)?;

        if start.at > end.at {
            return Err(McpError::InvalidArg {
                name: "start".to_string(),
                reason: format!("start ({}) is after end ({})", start.raw, end.raw),
            });
        }

        Ok(Self {
            expression,
            start,
            end,
            step,
        })
    }

    /// Window for the UI link.
    pub fn link_window(&self) -> LinkWindow {
        LinkWindow::Range {
            start: self.start.at,
            end: self.end.at,
            step_seconds: self.step.seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_instant_query_defaults_time() {
        let q = InstantQuery::parse(&args(json!({"query": "up"}))).unwrap();
        assert_eq!(q.expression, "up");
        assert!(q.time.is_none());
        assert_eq!(q.link_window(), LinkWindow::Instant { time: None });
    }

    #[test]
    fn test_instant_query_null_time_is_absent() {
        let q = InstantQuery::parse(&args(json!({"query": "up", "time": null}))).unwrap();
        assert!(q.time.is_none());
    }

    #[test]
    fn test_instant_query_requires_expression() {
        assert!(matches!(InstantQuery::parse(&Map::new()), Err(McpError::MissingArg(_))));
        assert!(matches!(
            InstantQuery::parse(&args(json!({"query": ""}))),
            Err(McpError::InvalidArg { .. })
        ));
        assert!(matches!(
            InstantQuery::parse(&args(json!({"query": "up", "time": "soon"}))),
            Err(McpError::InvalidArg { .. })
        ));
    }

    #[test]
    fn test_range_query() {
        let q = RangeQuery::parse(&args(json!({
            "query": "rate(x[5m])",
            "start": "2023-01-01T00:00:00Z",
            "end": "2023-01-01T01:00:00Z",
            "step": "15s"
        })))
        .unwrap();
        assert_eq!(q.start.raw, "2023-01-01T00:00:00Z");
        assert_eq!(q.step.raw, "15s");
        assert_eq!(q.step.seconds, 15.0);
    }

    #[test]
    fn test_range_query_equal_bounds_allowed() {
        assert!(RangeQuery::parse(&args(json!({
            "query": "up", "start": 1000, "end": 1000, "step": 1
        })))
        .is_ok());
    }

    #[test]
    fn test_range_query_start_after_end() {
        let err = RangeQuery::parse(&args(json!({
            "query": "up",
            "start": "2023-01-01T01:00:00Z",
            "end": "2023-01-01T00:00:00Z",
            "step": "15s"
        })))
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_range_query_missing_step() {
        let err = RangeQuery::parse(&args(json!({
            "query": "up",
            "start": "2023-01-01T00:00:00Z",
            "end": "2023-01-01T01:00:00Z"
        })))
        .unwrap_err();
        assert!(matches!(err, McpError::MissingArg(ref name) if name == "step"));
    }
}
