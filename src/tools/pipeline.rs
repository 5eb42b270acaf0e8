//! Per-invocation pipeline: typed requests and the stage machine.

use serde_json::{Map, Value as JsonValue};

use crate::client::Backend;
use crate::error::{McpError, Result};
use crate::links::LinkAnnotator;
use crate::normalize::{normalize, Shape};
use crate::progress::{Progress, PROGRESS_TOTAL};

use super::discovery::{self, metadata_entries};
use super::health::{self, ServerInfo};
use super::query::{self, InstantQuery, RangeQuery};

/// Where an invocation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Name and arguments arrived from the transport.
    Received,
    /// Tool is enabled and arguments are well formed.
    Validated,
    /// Backend call in flight.
    Executing,
    /// Normalizing and annotating the raw result.
    Transforming,
    /// Result ready.
    Completed,
    /// Validation failed.
    Rejected,
    /// Backend call failed.
    Failed,
}

impl Stage {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Rejected | Stage::Failed)
    }

    fn can_advance_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Received, Stage::Validated)
                | (Stage::Received, Stage::Rejected)
                | (Stage::Validated, Stage::Executing)
                | (Stage::Executing, Stage::Transforming)
                | (Stage::Executing, Stage::Failed)
                | (Stage::Transforming, Stage::Completed)
        )
    }

    pub(crate) fn advance(&mut self, tool: &str, next: Stage) {
        debug_assert!(self.can_advance_to(next), "illegal transition {:?} -> {:?}", self, next);
        tracing::debug!(tool, from = ?*self, to = ?next, "stage");
        *self = next;
    }
}

/// Result of one invocation together with the stage it ended in.
#[derive(Debug)]
pub struct Outcome {
    /// Terminal stage
    pub stage: Stage,
    /// Tool result or error
    pub result: Result<JsonValue>,
}

/// A validated tool call, mapped to exactly one backend operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    /// `execute_query`
    Query(InstantQuery),
    /// `execute_range_query`
    RangeQuery(RangeQuery),
    /// `list_metrics`
    ListMetrics,
    /// `get_metric_metadata`
    MetricMetadata {
        /// Metric name
        metric: String,
    },
    /// `get_targets`
    Targets,
    /// `health_check`
    HealthCheck,
}

impl ToolRequest {
    /// Validate arguments for the tool `name`.
    pub fn parse(name: &str, args: &Map<String, JsonValue>) -> Result<Self> {
        match name {
            query::EXECUTE_QUERY => Ok(ToolRequest::Query(InstantQuery::parse(args)?)),
            query::EXECUTE_RANGE_QUERY => Ok(ToolRequest::RangeQuery(RangeQuery::parse(args)?)),
            discovery::LIST_METRICS => Ok(ToolRequest::ListMetrics),
            discovery::GET_METRIC_METADATA => Ok(ToolRequest::MetricMetadata {
                metric: discovery::parse_metric(args)?,
            }),
            discovery::GET_TARGETS => Ok(ToolRequest::Targets),
            health::HEALTH_CHECK => Ok(ToolRequest::HealthCheck),
            _ => Err(McpError::ToolDisabled(name.to_string())),
        }
    }

    /// Where timestamps sit in this request's backend response.
    pub fn shape(&self) -> Shape {
        match self {
            ToolRequest::Query(_) | ToolRequest::RangeQuery(_) => Shape::QueryData,
            _ => Shape::Opaque,
        }
    }

    /// Issue the single backend call for this request.
    pub async fn execute(&self, backend: &dyn Backend, info: &ServerInfo) -> Result<JsonValue> {
        match self {
            ToolRequest::Query(q) => {
                backend
                    .query(&q.expression, q.time.as_ref().map(|t| t.raw.as_str()))
                    .await
            }
            ToolRequest::RangeQuery(q) => {
                backend
                    .query_range(&q.expression, &q.start.raw, &q.end.raw, &q.step.raw)
                    .await
            }
            ToolRequest::ListMetrics => backend.list_metrics().await,
            ToolRequest::MetricMetadata { metric } => backend.metric_metadata(metric).await,
            ToolRequest::Targets => backend.list_targets().await,
            ToolRequest::HealthCheck => Ok(health::check(backend, info).await),
        }
    }

    pub(crate) fn report_started(&self, progress: &Progress) {
        match self {
            ToolRequest::RangeQuery(_) => progress.report(0, "Initiating range query..."),
            ToolRequest::ListMetrics => progress.report(0, "Fetching metrics list..."),
            _ => {}
        }
    }

    pub(crate) fn report_fetched(&self, progress: &Progress) {
        if let ToolRequest::RangeQuery(_) = self {
            progress.report(50, "Processing query results...");
        }
    }

    pub(crate) fn report_completed(&self, progress: &Progress, result: &JsonValue) {
        match self {
            ToolRequest::RangeQuery(_) => progress.report(PROGRESS_TOTAL, "Range query completed"),
            ToolRequest::ListMetrics => {
                let count = result.as_array().map_or(0, Vec::len);
                progress.report(PROGRESS_TOTAL, &format!("Found {} metrics", count));
            }
            _ => {}
        }
    }

    /// Normalize timestamps, then attach UI links where the tool has them.
    pub fn transform(&self, raw: JsonValue, annotator: &LinkAnnotator) -> JsonValue {
        let normalized = normalize(self.shape(), raw);
        match self {
            ToolRequest::Query(q) => annotator.annotate(normalized, &q.expression, &q.link_window()),
            ToolRequest::RangeQuery(q) => annotator.annotate(normalized, &q.expression, &q.link_window()),
            ToolRequest::MetricMetadata { .. } => metadata_entries(normalized),
            _ => normalized,
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
    fn test_parse_routes_by_name() {
        assert!(matches!(
            ToolRequest::parse("execute_query", &args(json!({"query": "up"}))).unwrap(),
            ToolRequest::Query(_)
        ));
        assert_eq!(ToolRequest::parse("get_targets", &Map::new()).unwrap(), ToolRequest::Targets);
        assert_eq!(
            ToolRequest::parse("get_metric_metadata", &args(json!({"metric": "up"}))).unwrap(),
            ToolRequest::MetricMetadata { metric: "up".into() }
        );
        assert!(matches!(
            ToolRequest::parse("drop_tables", &Map::new()),
            Err(McpError::ToolDisabled(_))
        ));
    }

    #[test]
    fn test_shape_contract() {
        assert_eq!(ToolRequest::ListMetrics.shape(), Shape::Opaque);
        assert_eq!(ToolRequest::Targets.shape(), Shape::Opaque);
        let q = ToolRequest::parse("execute_query", &args(json!({"query": "up"}))).unwrap();
        assert_eq!(q.shape(), Shape::QueryData);
    }

    #[test]
    fn test_stage_transitions() {
        assert!(Stage::Received.can_advance_to(Stage::Validated));
        assert!(Stage::Received.can_advance_to(Stage::Rejected));
        assert!(Stage::Executing.can_advance_to(Stage::Failed));
        assert!(!Stage::Validated.can_advance_to(Stage::Completed));
        assert!(!Stage::Completed.can_advance_to(Stage::Executing));
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Transforming.is_terminal());
    }

    #[test]
    fn test_transform_targets_untouched() {
        let annotator = LinkAnnotator::new(Some(url::Url::parse("http://prom:9090").unwrap()), true);
        let raw = json!({"activeTargets": [{"health": "up"}], "droppedTargets": []});
        assert_eq!(ToolRequest::Targets.transform(raw.clone(), &annotator), raw);
    }
}
