//! Metric and target discovery tools.
//!
//! Tools: list_metrics, get_metric_metadata, get_targets

use serde_json::{Map, Value as JsonValue};

use crate::error::Result;
use crate::schema;
use crate::timeparse::get_string_arg;
use crate::tools::ToolDef;

/// Tool name for listing metric names.
pub const LIST_METRICS: &str = "list_metrics";
/// Tool name for metric metadata.
pub const GET_METRIC_METADATA: &str = "get_metric_metadata";
/// Tool name for scrape targets.
pub const GET_TARGETS: &str = "get_targets";

/// Get all discovery tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            LIST_METRICS,
            "List the names of all metrics known to Prometheus.",
            schema!(object {}),
        ),
        ToolDef::new(
            GET_METRIC_METADATA,
            "Get type, help text and unit for a metric. Returns a list of metadata entries.",
            schema!(object {
                required: { "metric": string }
            }),
        ),
        ToolDef::new(
            GET_TARGETS,
            "Get information about all scrape targets, split into activeTargets and droppedTargets.",
            schema!(object {}),
        ),
    ]
}

/// Validate the `metric` argument.
pub fn parse_metric(args: &Map<String, JsonValue>) -> Result<String> {
    get_string_arg(args, "metric")
}

/// Flatten a metadata response into a list of entries.
///
/// Prometheus answers `{ "<metric>": [ {type, help, unit}, ... ] }`; each
/// entry gains a `metric` field. Payloads wrapped in `metadata` or `data`
/// are unwrapped and a lone object becomes a one-element list.
pub fn metadata_entries(data: JsonValue) -> JsonValue {
    let data = match data {
        JsonValue::Object(mut obj) if obj.contains_key("metadata") => {
            obj.remove("metadata").unwrap_or(JsonValue::Null)
        }
        JsonValue::Object(mut obj) if obj.contains_key("data") => obj.remove("data").unwrap_or(JsonValue::Null),
        other => other,
    };

    let entries = match data {
        JsonValue::Null => Vec::new(),
        JsonValue::Array(entries) => entries,
        JsonValue::Object(obj) if obj.values().all(JsonValue::is_array) => obj
            .into_iter()
            .flat_map(|(metric, entries)| {
                let entries = match entries {
                    JsonValue::Array(entries) => entries,
                    _ => Vec::new(),
                };
                entries.into_iter().map(move |entry| match entry {
                    JsonValue::Object(mut fields) => {
                        fields
                            .entry("metric")
                            .or_insert_with(|| JsonValue::String(metric.clone()));
                        JsonValue::Object(fields)
                    }
                    other => other,
                })
            })
            .collect(),
        other => vec![other],
    };

    JsonValue::Array(entries)
}
