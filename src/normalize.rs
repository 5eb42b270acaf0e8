//! Timestamp normalization for Prometheus responses.
//!
//! Timestamps are found by position in the response schema, never by
//! guessing which numbers look like epochs. A metric value of `1617898448`
//! stays a metric value.

use serde_json::Value as JsonValue;

use crate::timeparse::epoch_to_datetime;

/// Schema contract describing where a backend response carries timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `data` of `/api/v1/query` and `/api/v1/query_range`:
    /// `{ "resultType": ..., "result": ... }`.
    QueryData,
    /// Listings and metadata without sample pairs.
    Opaque,
}

/// Render Unix epoch seconds as `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Fractional seconds are truncated, so `x.9996` stays in second `x`.
/// Returns `None` when the value cannot be represented.
pub fn epoch_to_iso(epoch: f64) -> Option<String> {
    epoch_to_datetime(epoch).map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// Rewrite every timestamp at the positions `shape` declares.
pub fn normalize(shape: Shape, mut value: JsonValue) -> JsonValue {
    match shape {
        Shape::QueryData => normalize_query_data(&mut value),
        Shape::Opaque => {}
    }
    value
}

fn normalize_query_data(data: &mut JsonValue) {
    let Some(obj) = data.as_object_mut() else {
        return;
    };
    let result_type = obj
        .get("resultType")
        .and_then(|v| v.as_str())
        .map(str::to_owned);
    let Some(result) = obj.get_mut("result") else {
        return;
    };

    match result_type.as_deref() {
        Some("vector") => {
            for series in series_mut(result) {
                if let Some(sample) = series.get_mut("value") {
                    convert_pair(sample);
                }
                if let Some(sample) = series.get_mut("histogram") {
                    convert_pair(sample);
                }
            }
        }
        Some("matrix") => {
            for series in series_mut(result) {
                for key in ["values", "histograms"] {
                    if let Some(JsonValue::Array(samples)) = series.get_mut(key) {
                        samples.iter_mut().for_each(convert_pair);
                    }
                }
            }
        }
        Some("scalar") | Some("string") => convert_pair(result),
        _ => {}
    }
}

fn series_mut(result: &mut JsonValue) -> impl Iterator<Item = &mut serde_json::Map<String, JsonValue>> {
    result
        .as_array_mut()
        .into_iter()
        .flatten()
        .filter_map(|s| s.as_object_mut())
}

/// Convert the first element of a `[timestamp, value]` pair in place.
fn convert_pair(pair: &mut JsonValue) {
    let JsonValue::Array(items) = pair else {
        return;
    };
    if items.len() != 2 {
        return;
    }
    if let Some(iso) = items[0].as_f64().and_then(epoch_to_iso) {
        items[0] = JsonValue::String(iso);
    }
}
