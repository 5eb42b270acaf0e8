//! Parsing of time and duration tool arguments.
//!
//! Prometheus accepts RFC 3339 or Unix seconds for times and its own duration
//! syntax (or float seconds) for steps. Arguments are validated here and then
//! forwarded to the backend exactly as the caller wrote them.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};

/// A validated point-in-time argument.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeArg {
    /// Value forwarded to Prometheus
    pub raw: String,
    /// Parsed instant
    pub at: DateTime<Utc>,
}

/// A validated query resolution step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Value forwarded to Prometheus
    pub raw: String,
    /// Step width in seconds
    pub seconds: f64,
}

/// Convert Unix epoch seconds to a UTC instant, keeping millisecond precision.
///
/// Digits below the millisecond are dropped, never rounded, so the whole
/// second is always `floor(epoch)`. Returns `None` for non-finite values or
/// instants outside chrono's range.
pub fn epoch_to_datetime(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() {
        return None;
    }
    let secs = epoch.floor();
    if secs < i64::MIN as f64 || secs >= i64::MAX as f64 {
        return None;
    }
    let millis = (((epoch - secs) * 1000.0).floor() as u32).min(999);
    DateTime::from_timestamp(secs as i64, millis * 1_000_000)
}

/// Parse a time argument given as RFC 3339 text or Unix seconds.
pub fn parse_time(name: &str, value: &JsonValue) -> Result<TimeArg> {
    let invalid = |reason: &str| McpError::InvalidArg {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let (raw, at) = match value {
        JsonValue::Number(n) => {
            let epoch = n.as_f64().ok_or_else(|| invalid("number out of range"))?;
            let at = epoch_to_datetime(epoch).ok_or_else(|| invalid("timestamp out of range"))?;
            (n.to_string(), at)
        }
        JsonValue::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Err(invalid("must not be empty"));
            }
            let at = if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                dt.with_timezone(&Utc)
            } else if let Ok(epoch) = s.parse::<f64>() {
                epoch_to_datetime(epoch).ok_or_else(|| invalid("timestamp out of range"))?
            } else {
                return Err(invalid("expected RFC 3339 time or Unix timestamp"));
            };
            (s.to_string(), at)
        }
        _ => return Err(invalid("expected RFC 3339 time or Unix timestamp")),
    };

    Ok(TimeArg { raw, at })
}

/// Parse a step argument given as a Prometheus duration or float seconds.
pub fn parse_step(name: &str, value: &JsonValue) -> Result<Step> {
    let invalid = |reason: &str| McpError::InvalidArg {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let (raw, seconds) = match value {
        JsonValue::Number(n) => {
            let seconds = n.as_f64().ok_or_else(|| invalid("number out of range"))?;
            (n.to_string(), seconds)
        }
        JsonValue::String(s) => {
            let s = s.trim();
            let seconds = match s.parse::<f64>() {
                Ok(seconds) => seconds,
                Err(_) => parse_duration(s).ok_or_else(|| {
                    invalid("expected a duration such as 15s, 1m or 1h30m, or a number of seconds")
                })?,
            };
            (s.to_string(), seconds)
        }
        _ => return Err(invalid("expected a duration string or number of seconds")),
    };

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(invalid("must be greater than zero"));
    }

    Ok(Step { raw, seconds })
}

/// Units in the order Prometheus requires them, with their width in seconds.
const DURATION_UNITS: [(&str, f64); 7] = [
    ("y", 365.0 * 86_400.0),
    ("w", 7.0 * 86_400.0),
    ("d", 86_400.0),
    ("h", 3_600.0),
    ("m", 60.0),
    ("s", 1.0),
    ("ms", 0.001),
];

/// Parse a Prometheus duration such as `1h30m` or `500ms` into seconds.
pub fn parse_duration(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }

    let mut rest = s;
    let mut total = 0.0;
    let mut next_unit = 0;

    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let amount: f64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let idx = DURATION_UNITS.iter().position(|(u, _)| *u == unit)?;
        if idx < next_unit {
            return None;
        }
        next_unit = idx + 1;
        total += amount * DURATION_UNITS[idx].1;
        rest = &rest[unit_len..];
    }

    Some(total)
}

/// Fetch a required non-empty string argument.
pub fn get_string_arg(args: &Map<String, JsonValue>, name: &str) -> Result<String> {
    match args.get(name) {
        None | Some(JsonValue::Null) => Err(McpError::MissingArg(name.to_string())),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Err(McpError::InvalidArg {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        }),
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(_) => Err(McpError::InvalidArg {
            name: name.to_string(),
            reason: "expected a string".to_string(),
        }),
    }
}

/// Fetch a required argument without interpreting it.
pub fn get_arg<'a>(args: &'a Map<String, JsonValue>, name: &str) -> Result<&'a JsonValue> {
    match args.get(name) {
        None | Some(JsonValue::Null) => Err(McpError::MissingArg(name.to_string())),
        Some(value) => Ok(value),
    }
}

/// Fetch an optional argument, treating `null` as absent.
pub fn get_optional_arg<'a>(args: &'a Map<String, JsonValue>, name: &str) -> Option<&'a JsonValue> {
    args.get(name).filter(|v| !v.is_null())
}
