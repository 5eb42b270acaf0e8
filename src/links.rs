//! Prometheus UI deep links for query results.

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use url::Url;

use crate::client::join_path;
use crate::config::Config;

/// Key under which links are attached to a result.
pub const LINKS_KEY: &str = "links";

const UI_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time window of the query a link should reproduce.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkWindow {
    /// Instant query, optionally pinned to a moment.
    Instant {
        /// Evaluation time, `None` for "now"
        time: Option<DateTime<Utc>>,
    },
    /// Range query.
    Range {
        /// Window start
        start: DateTime<Utc>,
        /// Window end
        end: DateTime<Utc>,
        /// Resolution in seconds
        step_seconds: f64,
    },
}

/// Attaches Prometheus UI links to query results.
#[derive(Debug, Clone)]
pub struct LinkAnnotator {
    base_url: Option<Url>,
    enabled: bool,
}

impl LinkAnnotator {
    /// Create an annotator. Without a base URL it never adds anything.
    pub fn new(base_url: Option<Url>, enabled: bool) -> Self {
        Self { base_url, enabled }
    }

    /// Build from the server configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Some(config.prometheus_url.clone()), !config.disable_links)
    }

    /// Whether `annotate` will add links.
    pub fn is_active(&self) -> bool {
        self.enabled && self.base_url.is_some()
    }

    /// Build the UI URL for `expression` over `window`.
    pub fn graph_url(&self, expression: &str, window: &LinkWindow) -> Option<Url> {
        let base = self.base_url.as_ref()?;
        let mut url = join_path(base, "graph");
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("g0.expr", expression);
            match window {
                LinkWindow::Instant { time } => {
                    qp.append_pair("g0.tab", "1");
                    if let Some(time) = time {
                        qp.append_pair("g0.moment_input", &time.format(UI_INPUT_FORMAT).to_string());
                    }
                }
                LinkWindow::Range {
                    start,
                    end,
                    step_seconds,
                } => {
                    let range = (*end - *start).num_seconds().max(1);
                    qp.append_pair("g0.tab", "0");
                    qp.append_pair("g0.range_input", &format!("{}s", range));
                    qp.append_pair("g0.end_input", &end.format(UI_INPUT_FORMAT).to_string());
                    qp.append_pair("g0.step_input", &step_seconds.to_string());
                }
            }
        }
        Some(url)
    }

    /// Add a `links` entry to the top level of `result`.
    ///
    /// Existing fields are never modified; non-object results pass through.
    pub fn annotate(&self, mut result: JsonValue, expression: &str, window: &LinkWindow) -> JsonValue {
        if !self.enabled {
            return result;
        }
        let Some(obj) = result.as_object_mut() else {
            return result;
        };
        if obj.contains_key(LINKS_KEY) {
            return result;
        }
        if let Some(url) = self.graph_url(expression, window) {
            obj.insert(
                LINKS_KEY.to_string(),
                json!([{
                    "href": url.as_str(),
                    "rel": "prometheus-ui",
                    "title": "View in Prometheus UI"
                }]),
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn annotator(base: &str) -> LinkAnnotator {
        LinkAnnotator::new(Some(Url::parse(base).unwrap()), true)
    }

    fn query_pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
    }

    #[test]
    fn test_instant_link() {
        let out = annotator("http://prom:9090").annotate(
            json!({"resultType": "vector", "result": []}),
            "up",
            &LinkWindow::Instant { time: None },
        );
        let link = &out["links"][0];
        assert_eq!(link["rel"], "prometheus-ui");
        let href = Url::parse(link["href"].as_str().unwrap()).unwrap();
        assert_eq!(href.path(), "/graph");
        let pairs = query_pairs(&href);
        assert!(pairs.contains(&("g0.expr".into(), "up".into())));
        assert!(pairs.contains(&("g0.tab".into(), "1".into())));
        assert_eq!(out["resultType"], "vector");
    }

    #[test]
    fn test_instant_link_with_time() {
        let time = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let url = annotator("http://prom:9090")
            .graph_url("up", &LinkWindow::Instant { time: Some(time) })
            .unwrap();
        assert!(query_pairs(&url).contains(&("g0.moment_input".into(), "2023-01-01 00:00:00".into())));
    }

    #[test]
    fn test_range_link() {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 1, 1, 1, 0, 0).unwrap();
        let url = annotator("https://prom.example.com/prometheus/")
            .graph_url(
                "rate(http_requests_total{job=\"api\"}[5m])",
                &LinkWindow::Range {
                    start,
                    end,
                    step_seconds: 15.0,
                },
            )
            .unwrap();
        assert_eq!(url.path(), "/prometheus/graph");
        let pairs = query_pairs(&url);
        assert!(pairs.contains(&("g0.expr".into(), "rate(http_requests_total{job=\"api\"}[5m])".into())));
        assert!(pairs.contains(&("g0.tab".into(), "0".into())));
        assert!(pairs.contains(&("g0.range_input".into(), "3600s".into())));
        assert!(pairs.contains(&("g0.end_input".into(), "2023-01-01 01:00:00".into())));
        assert!(pairs.contains(&("g0.step_input".into(), "15".into())));
    }

    #[test]
    fn test_disabled_is_identity() {
        let input = json!({"resultType": "vector", "result": []});
        let a = LinkAnnotator::new(Some(Url::parse("http://prom:9090").unwrap()), false);
        assert_eq!(a.annotate(input.clone(), "up", &LinkWindow::Instant { time: None }), input);
        assert!(!a.is_active());
    }

    #[test]
    fn test_missing_base_url_is_identity() {
        let input = json!({"resultType": "vector", "result": []});
        let a = LinkAnnotator::new(None, true);
        assert_eq!(a.annotate(input.clone(), "up", &LinkWindow::Instant { time: None }), input);
    }

    #[test]
    fn test_existing_links_field_kept() {
        let input = json!({"links": "mine"});
        let out = annotator("http://prom:9090").annotate(input.clone(), "up", &LinkWindow::Instant { time: None });
        assert_eq!(out, input);
    }

    #[test]
    fn test_non_object_passthrough() {
        let input = json!(["a", "b"]);
        let out = annotator("http://prom:9090").annotate(input.clone(), "up", &LinkWindow::Instant { time: None });
        assert_eq!(out, input);
    }
}
