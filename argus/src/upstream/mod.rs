// argus/src/upstream/mod.rs
//
// Outbound integrations behind traits, so cycles can be driven by fakes in
// tests and by HTTP adapters in production.
//
//   prometheus — TimeSeriesSource over the Prometheus HTTP API
//   ml         — DetectionService over the ML service's POST /detect
//   slack      — AlertSink posting Block Kit messages to a webhook

pub mod ml;
pub mod prometheus;
pub mod slack;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;
use crate::events::{MetricId, Severity};

pub use ml::DetectionClient;
pub use prometheus::PrometheusClient;
pub use slack::SlackSink;

#[async_trait]
pub trait TimeSeriesSource: Send + Sync {
    async fn list_names(&self) -> Result<Vec<String>, UpstreamError>;

    /// Current sample for `name` as the source's decimal string, or None if
    /// the series has no sample right now.
    async fn query(&self, name: &str) -> Result<Option<String>, UpstreamError>;
}

// ── Detection service wire types ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRequest {
    pub metric_id:   MetricId,
    pub metric_name: String,
    /// Unix seconds, ascending.
    pub timestamps:  Vec<i64>,
    pub values:      Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedAnomaly {
    pub timestamp: i64,
    pub value:     f64,
    pub score:     f64,
    #[serde(default)]
    pub methods:   Vec<String>,
}

impl DetectedAnomaly {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// `total_points` and `anomalies` are the contract; the rest are echoes some
/// services add and nothing here reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub total_points:  usize,
    #[serde(default)]
    pub anomalies:     Vec<DetectedAnomaly>,
    #[serde(default)]
    pub metric_id:     MetricId,
    #[serde(default)]
    pub metric_name:   String,
    #[serde(default)]
    pub anomaly_count: usize,
}

#[async_trait]
pub trait DetectionService: Send + Sync {
    async fn detect(&self, request: &DetectionRequest) -> Result<DetectionResponse, UpstreamError>;
}

// ── Alerts ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub metric_name: String,
    pub value:       f64,
    pub score:       f64,
    pub severity:    Severity,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<(), UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_needs_only_point_count_and_anomalies() {
        let raw = r#"{"total_points":12,"anomalies":[{"timestamp":1700000000,"value":9.9,"score":0.8,"methods":["zscore"]}]}"#;
        let resp: DetectionResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(resp.total_points, 12);
        assert_eq!(resp.anomalies.len(), 1);
        assert_eq!(resp.anomalies[0].score, 0.8);
        assert_eq!(resp.anomalies[0].methods, vec!["zscore"]);
        assert_eq!(resp.anomalies[0].time().map(|t| t.timestamp()), Some(1_700_000_000));
        assert!(resp.metric_name.is_empty());
    }

    #[test]
    fn response_without_anomalies_is_empty_not_an_error() {
        let resp: DetectionResponse = serde_json::from_str(r#"{"total_points":3}"#).unwrap();
        assert!(resp.anomalies.is_empty());
    }
}
