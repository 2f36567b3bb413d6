// argus/src/testing.rs
//
// In-crate fakes for the upstream traits, shared by cycle and dispatcher tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::UpstreamError;
use crate::upstream::{
    Alert, AlertSink, DetectedAnomaly, DetectionRequest, DetectionResponse, DetectionService, TimeSeriesSource,
};

// ── Source ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSource {
    names:   Vec<String>,
    samples: HashMap<String, String>,
    failing: HashSet<String>,
    queried: Mutex<Vec<String>>,
}

impl FakeSource {
    /// Series listed in the given order; each has the given sample string.
    pub fn with(samples: &[(&str, &str)]) -> Self {
        Self {
            names:   samples.iter().map(|(n, _)| n.to_string()).collect(),
            samples: samples.iter().map(|(n, v)| (n.to_string(), v.to_string())).collect(),
            ..Self::default()
        }
    }

    /// Listed but without a current sample.
    pub fn absent(mut self, name: &str) -> Self {
        self.names.push(name.to_string());
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().clone()
    }
}

#[async_trait]
impl TimeSeriesSource for FakeSource {
    async fn list_names(&self) -> Result<Vec<String>, UpstreamError> {
        Ok(self.names.clone())
    }

    async fn query(&self, name: &str) -> Result<Option<String>, UpstreamError> {
        self.queried.lock().push(name.to_string());
        if self.failing.contains(name) {
            return Err(UpstreamError::Status { service: "fake-source", status: 503 });
        }
        Ok(self.samples.get(name).cloned())
    }
}

// ── Detection ─────────────────────────────────────────────────────────────────

/// Flags the newest point of each named metric with the configured score.
#[derive(Default)]
pub struct FakeDetection {
    scores:   HashMap<String, f64>,
    failing:  HashSet<String>,
    requests: Mutex<Vec<DetectionRequest>>,
}

impl FakeDetection {
    pub fn scoring(mut self, name: &str, score: f64) -> Self {
        self.scores.insert(name.to_string(), score);
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn requests(&self) -> Vec<DetectionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DetectionService for FakeDetection {
    async fn detect(&self, request: &DetectionRequest) -> Result<DetectionResponse, UpstreamError> {
        self.requests.lock().push(request.clone());
        if self.failing.contains(&request.metric_name) {
            return Err(UpstreamError::Status { service: "fake-detection", status: 500 });
        }

        let anomalies: Vec<DetectedAnomaly> = self
            .scores
            .get(&request.metric_name)
            .and_then(|score| {
                let ts    = *request.timestamps.last()?;
                let value = *request.values.last()?;
                Some(DetectedAnomaly { timestamp: ts, value, score: *score, methods: vec!["zscore".into()] })
            })
            .into_iter()
            .collect();

        Ok(DetectionResponse {
            metric_id:     request.metric_id,
            metric_name:   request.metric_name.clone(),
            total_points:  request.values.len(),
            anomaly_count: anomalies.len(),
            anomalies,
        })
    }
}

// ── Alerts ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    fail:   bool,
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send_alert(&self, alert: &Alert) -> Result<(), UpstreamError> {
        self.alerts.lock().push(alert.clone());
        if self.fail {
            return Err(UpstreamError::Status { service: "fake-alerts", status: 500 });
        }
        Ok(())
    }
}
