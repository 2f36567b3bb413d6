// argus/src/workers/detector.rs
//
// Detection cycle. For each active metric, independently:
//
//   1. read the lookback window (ascending)
//   2. skip metrics with too little history, without a remote call
//   3. ask the detection service for anomalous points
//   4. classify each, then hand it to the dispatcher (persist/publish/alert)
//
// A failing metric is logged and counted; the cycle moves on to the next.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::engine::{dispatcher::Dispatcher, severity};
use crate::error::DetectError;
use crate::events::{AnomalyEvent, Metric};
use crate::storage::Storage;
use crate::telemetry::Telemetry;
use crate::upstream::{DetectionRequest, DetectionService};
use crate::workers::Cycle;

pub struct Detector {
    store:      Arc<dyn Storage>,
    detection:  Arc<dyn DetectionService>,
    dispatcher: Dispatcher,
    telemetry:  Arc<Telemetry>,
    config:     DetectorConfig,
}

impl Detector {
    pub fn new(
        store:      Arc<dyn Storage>,
        detection:  Arc<dyn DetectionService>,
        dispatcher: Dispatcher,
        telemetry:  Arc<Telemetry>,
        config:     DetectorConfig,
    ) -> Self {
        Self { store, detection, dispatcher, telemetry, config }
    }

    /// Returns how many anomalies were newly recorded for `metric`.
    async fn detect_one(&self, metric: &Metric, now: DateTime<Utc>) -> Result<usize, DetectError> {
        let points = self.store.points_since(metric.id, now - self.config.lookback()).await?;
        if points.len() < self.config.min_points {
            debug!(metric = %metric.name, points = points.len(), "not enough history, skipping");
            return Ok(0);
        }

        let request = DetectionRequest {
            metric_id:   metric.id,
            metric_name: metric.name.clone(),
            timestamps:  points.iter().map(|p| p.timestamp.timestamp()).collect(),
            values:      points.iter().map(|p| p.value).collect(),
        };
        let response = self.detection.detect(&request).await?;

        let mut recorded = 0;
        for found in response.anomalies {
            let Some(timestamp) = found.time() else {
                debug!(metric = %metric.name, ts = found.timestamp, "anomaly with unrepresentable timestamp");
                continue;
            };
            let event = AnomalyEvent {
                metric_id:         metric.id,
                timestamp,
                value:             found.value,
                score:             found.score,
                detection_methods: found.methods,
                severity:          severity::classify(found.score),
            };
            if self.dispatcher.dispatch(metric, event).await.is_some() {
                recorded += 1;
            }
        }
        Ok(recorded)
    }
}

#[async_trait]
impl Cycle for Detector {
    fn name(&self) -> &'static str { "detector" }

    async fn run_cycle(&self, cancel: &CancellationToken) {
        Telemetry::incr(&self.telemetry.detection_cycles);

        let metrics = match self.store.active_metrics().await {
            Ok(m) => m,
            Err(e) => {
                warn!("failed to list active metrics: {}", e);
                return;
            }
        };

        let now          = Utc::now();
        let mut recorded = 0usize;
        let mut failed   = 0usize;
        for metric in &metrics {
            if cancel.is_cancelled() {
                debug!("detection interrupted by shutdown");
                break;
            }
            match self.detect_one(metric, now).await {
                Ok(n) => recorded += n,
                Err(e) => {
                    failed += 1;
                    Telemetry::incr(&self.telemetry.detection_failures);
                    warn!(metric = %metric.name, "detection failed: {}", e);
                }
            }
        }

        info!(metrics = metrics.len(), anomalies = recorded, failed, "detection cycle complete");
    }
}
