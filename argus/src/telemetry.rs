// argus/src/telemetry.rs
//
// Operational counters, rendered in Prometheus text exposition format and
// served by the query API at GET /metrics.
//
//   argus_collection_cycles_total        Counter — collection ticks run
//   argus_detection_cycles_total         Counter — detection ticks run
//   argus_points_stored_total            Counter — new data points written
//   argus_samples_skipped_total          Counter — series skipped (absent/malformed/failed)
//   argus_detection_failures_total       Counter — per-metric detection failures
//   argus_anomalies_total{severity}      Counter — anomalies persisted, by severity
//   argus_alert_failures_total           Counter — alert sink errors
//   argus_events_published_total         Counter — events handed to the hub
//   argus_subscribers_connected          Gauge   — live WebSocket subscribers
//   argus_subscribers_dropped_total      Counter — subscribers evicted for a full queue
//   argus_subscribers_disconnected_total Counter — subscribers that went away on their own

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::events::Severity;

#[derive(Debug, Default)]
pub struct Telemetry {
    pub collection_cycles:        AtomicU64,
    pub detection_cycles:         AtomicU64,
    pub points_stored:            AtomicU64,
    pub samples_skipped:          AtomicU64,
    pub detection_failures:       AtomicU64,
    pub anomalies_critical:       AtomicU64,
    pub anomalies_high:           AtomicU64,
    pub anomalies_medium:         AtomicU64,
    pub anomalies_low:            AtomicU64,
    pub alert_failures:           AtomicU64,
    pub events_published:         AtomicU64,
    pub subscribers:              AtomicU64,
    pub subscribers_dropped:      AtomicU64,
    pub subscribers_disconnected: AtomicU64,
}

impl Telemetry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_anomaly(&self, severity: Severity) {
        match severity {
            Severity::Critical => Self::incr(&self.anomalies_critical),
            Severity::High     => Self::incr(&self.anomalies_high),
            Severity::Medium   => Self::incr(&self.anomalies_medium),
            Severity::Low      => Self::incr(&self.anomalies_low),
        }
    }

    pub fn set_subscribers(&self, n: usize) {
        self.subscribers.store(n as u64, Ordering::Relaxed);
    }

    /// Render in Prometheus text exposition format.
    pub fn prometheus_text(&self) -> String {
        let mut out = String::with_capacity(2048);

        macro_rules! metric {
            ($kind:expr, $name:expr, $help:expr, $val:expr) => {
                out.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $kind, $name, $val.load(Ordering::Relaxed)
                ));
            };
        }

        metric!("counter", "argus_collection_cycles_total",
                "Collection cycles run", self.collection_cycles);
        metric!("counter", "argus_detection_cycles_total",
                "Detection cycles run", self.detection_cycles);
        metric!("counter", "argus_points_stored_total",
                "Data points written to storage", self.points_stored);
        metric!("counter", "argus_samples_skipped_total",
                "Series skipped during collection", self.samples_skipped);
        metric!("counter", "argus_detection_failures_total",
                "Per-metric detection failures", self.detection_failures);

        out.push_str("# HELP argus_anomalies_total Anomalies persisted by severity\n");
        out.push_str("# TYPE argus_anomalies_total counter\n");
        for (label, counter) in [
            ("critical", &self.anomalies_critical),
            ("high",     &self.anomalies_high),
            ("medium",   &self.anomalies_medium),
            ("low",      &self.anomalies_low),
        ] {
            out.push_str(&format!(
                "argus_anomalies_total{{severity=\"{}\"}} {}\n",
                label,
                counter.load(Ordering::Relaxed)
            ));
        }

        metric!("counter", "argus_alert_failures_total",
                "Alert sink failures", self.alert_failures);
        metric!("counter", "argus_events_published_total",
                "Anomaly events handed to the hub", self.events_published);
        metric!("gauge", "argus_subscribers_connected",
                "Live WebSocket subscribers", self.subscribers);
        metric!("counter", "argus_subscribers_dropped_total",
                "Subscribers evicted for a saturated queue", self.subscribers_dropped);
        metric!("counter", "argus_subscribers_disconnected_total",
                "Subscribers removed after their session ended", self.subscribers_disconnected);

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_counters_and_severity_labels() {
        let t = Telemetry::new();
        Telemetry::incr(&t.collection_cycles);
        Telemetry::add(&t.points_stored, 4);
        t.record_anomaly(Severity::Critical);
        t.record_anomaly(Severity::Critical);
        t.record_anomaly(Severity::Low);
        t.set_subscribers(3);

        let text = t.prometheus_text();
        assert!(text.contains("argus_collection_cycles_total 1\n"));
        assert!(text.contains("argus_points_stored_total 4\n"));
        assert!(text.contains("argus_anomalies_total{severity=\"critical\"} 2\n"));
        assert!(text.contains("argus_anomalies_total{severity=\"low\"} 1\n"));
        assert!(text.contains("# TYPE argus_subscribers_connected gauge\n"));
        assert!(text.contains("argus_subscribers_connected 3\n"));
        assert!(text.contains("argus_subscribers_disconnected_total 0\n"));
    }
}
