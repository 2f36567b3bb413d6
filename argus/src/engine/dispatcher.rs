// argus/src/engine/dispatcher.rs
//
// Fans one detected anomaly out to its three effects, in order:
//
//   persist  → storage (duplicates and failures stop here, silently)
//   publish  → event hub, as an `anomaly_detected` envelope
//   alert    → alert sink; failures are logged and counted only
//
// Publish and alert are independent best-effort effects: neither waits on
// the other, and neither can undo the persisted row.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::events::{Anomaly, AnomalyEvent, AnomalyMessage, Metric};
use crate::hub::HubHandle;
use crate::storage::Storage;
use crate::telemetry::Telemetry;
use crate::upstream::{Alert, AlertSink};

pub struct Dispatcher {
    store:     Arc<dyn Storage>,
    hub:       HubHandle,
    alerts:    Arc<dyn AlertSink>,
    telemetry: Arc<Telemetry>,
}

impl Dispatcher {
    pub fn new(
        store:     Arc<dyn Storage>,
        hub:       HubHandle,
        alerts:    Arc<dyn AlertSink>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self { store, hub, alerts, telemetry }
    }

    /// Returns the persisted anomaly, or None if persistence was skipped.
    pub async fn dispatch(&self, metric: &Metric, event: AnomalyEvent) -> Option<Anomaly> {
        let anomaly = match self.store.insert_anomaly(&event).await {
            Ok(a) => a,
            Err(e) if e.is_duplicate() => {
                debug!(metric = %metric.name, ts = %event.timestamp, "anomaly already recorded");
                return None;
            }
            Err(e) => {
                debug!(metric = %metric.name, "anomaly not persisted: {}", e);
                return None;
            }
        };

        self.telemetry.record_anomaly(anomaly.severity);
        info!(
            metric   = %metric.name,
            id       = anomaly.id,
            severity = %anomaly.severity,
            score    = anomaly.score,
            "anomaly recorded"
        );

        self.hub.publish(&AnomalyMessage::detected(&anomaly, &metric.name));

        let alert = Alert {
            metric_name: metric.name.clone(),
            value:       anomaly.value,
            score:       anomaly.score,
            severity:    anomaly.severity,
        };
        if let Err(e) = self.alerts.send_alert(&alert).await {
            Telemetry::incr(&self.telemetry.alert_failures);
            warn!(metric = %metric.name, id = anomaly.id, "alert failed: {}", e);
        }

        Some(anomaly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::events::Severity;
    use crate::hub::EventHub;
    use crate::storage::MemoryStore;
    use crate::testing::RecordingSink;
    use chrono::Utc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn duplicate_is_persisted_published_and_alerted_once() {
        let telemetry     = Telemetry::new();
        let (hub, handle) = EventHub::new(&HubConfig::default(), Arc::clone(&telemetry));
        let cancel        = CancellationToken::new();
        tokio::spawn(hub.run(cancel.clone()));
        let (_reg, mut rx) = handle.subscribe();

        let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
        let sink   = Arc::new(RecordingSink::default());
        let metric = store.upsert_metric("cpu_usage", Utc::now()).await.unwrap();
        let d      = Dispatcher::new(Arc::clone(&store), handle, sink.clone(), Arc::clone(&telemetry));

        let event = AnomalyEvent {
            metric_id:         metric.id,
            timestamp:         Utc::now(),
            value:             99.0,
            score:             0.9,
            detection_methods: vec!["zscore".into()],
            severity:          Severity::Critical,
        };
        assert!(d.dispatch(&metric, event.clone()).await.is_some());
        assert!(d.dispatch(&metric, event).await.is_none());

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(frame.contains("\"metric_name\":\"cpu_usage\""));
        assert!(tokio::time::timeout(Duration::from_millis(50), rx.recv()).await.is_err());
        assert_eq!(sink.alerts().len(), 1);
        assert_eq!(telemetry.anomalies_critical.load(Ordering::Relaxed), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn alert_failure_keeps_the_anomaly() {
        let telemetry   = Telemetry::new();
        let (_hub, hub) = EventHub::new(&HubConfig::default(), Arc::clone(&telemetry));
        let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
        let sink   = Arc::new(RecordingSink::failing());
        let metric = store.upsert_metric("disk_io", Utc::now()).await.unwrap();
        let d      = Dispatcher::new(Arc::clone(&store), hub, sink, Arc::clone(&telemetry));

        let event = AnomalyEvent {
            metric_id:         metric.id,
            timestamp:         Utc::now(),
            value:             1.0,
            score:             0.55,
            detection_methods: vec![],
            severity:          Severity::Medium,
        };
        assert!(d.dispatch(&metric, event).await.is_some());
        assert_eq!(store.open_anomalies(10).await.unwrap().len(), 1);
        assert_eq!(telemetry.alert_failures.load(Ordering::Relaxed), 1);
    }
}
