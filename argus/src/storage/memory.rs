// argus/src/storage/memory.rs
//
// In-process store. DashMap shards keep metric upserts and point inserts from
// different cycles off each other's locks; anomalies sit behind one RwLock
// since they are append-only and read in created_at order.
//
// Points older than the retention window are never read again, so they are
// refused on insert and pruned from each series an insert touches. Anomalies
// are kept for the query API for the life of the process.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::StorageError;
use crate::events::{Anomaly, AnomalyEvent, AnomalyId, AnomalyStatus, DataPoint, Metric, MetricId};
use crate::storage::Storage;

#[derive(Default)]
struct AnomalyLog {
    rows: Vec<Anomaly>,
    keys: HashSet<(MetricId, DateTime<Utc>)>,
}

pub struct MemoryStore {
    next_metric:  AtomicI64,
    next_anomaly: AtomicI64,
    metrics:      DashMap<String, Metric>,
    points:       DashMap<MetricId, BTreeMap<DateTime<Utc>, f64>>,
    anomalies:    RwLock<AnomalyLog>,
    retention:    Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_retention(Duration::hours(24))
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            next_metric:  AtomicI64::new(1),
            next_anomaly: AtomicI64::new(1),
            metrics:      DashMap::new(),
            points:       DashMap::new(),
            anomalies:    RwLock::new(AnomalyLog::default()),
            retention,
        }
    }

    #[cfg(test)]
    pub fn deactivate(&self, name: &str) {
        if let Some(mut m) = self.metrics.get_mut(name) {
            m.is_active = false;
        }
    }

    fn sorted(mut metrics: Vec<Metric>) -> Vec<Metric> {
        metrics.sort_by_key(|m| m.id);
        metrics
    }
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn upsert_metric(&self, name: &str, collected_at: DateTime<Utc>) -> Result<Metric, StorageError> {
        let mut metric = self.metrics.entry(name.to_string()).or_insert_with(|| Metric {
            id:                self.next_metric.fetch_add(1, Ordering::Relaxed),
            name:              name.to_string(),
            is_active:         true,
            last_collected_at: None,
        });
        metric.is_active         = true;
        metric.last_collected_at = Some(collected_at);
        Ok(metric.clone())
    }

    async fn active_metrics(&self) -> Result<Vec<Metric>, StorageError> {
        Ok(Self::sorted(
            self.metrics.iter().filter(|m| m.is_active).map(|m| m.clone()).collect(),
        ))
    }

    async fn all_metrics(&self) -> Result<Vec<Metric>, StorageError> {
        Ok(Self::sorted(self.metrics.iter().map(|m| m.clone()).collect()))
    }

    async fn insert_points(&self, points: &[DataPoint]) -> Result<usize, StorageError> {
        let known: HashSet<MetricId> = self.metrics.iter().map(|m| m.id).collect();
        if let Some(p) = points.iter().find(|p| !known.contains(&p.metric_id)) {
            return Err(StorageError::UnknownMetric(p.metric_id));
        }

        let cutoff       = Utc::now() - self.retention;
        let mut touched  = HashSet::new();
        let mut inserted = 0;
        for p in points.iter().filter(|p| p.timestamp >= cutoff) {
            let mut series = self.points.entry(p.metric_id).or_default();
            if !series.contains_key(&p.timestamp) {
                series.insert(p.timestamp, p.value);
                inserted += 1;
            }
            touched.insert(p.metric_id);
        }

        for id in touched {
            if let Some(mut series) = self.points.get_mut(&id) {
                let kept = series.split_off(&cutoff);
                *series  = kept;
            }
        }
        Ok(inserted)
    }

    async fn points_since(&self, metric_id: MetricId, since: DateTime<Utc>) -> Result<Vec<DataPoint>, StorageError> {
        Ok(self
            .points
            .get(&metric_id)
            .map(|series| {
                series
                    .range(since..)
                    .map(|(ts, v)| DataPoint { metric_id, timestamp: *ts, value: *v })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_anomaly(&self, event: &AnomalyEvent) -> Result<Anomaly, StorageError> {
        let mut log = self.anomalies.write();
        if !log.keys.insert((event.metric_id, event.timestamp)) {
            return Err(StorageError::Duplicate(format!(
                "anomaly for metric {} at {}",
                event.metric_id, event.timestamp
            )));
        }
        let id      = self.next_anomaly.fetch_add(1, Ordering::Relaxed);
        let anomaly = Anomaly::from_event(event.clone(), id, Utc::now());
        log.rows.push(anomaly.clone());
        Ok(anomaly)
    }

    async fn open_anomalies(&self, limit: usize) -> Result<Vec<Anomaly>, StorageError> {
        let log = self.anomalies.read();
        let mut open: Vec<Anomaly> = log
            .rows
            .iter()
            .filter(|a| a.status == AnomalyStatus::Open)
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        open.truncate(limit);
        Ok(open)
    }

    async fn anomaly(&self, id: AnomalyId) -> Result<Option<Anomaly>, StorageError> {
        Ok(self.anomalies.read().rows.iter().find(|a| a.id == id).cloned())
    }
}
