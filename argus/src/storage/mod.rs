// argus/src/storage/mod.rs
//
// Storage contract shared by the collection and detection cycles and the
// query API. Implementations are stateless handles, safe to share across
// tasks behind an Arc.
//
//   MemoryStore — DashMap-backed, used when no database is configured and in tests
//   PgStore     — PostgreSQL via sqlx

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::events::{Anomaly, AnomalyEvent, AnomalyId, DataPoint, Metric, MetricId};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Create the metric if missing, reactivate it if inactive, and stamp
    /// `last_collected_at`.
    async fn upsert_metric(&self, name: &str, collected_at: DateTime<Utc>) -> Result<Metric, StorageError>;

    async fn active_metrics(&self) -> Result<Vec<Metric>, StorageError>;

    async fn all_metrics(&self) -> Result<Vec<Metric>, StorageError>;

    /// Idempotent on (metric_id, timestamp). Returns how many points were new.
    async fn insert_points(&self, points: &[DataPoint]) -> Result<usize, StorageError>;

    /// Points at or after `since`, ascending by timestamp.
    async fn points_since(&self, metric_id: MetricId, since: DateTime<Utc>) -> Result<Vec<DataPoint>, StorageError>;

    /// Append an anomaly with status `open`. A second anomaly for the same
    /// (metric_id, timestamp) fails with `StorageError::Duplicate`.
    async fn insert_anomaly(&self, event: &AnomalyEvent) -> Result<Anomaly, StorageError>;

    /// Open anomalies, newest `created_at` first.
    async fn open_anomalies(&self, limit: usize) -> Result<Vec<Anomaly>, StorageError>;

    async fn anomaly(&self, id: AnomalyId) -> Result<Option<Anomaly>, StorageError>;
}
