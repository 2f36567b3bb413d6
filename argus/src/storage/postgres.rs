// argus/src/storage/postgres.rs
//
// PostgreSQL store. Schema is created on connect if missing. Every call runs
// under the configured query timeout; a timed-out call surfaces as
// StorageError::Timeout and leaves the pool usable.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::info;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::events::{Anomaly, AnomalyEvent, AnomalyId, AnomalyStatus, DataPoint, Metric, MetricId, Severity};
use crate::storage::Storage;

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS metrics (
        id                BIGSERIAL PRIMARY KEY,
        metric_name       TEXT NOT NULL UNIQUE,
        is_active         BOOLEAN NOT NULL DEFAULT TRUE,
        last_collected_at TIMESTAMPTZ
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS metric_data (
        metric_id BIGINT NOT NULL REFERENCES metrics(id),
        timestamp TIMESTAMPTZ NOT NULL,
        value     DOUBLE PRECISION NOT NULL,
        PRIMARY KEY (metric_id, timestamp)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS anomalies (
        id                BIGSERIAL PRIMARY KEY,
        metric_id         BIGINT NOT NULL REFERENCES metrics(id),
        timestamp         TIMESTAMPTZ NOT NULL,
        value             DOUBLE PRECISION NOT NULL,
        anomaly_score     DOUBLE PRECISION NOT NULL,
        detection_methods TEXT[] NOT NULL DEFAULT '{}',
        severity          TEXT NOT NULL,
        status            TEXT NOT NULL DEFAULT 'open',
        created_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (metric_id, timestamp)
    );
    "#,
    r#"CREATE INDEX IF NOT EXISTS anomalies_open_created ON anomalies(created_at DESC) WHERE status = 'open';"#,
    r#"CREATE INDEX IF NOT EXISTS metric_data_ts ON metric_data(metric_id, timestamp DESC);"#,
];

const ANOMALY_COLUMNS: &str =
    "id, metric_id, timestamp, value, anomaly_score, detection_methods, severity, status, created_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool:          PgPool,
    query_timeout: Duration,
}

impl PgStore {
    /// Connect and initialize the schema.
    pub async fn connect(url: &str, config: &StorageConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await?;

        let store = Self { pool, query_timeout: config.query_timeout() };
        store.initialize_schema().await?;
        info!(max_connections = config.max_connections, "postgres store ready");
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        for stmt in SCHEMA {
            self.timed(sqlx::query(stmt).execute(&self.pool)).await?;
        }
        Ok(())
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(StorageError::from),
            Err(_)     => Err(StorageError::Timeout(self.query_timeout)),
        }
    }

    fn metric_from_row(row: &PgRow) -> Result<Metric, StorageError> {
        Ok(Metric {
            id:                row.try_get("id")?,
            name:              row.try_get("metric_name")?,
            is_active:         row.try_get("is_active")?,
            last_collected_at: row.try_get("last_collected_at")?,
        })
    }

    fn anomaly_from_row(row: &PgRow) -> Result<Anomaly, StorageError> {
        let severity: String = row.try_get("severity")?;
        let status:   String = row.try_get("status")?;
        Ok(Anomaly {
            id:                row.try_get("id")?,
            metric_id:         row.try_get("metric_id")?,
            timestamp:         row.try_get("timestamp")?,
            value:             row.try_get("value")?,
            score:             row.try_get("anomaly_score")?,
            detection_methods: row.try_get("detection_methods")?,
            severity:          severity.parse::<Severity>().map_err(StorageError::Corrupt)?,
            status:            status.parse::<AnomalyStatus>().map_err(StorageError::Corrupt)?,
            created_at:        row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl Storage for PgStore {
    async fn upsert_metric(&self, name: &str, collected_at: DateTime<Utc>) -> Result<Metric, StorageError> {
        let row = self
            .timed(
                sqlx::query(
                    r#"INSERT INTO metrics (metric_name, is_active, last_collected_at)
                       VALUES ($1, TRUE, $2)
                       ON CONFLICT (metric_name)
                       DO UPDATE SET is_active = TRUE, last_collected_at = EXCLUDED.last_collected_at
                       RETURNING id, metric_name, is_active, last_collected_at"#,
                )
                .bind(name)
                .bind(collected_at)
                .fetch_one(&self.pool),
            )
            .await?;
        Self::metric_from_row(&row)
    }

    async fn active_metrics(&self) -> Result<Vec<Metric>, StorageError> {
        let rows = self
            .timed(
                sqlx::query(
                    "SELECT id, metric_name, is_active, last_collected_at FROM metrics WHERE is_active ORDER BY id",
                )
                .fetch_all(&self.pool),
            )
            .await?;
        rows.iter().map(Self::metric_from_row).collect()
    }

    async fn all_metrics(&self) -> Result<Vec<Metric>, StorageError> {
        let rows = self
            .timed(
                sqlx::query("SELECT id, metric_name, is_active, last_collected_at FROM metrics ORDER BY id")
                    .fetch_all(&self.pool),
            )
            .await?;
        rows.iter().map(Self::metric_from_row).collect()
    }

    async fn insert_points(&self, points: &[DataPoint]) -> Result<usize, StorageError> {
        if points.is_empty() {
            return Ok(0);
        }
        let pool = &self.pool;
        let result = self
            .timed(async move {
                let mut tx = pool.begin().await?;
                let mut inserted = 0u64;
                for p in points {
                    inserted += sqlx::query(
                        r#"INSERT INTO metric_data (metric_id, timestamp, value)
                           VALUES ($1, $2, $3)
                           ON CONFLICT (metric_id, timestamp) DO NOTHING"#,
                    )
                    .bind(p.metric_id)
                    .bind(p.timestamp)
                    .bind(p.value)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                }
                tx.commit().await?;
                Ok::<_, sqlx::Error>(inserted as usize)
            })
            .await;

        match result {
            Err(StorageError::Database(sqlx::Error::Database(db))) if db.is_foreign_key_violation() => {
                Err(StorageError::UnknownMetric(points[0].metric_id))
            }
            other => other,
        }
    }

    async fn points_since(&self, metric_id: MetricId, since: DateTime<Utc>) -> Result<Vec<DataPoint>, StorageError> {
        let rows = self
            .timed(
                sqlx::query(
                    r#"SELECT metric_id, timestamp, value FROM metric_data
                       WHERE metric_id = $1 AND timestamp >= $2
                       ORDER BY timestamp ASC"#,
                )
                .bind(metric_id)
                .bind(since)
                .fetch_all(&self.pool),
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok::<_, StorageError>(DataPoint {
                    metric_id: row.try_get("metric_id")?,
                    timestamp: row.try_get("timestamp")?,
                    value:     row.try_get("value")?,
                })
            })
            .collect()
    }

    async fn insert_anomaly(&self, event: &AnomalyEvent) -> Result<Anomaly, StorageError> {
        let row = self
            .timed(
                sqlx::query(
                    r#"INSERT INTO anomalies
                         (metric_id, timestamp, value, anomaly_score, detection_methods, severity, status)
                       VALUES ($1, $2, $3, $4, $5, $6, $7)
                       ON CONFLICT (metric_id, timestamp) DO NOTHING
                       RETURNING id, created_at"#,
                )
                .bind(event.metric_id)
                .bind(event.timestamp)
                .bind(event.value)
                .bind(event.score)
                .bind(&event.detection_methods)
                .bind(event.severity.as_str())
                .bind(AnomalyStatus::Open.as_str())
                .fetch_optional(&self.pool),
            )
            .await?;

        let Some(row) = row else {
            return Err(StorageError::Duplicate(format!(
                "anomaly for metric {} at {}",
                event.metric_id, event.timestamp
            )));
        };
        let id: AnomalyId              = row.try_get("id")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        Ok(Anomaly::from_event(event.clone(), id, created_at))
    }

    async fn open_anomalies(&self, limit: usize) -> Result<Vec<Anomaly>, StorageError> {
        let sql = format!(
            "SELECT {} FROM anomalies WHERE status = 'open' ORDER BY created_at DESC, id DESC LIMIT $1",
            ANOMALY_COLUMNS
        );
        let rows = self
            .timed(sqlx::query(&sql).bind(limit as i64).fetch_all(&self.pool))
            .await?;
        rows.iter().map(Self::anomaly_from_row).collect()
    }

    async fn anomaly(&self, id: AnomalyId) -> Result<Option<Anomaly>, StorageError> {
        let sql = format!("SELECT {} FROM anomalies WHERE id = $1", ANOMALY_COLUMNS);
        let row = self
            .timed(sqlx::query(&sql).bind(id).fetch_optional(&self.pool))
            .await?;
        row.as_ref().map(Self::anomaly_from_row).transpose()
    }
}
