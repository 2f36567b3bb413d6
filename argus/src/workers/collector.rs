// argus/src/workers/collector.rs
//
// Collection cycle: list series, pick a bounded batch, and store one sample
// per series. Every point written in a cycle carries the same timestamp.
// A series that is absent, malformed, or fails to fetch or store is skipped
// on its own; the rest of the batch continues.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CollectorConfig, SelectionPolicy};
use crate::error::{StorageError, UpstreamError};
use crate::events::DataPoint;
use crate::storage::Storage;
use crate::telemetry::Telemetry;
use crate::upstream::TimeSeriesSource;
use crate::workers::Cycle;

#[derive(Debug, Error)]
enum Skip {
    #[error("no current sample")]
    Absent,

    #[error("unparseable sample {0:?}")]
    Malformed(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct Collector {
    source:    Arc<dyn TimeSeriesSource>,
    store:     Arc<dyn Storage>,
    telemetry: Arc<Telemetry>,
    config:    CollectorConfig,
    cursor:    AtomicUsize,
}

impl Collector {
    pub fn new(
        source:    Arc<dyn TimeSeriesSource>,
        store:     Arc<dyn Storage>,
        telemetry: Arc<Telemetry>,
        config:    CollectorConfig,
    ) -> Self {
        Self { source, store, telemetry, config, cursor: AtomicUsize::new(0) }
    }

    fn select(&self, names: Vec<String>) -> Vec<String> {
        let n = self.config.batch_size.max(1);
        match self.config.selection {
            SelectionPolicy::Prefix => names.into_iter().take(n).collect(),
            SelectionPolicy::RoundRobin => {
                let mut names = names;
                names.sort();
                names.dedup();
                if names.len() <= n {
                    return names;
                }
                // only the scheduler loop calls this, one cycle at a time
                let start = self.cursor.load(Ordering::Relaxed) % names.len();
                self.cursor.store((start + n) % names.len(), Ordering::Relaxed);
                (0..n).map(|i| names[(start + i) % names.len()].clone()).collect()
            }
        }
    }

    async fn collect_one(&self, name: &str, at: DateTime<Utc>) -> Result<usize, Skip> {
        let raw   = self.source.query(name).await?.ok_or(Skip::Absent)?;
        let value = parse_sample(&raw).ok_or(Skip::Malformed(raw))?;

        let metric = self.store.upsert_metric(name, at).await?;
        let point  = DataPoint { metric_id: metric.id, timestamp: at, value };
        Ok(self.store.insert_points(&[point]).await?)
    }
}

/// Finite decimal only; NaN and infinities are treated as malformed.
fn parse_sample(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[async_trait]
impl Cycle for Collector {
    fn name(&self) -> &'static str { "collector" }

    async fn run_cycle(&self, cancel: &CancellationToken) {
        Telemetry::incr(&self.telemetry.collection_cycles);

        let names = match self.source.list_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!("failed to list series: {}", e);
                return;
            }
        };
        let listed = names.len();
        let batch  = self.select(names);
        let at     = Utc::now();

        let mut stored  = 0usize;
        let mut skipped = 0usize;
        for name in &batch {
            if cancel.is_cancelled() {
                debug!("collection interrupted by shutdown");
                break;
            }
            match self.collect_one(name, at).await {
                Ok(n) => stored += n,
                Err(skip) => {
                    skipped += 1;
                    Telemetry::incr(&self.telemetry.samples_skipped);
                    match skip {
                        Skip::Absent | Skip::Malformed(_) => debug!(metric = %name, "skipped: {}", skip),
                        _                                 => warn!(metric = %name, "collection failed: {}", skip),
                    }
                }
            }
        }

        Telemetry::add(&self.telemetry.points_stored, stored as u64);
        info!(listed, batch = batch.len(), stored, skipped, "collection cycle complete");
    }
}
