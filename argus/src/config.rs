// argus/src/config.rs
//
// Tunables for every component. Each section has a Default matching the
// daemon's production behaviour; an optional JSON file overrides any subset
// of fields, and CLI flags override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgusConfig {
    pub collector: CollectorConfig,
    pub detector:  DetectorConfig,
    pub hub:       HubConfig,
    pub session:   SessionConfig,
    pub upstream:  UpstreamConfig,
    pub storage:   StorageConfig,
    pub shutdown:  ShutdownConfig,
}

impl ArgusConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else { return Ok(Self::default()) };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

// ── Collection ────────────────────────────────────────────────────────────────

/// Which series a collection cycle samples when more are available than
/// `batch_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Sorted names, a batch per cycle starting at a cursor that advances
    /// and wraps, so every series is eventually sampled.
    #[default]
    RoundRobin,
    /// Always the first `batch_size` names in source order.
    Prefix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub interval_secs: u64,
    pub batch_size:    usize,
    pub selection:     SelectionPolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { interval_secs: 60, batch_size: 5, selection: SelectionPolicy::RoundRobin }
    }
}

impl CollectorConfig {
    pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs.max(1)) }
}

// ── Detection ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub interval_secs:  u64,
    pub lookback_hours: i64,
    /// Metrics with fewer points in the lookback window are not sent out.
    pub min_points:     usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { interval_secs: 300, lookback_hours: 24, min_points: 10 }
    }
}

impl DetectorConfig {
    pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs.max(1)) }
    pub fn lookback(&self) -> chrono::Duration { chrono::Duration::hours(self.lookback_hours) }
}

// ── Hub + sessions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Outbound queue depth per subscriber. A full queue evicts the subscriber.
    pub queue_depth: usize,
}

impl Default for HubConfig {
    fn default() -> Self { Self { queue_depth: 256 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub heartbeat_secs:  u64,
    pub pong_wait_secs:  u64,
    pub write_wait_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        // heartbeat must stay below pong_wait or healthy peers get dropped
        Self { heartbeat_secs: 54, pong_wait_secs: 60, write_wait_secs: 10 }
    }
}

impl SessionConfig {
    pub fn heartbeat(&self)  -> Duration { Duration::from_secs(self.heartbeat_secs.max(1)) }
    pub fn pong_wait(&self)  -> Duration { Duration::from_secs(self.pong_wait_secs.max(1)) }
    pub fn write_wait(&self) -> Duration { Duration::from_secs(self.write_wait_secs.max(1)) }
}

// ── Upstreams ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub prometheus_url:          String,
    pub ml_url:                  String,
    pub slack_webhook:           Option<String>,
    pub prometheus_timeout_secs: u64,
    pub ml_timeout_secs:         u64,
    pub slack_timeout_secs:      u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            prometheus_url:          "http://localhost:9090".to_string(),
            ml_url:                  "http://localhost:5000".to_string(),
            slack_webhook:           None,
            prometheus_timeout_secs: 30,
            ml_timeout_secs:         60,
            slack_timeout_secs:      10,
        }
    }
}

// ── Storage ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// postgres://… ; unset means the in-memory store.
    pub database_url:         Option<String>,
    pub max_connections:      u32,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs:   u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url:         None,
            max_connections:      10,
            connect_timeout_secs: 5,
            query_timeout_secs:   10,
        }
    }
}

impl StorageConfig {
    pub fn query_timeout(&self) -> Duration { Duration::from_secs(self.query_timeout_secs.max(1)) }
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub grace_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self { Self { grace_secs: 10 } }
}

impl ShutdownConfig {
    pub fn grace(&self) -> Duration { Duration::from_secs(self.grace_secs) }
}
