// argus/src/error.rs
//
// Error types per boundary. Cycles match on these to decide whether a failed
// unit of work is benign (duplicate) or worth a log line; nothing here ever
// aborts a whole cycle.

use std::time::Duration;

use thiserror::Error;

use crate::events::MetricId;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Insert collided with an existing row. Callers treat this as benign.
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("unknown metric id {0}")]
    UnknownMetric(MetricId),

    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source:  reqwest::Error,
    },

    #[error("{service} returned status {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{service} sent an unexpected payload: {detail}")]
    Decode { service: &'static str, detail: String },
}

impl UpstreamError {
    pub fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Http { service, source }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("write failed: {0}")]
    Write(String),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("no pong within {0:?}")]
    ReadDeadline(Duration),

    #[error("read failed: {0}")]
    Read(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path:   String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path}: {source}")]
    Parse {
        path:   String,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything that can make a single metric's detection pass fail.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
