// argus/src/upstream/prometheus.rs
//
// Prometheus HTTP API client.
//
//   GET /api/v1/label/__name__/values     → every series name
//   GET /api/v1/query?query=<name>        → instant vector; value = [ts, "decimal"]
//
// Only the first vector element is used per series.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::UpstreamError;
use crate::upstream::TimeSeriesSource;

const SERVICE: &str = "prometheus";

#[derive(Debug, Deserialize)]
struct LabelValues {
    #[serde(default)]
    data: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InstantQuery {
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    value: Vec<Value>,
}

pub struct PrometheusClient {
    base: String,
    http: reqwest::Client,
}

impl PrometheusClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::http(SERVICE))?;
        Ok(Self { base: base_url.trim_end_matches('/').to_string(), http })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, UpstreamError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base, path))
            .query(query)
            .send()
            .await
            .map_err(UpstreamError::http(SERVICE))?;
        if !resp.status().is_success() {
            return Err(UpstreamError::Status { service: SERVICE, status: resp.status().as_u16() });
        }
        Ok(resp)
    }
}

/// The sample string of the first vector element, if any.
fn first_sample(body: InstantQuery) -> Option<String> {
    let sample = body.data.result.into_iter().next()?;
    match sample.value.get(1)? {
        Value::String(s) => Some(s.clone()),
        _                => None,
    }
}

#[async_trait]
impl TimeSeriesSource for PrometheusClient {
    async fn list_names(&self) -> Result<Vec<String>, UpstreamError> {
        let body: LabelValues = self
            .get("/api/v1/label/__name__/values", &[])
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Decode { service: SERVICE, detail: e.to_string() })?;
        Ok(body.data)
    }

    async fn query(&self, name: &str) -> Result<Option<String>, UpstreamError> {
        let body: InstantQuery = self
            .get("/api/v1/query", &[("query", name)])
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Decode { service: SERVICE, detail: e.to_string() })?;
        Ok(first_sample(body))
    }
}
