// argus/src/upstream/ml.rs
//
// Client for the ML detection service: POST <ml_url>/detect with a metric's
// ascending history, get back the points it considers anomalous. Transport
// failures and any non-2xx status are hard errors.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::upstream::{DetectionRequest, DetectionResponse, DetectionService};

const SERVICE: &str = "ml-service";

pub struct DetectionClient {
    endpoint: String,
    http:     reqwest::Client,
}

impl DetectionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::http(SERVICE))?;
        Ok(Self { endpoint: format!("{}/detect", base_url.trim_end_matches('/')), http })
    }
}

#[async_trait]
impl DetectionService for DetectionClient {
    async fn detect(&self, request: &DetectionRequest) -> Result<DetectionResponse, UpstreamError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(UpstreamError::http(SERVICE))?;

        if !resp.status().is_success() {
            return Err(UpstreamError::Status { service: SERVICE, status: resp.status().as_u16() });
        }
        resp.json::<DetectionResponse>()
            .await
            .map_err(|e| UpstreamError::Decode { service: SERVICE, detail: e.to_string() })
    }
}
