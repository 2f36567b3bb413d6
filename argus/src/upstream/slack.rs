// argus/src/upstream/slack.rs
//
// Slack incoming-webhook alerts. One attachment per alert, coloured by
// severity, with a header, a four-field section and a timestamp context.
// Without a webhook the alert is written to the log instead.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::error::UpstreamError;
use crate::events::Severity;
use crate::upstream::{Alert, AlertSink};

const SERVICE: &str = "slack";

fn emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🚨",
        Severity::High     => "⚠️",
        Severity::Medium   => "⚡",
        Severity::Low      => "ℹ️",
    }
}

fn colour(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#ff0000",
        Severity::High     => "#ff6b00",
        Severity::Medium   => "#ffcc00",
        Severity::Low      => "#36a64f",
    }
}

pub fn block_kit(alert: &Alert) -> Value {
    let field = |label: &str, text: String| json!({ "type": "mrkdwn", "text": format!("*{}:*\n{}", label, text) });
    json!({
        "attachments": [{
            "color": colour(alert.severity),
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": format!("{} Anomaly Detected!", emoji(alert.severity)) },
                },
                {
                    "type": "section",
                    "fields": [
                        field("Metric",   alert.metric_name.clone()),
                        field("Severity", alert.severity.to_string()),
                        field("Value",    format!("{:.2}", alert.value)),
                        field("Score",    format!("{:.3}", alert.score)),
                    ],
                },
                {
                    "type": "context",
                    "elements": [{
                        "type": "mrkdwn",
                        "text": format!("Detected at {}", Utc::now().format("%Y-%m-%d %H:%M:%S")),
                    }],
                },
            ],
        }],
    })
}

pub struct SlackSink {
    webhook: Option<String>,
    http:    reqwest::Client,
}

impl SlackSink {
    pub fn new(webhook: Option<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::http(SERVICE))?;
        Ok(Self { webhook: webhook.filter(|w| !w.is_empty()), http })
    }
}

#[async_trait]
impl AlertSink for SlackSink {
    async fn send_alert(&self, alert: &Alert) -> Result<(), UpstreamError> {
        let Some(webhook) = &self.webhook else {
            info!(
                metric   = %alert.metric_name,
                severity = %alert.severity,
                "{} anomaly: {} = {:.2} (score {:.3})",
                emoji(alert.severity), alert.metric_name, alert.value, alert.score
            );
            return Ok(());
        };

        let resp = self
            .http
            .post(webhook)
            .json(&block_kit(alert))
            .send()
            .await
            .map_err(UpstreamError::http(SERVICE))?;
        if !resp.status().is_success() {
            return Err(UpstreamError::Status { service: SERVICE, status: resp.status().as_u16() });
        }
        Ok(())
    }
}
