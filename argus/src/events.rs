// argus/src/events.rs
//
// Domain types flowing through Argus: metrics and their samples, anomalies
// before and after persistence, and the JSON envelope pushed to live
// WebSocket subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub type MetricId  = i64;
pub type AnomalyId = i64;

/// Wire timestamp format shared by the WebSocket envelope and the query API.
pub const WIRE_TS: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn wire_ts(ts: &DateTime<Utc>) -> String {
    ts.format(WIRE_TS).to_string()
}

// ── Metrics + samples ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id:                MetricId,
    pub name:              String,
    pub is_active:         bool,
    pub last_collected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub metric_id: MetricId,
    pub timestamp: DateTime<Utc>,
    pub value:     f64,
}

// ── Severity ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low      => "low",
            Self::Medium   => "medium",
            Self::High     => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low"      => Ok(Self::Low),
            "medium"   => Ok(Self::Medium),
            "high"     => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other      => Err(format!("unknown severity '{}'", other)),
        }
    }
}

// ── Anomaly lifecycle ─────────────────────────────────────────────────────────
// Argus only ever writes `Open`. Acknowledge/resolve happen elsewhere.

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyStatus {
    #[default]
    Open,
    Acknowledged,
    Resolved,
}

impl AnomalyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open         => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved     => "resolved",
        }
    }
}

impl std::fmt::Display for AnomalyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open"         => Ok(Self::Open),
            "acknowledged" => Ok(Self::Acknowledged),
            "resolved"     => Ok(Self::Resolved),
            other          => Err(format!("unknown anomaly status '{}'", other)),
        }
    }
}

/// An anomaly produced by one detection cycle, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub metric_id:         MetricId,
    pub timestamp:         DateTime<Utc>,
    pub value:             f64,
    pub score:             f64,
    pub detection_methods: Vec<String>,
    pub severity:          Severity,
}

/// A persisted anomaly. Append-only from Argus' point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id:                AnomalyId,
    pub metric_id:         MetricId,
    pub timestamp:         DateTime<Utc>,
    pub value:             f64,
    pub score:             f64,
    pub detection_methods: Vec<String>,
    pub severity:          Severity,
    pub status:            AnomalyStatus,
    pub created_at:        DateTime<Utc>,
}

impl Anomaly {
    pub fn from_event(event: AnomalyEvent, id: AnomalyId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            metric_id:         event.metric_id,
            timestamp:         event.timestamp,
            value:             event.value,
            score:             event.score,
            detection_methods: event.detection_methods,
            severity:          event.severity,
            status:            AnomalyStatus::Open,
            created_at,
        }
    }
}

// ── Wire envelope ─────────────────────────────────────────────────────────────

pub const ANOMALY_DETECTED: &str = "anomaly_detected";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyMessage {
    #[serde(rename = "type")]
    pub kind:      String,
    pub timestamp: String,
    pub anomaly:   AnomalyInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyInfo {
    pub id:                AnomalyId,
    pub metric_id:         MetricId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_name:       Option<String>,
    pub timestamp:         String,
    pub value:             f64,
    pub anomaly_score:     f64,
    pub detection_methods: Vec<String>,
    pub severity:          Severity,
    pub status:            AnomalyStatus,
    pub created_at:        String,
}

impl AnomalyInfo {
    pub fn new(anomaly: &Anomaly, metric_name: Option<&str>) -> Self {
        Self {
            id:                anomaly.id,
            metric_id:         anomaly.metric_id,
            metric_name:       metric_name.map(str::to_string),
            timestamp:         wire_ts(&anomaly.timestamp),
            value:             anomaly.value,
            anomaly_score:     anomaly.score,
            detection_methods: anomaly.detection_methods.clone(),
            severity:          anomaly.severity,
            status:            anomaly.status,
            created_at:        wire_ts(&anomaly.created_at),
        }
    }
}

impl AnomalyMessage {
    pub fn detected(anomaly: &Anomaly, metric_name: &str) -> Self {
        Self {
            kind:      ANOMALY_DETECTED.to_string(),
            timestamp: wire_ts(&Utc::now()),
            anomaly:   AnomalyInfo::new(anomaly, Some(metric_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Anomaly {
        Anomaly {
            id:                7,
            metric_id:         3,
            timestamp:         Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap(),
            value:             97.5,
            score:             0.82,
            detection_methods: vec!["isolation_forest".into()],
            severity:          Severity::Critical,
            status:            AnomalyStatus::Open,
            created_at:        Utc.with_ymd_and_hms(2025, 3, 1, 12, 31, 5).unwrap(),
        }
    }

    #[test]
    fn envelope_matches_wire_shape() {
        let msg  = AnomalyMessage::detected(&sample(), "cpu_usage");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "anomaly_detected");
        let a = &json["anomaly"];
        assert_eq!(a["id"], 7);
        assert_eq!(a["metric_id"], 3);
        assert_eq!(a["metric_name"], "cpu_usage");
        assert_eq!(a["timestamp"], "2025-03-01T12:30:00Z");
        assert_eq!(a["anomaly_score"], 0.82);
        assert_eq!(a["detection_methods"][0], "isolation_forest");
        assert_eq!(a["severity"], "critical");
        assert_eq!(a["status"], "open");
        assert_eq!(a["created_at"], "2025-03-01T12:31:05Z");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn severity_and_status_parse_their_own_names() {
        for s in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
            assert_eq!(s.as_str().parse::<Severity>().unwrap(), s);
        }
        assert_eq!("open".parse::<AnomalyStatus>().unwrap(), AnomalyStatus::Open);
        assert!("bogus".parse::<Severity>().is_err());
    }
}
