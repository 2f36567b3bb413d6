// argus/src/api.rs
//
// Read-only HTTP surface plus the live anomaly feed.
//
//   GET /health               liveness
//   GET /metrics              Prometheus text for Argus' own counters
//   GET /api/metrics          every known metric
//   GET /api/anomalies        open anomalies, newest first (?limit=N, default 50)
//   GET /api/anomalies/:id    one anomaly
//   GET /ws/anomalies         WebSocket upgrade → anomaly_detected stream

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::config::SessionConfig;
use crate::events::{wire_ts, AnomalyInfo, Metric};
use crate::hub::{session, HubHandle};
use crate::storage::Storage;
use crate::telemetry::Telemetry;

const DEFAULT_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub store:     Arc<dyn Storage>,
    pub hub:       HubHandle,
    pub telemetry: Arc<Telemetry>,
    pub session:   SessionConfig,
    pub cancel:    CancellationToken,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(telemetry))
        .route("/api/metrics", get(list_metrics))
        .route("/api/anomalies", get(list_anomalies))
        .route("/api/anomalies/:id", get(get_anomaly))
        .route("/ws/anomalies", get(subscribe))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Responses ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MetricInfo {
    id:                i64,
    metric_name:       String,
    is_active:         bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_collected_at: Option<String>,
}

impl From<Metric> for MetricInfo {
    fn from(m: Metric) -> Self {
        Self {
            id:                m.id,
            metric_name:       m.name,
            is_active:         m.is_active,
            last_collected_at: m.last_collected_at.as_ref().map(wire_ts),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Missing, unparseable or non-positive limits fall back to the default.
fn parse_limit(params: &HashMap<String, String>) -> usize {
    params
        .get("limit")
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_LIMIT)
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "argus-api", "time": wire_ts(&Utc::now()) }))
}

async fn telemetry(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.telemetry.prometheus_text(),
    )
}

async fn list_metrics(State(state): State<AppState>) -> Response {
    match state.store.all_metrics().await {
        Ok(metrics) => {
            let metrics: Vec<MetricInfo> = metrics.into_iter().map(MetricInfo::from).collect();
            Json(json!({ "total": metrics.len(), "metrics": metrics })).into_response()
        }
        Err(e) => {
            error!("listing metrics: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch metrics")
        }
    }
}

async fn list_anomalies(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match state.store.open_anomalies(parse_limit(&params)).await {
        Ok(anomalies) => {
            let anomalies: Vec<AnomalyInfo> = anomalies.iter().map(|a| AnomalyInfo::new(a, None)).collect();
            Json(json!({ "total": anomalies.len(), "anomalies": anomalies })).into_response()
        }
        Err(e) => {
            error!("listing anomalies: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch anomalies")
        }
    }
}

async fn get_anomaly(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let Ok(id) = raw.parse::<i64>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid anomaly ID");
    };
    match state.store.anomaly(id).await {
        Ok(Some(a)) => Json(AnomalyInfo::new(&a, None)).into_response(),
        Ok(None)    => error_response(StatusCode::NOT_FOUND, "Anomaly not found"),
        Err(e) => {
            error!(id, "fetching anomaly: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch anomaly")
        }
    }
}

async fn subscribe(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let AppState { hub, session: config, cancel, .. } = state;
    ws.on_upgrade(move |socket| session::serve(socket, hub, config, cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::events::{AnomalyEvent, Severity};
    use crate::hub::EventHub;
    use crate::storage::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn app() -> (Router, Arc<MemoryStore>) {
        let telemetry   = Telemetry::new();
        let (_hub, hub) = EventHub::new(&HubConfig::default(), Arc::clone(&telemetry));
        let store       = Arc::new(MemoryStore::new());

        let metric = store.upsert_metric("cpu_usage", Utc::now()).await.unwrap();
        for i in 0..3 {
            store
                .insert_anomaly(&AnomalyEvent {
                    metric_id:         metric.id,
                    timestamp:         Utc::now() + chrono::Duration::seconds(i),
                    value:             90.0 + i as f64,
                    score:             0.85,
                    detection_methods: vec!["zscore".into()],
                    severity:          Severity::Critical,
                })
                .await
                .unwrap();
        }

        let state = AppState {
            store:   store.clone(),
            hub,
            telemetry,
            session: SessionConfig::default(),
            cancel:  CancellationToken::new(),
        };
        (router(state), store)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp   = app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes  = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_service() {
        let (app, _) = app().await;
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "argus-api");
    }

    #[tokio::test]
    async fn metrics_are_listed_with_total() {
        let (app, _) = app().await;
        let (status, body) = get_json(app, "/api/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["metrics"][0]["metric_name"], "cpu_usage");
        assert!(body["metrics"][0]["last_collected_at"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn anomalies_honour_limit_and_fall_back_on_bad_values() {
        let (app, _) = app().await;
        let (_, body) = get_json(app.clone(), "/api/anomalies?limit=2").await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["anomalies"][0]["id"], 3);

        for uri in ["/api/anomalies", "/api/anomalies?limit=0", "/api/anomalies?limit=-4", "/api/anomalies?limit=lots"] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert_eq!(body["total"], 3, "{}", uri);
        }
    }

    #[tokio::test]
    async fn single_anomaly_lookup() {
        let (app, _) = app().await;
        let (status, body) = get_json(app.clone(), "/api/anomalies/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 2);
        assert_eq!(body["severity"], "critical");
        assert_eq!(body["anomaly_score"], 0.85);

        let (status, body) = get_json(app.clone(), "/api/anomalies/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Anomaly not found");

        let (status, _) = get_json(app, "/api/anomalies/abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn telemetry_is_served_as_text() {
        let (app, _) = app().await;
        let resp = app.oneshot(Request::get("/metrics").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let text = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(std::str::from_utf8(&text).unwrap().contains("argus_collection_cycles_total 0"));
    }

    #[test]
    fn limit_parsing() {
        let q = |v: &str| HashMap::from([("limit".to_string(), v.to_string())]);
        assert_eq!(parse_limit(&HashMap::new()), 50);
        assert_eq!(parse_limit(&q("10")), 10);
        assert_eq!(parse_limit(&q("0")), 50);
        assert_eq!(parse_limit(&q("x")), 50);
    }
}
