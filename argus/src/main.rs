// argus/src/main.rs
//
// Argus: metric anomaly detection daemon.
//
//   collector  — samples Prometheus series on a fixed period into storage
//   detector   — sends each active metric's recent history to the ML service,
//                records what it flags, pushes it to live subscribers and Slack
//   api        — read-only HTTP queries + /ws/anomalies live feed
//
// Usage:
//   argus --database-url postgres://argus@localhost/argus
//   argus --config argus.json --listen 0.0.0.0:8080
//   argus                                   # in-memory store, local defaults

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod engine;
mod error;
mod events;
mod hub;
mod storage;
mod telemetry;
mod upstream;
mod workers;

#[cfg(test)]
mod testing;

use config::ArgusConfig;
use engine::dispatcher::Dispatcher;
use hub::EventHub;
use storage::{MemoryStore, PgStore, Storage};
use telemetry::Telemetry;
use upstream::{DetectionClient, PrometheusClient, SlackSink};
use workers::{run_periodic, Collector, Detector};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "argus",
    about   = "Metric anomaly detection daemon",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, env = "ARGUS_CONFIG", help = "JSON config file; flags override it")]
    config: Option<PathBuf>,

    #[arg(long, env = "DATABASE_URL", help = "PostgreSQL URL; in-memory store if unset")]
    database_url: Option<String>,

    #[arg(long, env = "PROMETHEUS_URL")]
    prometheus_url: Option<String>,

    #[arg(long, env = "ML_SERVICE_URL")]
    ml_url: Option<String>,

    #[arg(long, env = "SLACK_WEBHOOK_URL", help = "Alerts are logged if unset")]
    slack_webhook: Option<String>,

    #[arg(long, env = "ARGUS_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    #[arg(long, help = "Collection interval, seconds")]
    collect_interval: Option<u64>,

    #[arg(long, help = "Detection interval, seconds")]
    detect_interval: Option<u64>,
}

impl Cli {
    fn apply(&self, cfg: &mut ArgusConfig) {
        if let Some(url) = &self.database_url   { cfg.storage.database_url   = Some(url.clone()); }
        if let Some(url) = &self.prometheus_url { cfg.upstream.prometheus_url = url.clone(); }
        if let Some(url) = &self.ml_url         { cfg.upstream.ml_url         = url.clone(); }
        if let Some(url) = &self.slack_webhook  { cfg.upstream.slack_webhook  = Some(url.clone()); }
        if let Some(s)   = self.collect_interval { cfg.collector.interval_secs = s; }
        if let Some(s)   = self.detect_interval  { cfg.detector.interval_secs  = s; }
    }
}

// ── Startup ───────────────────────────────────────────────────────────────────

async fn open_store(cfg: &ArgusConfig) -> Result<Arc<dyn Storage>> {
    match &cfg.storage.database_url {
        Some(url) => {
            let store = PgStore::connect(url, &cfg.storage)
                .await
                .context("connecting to PostgreSQL")?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("no database configured, using the in-memory store; data is lost on exit");
            Ok(Arc::new(MemoryStore::with_retention(cfg.detector.lookback())))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c    => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("argus=info".parse()?))
        .compact().init();

    let cli     = Cli::parse();
    let mut cfg = ArgusConfig::load(cli.config.as_deref())?;
    cli.apply(&mut cfg);

    info!(
        version    = env!("CARGO_PKG_VERSION"),
        prometheus = %cfg.upstream.prometheus_url,
        ml         = %cfg.upstream.ml_url,
        slack      = cfg.upstream.slack_webhook.is_some(),
        "argus starting"
    );

    // Every dependency is built before any loop starts; failure here is fatal.
    let telemetry = Telemetry::new();
    let store     = open_store(&cfg).await?;
    let source    = Arc::new(
        PrometheusClient::new(&cfg.upstream.prometheus_url, secs(cfg.upstream.prometheus_timeout_secs))
            .context("building Prometheus client")?,
    );
    let detection = Arc::new(
        DetectionClient::new(&cfg.upstream.ml_url, secs(cfg.upstream.ml_timeout_secs))
            .context("building detection client")?,
    );
    let alerts = Arc::new(
        SlackSink::new(cfg.upstream.slack_webhook.clone(), secs(cfg.upstream.slack_timeout_secs))
            .context("building Slack client")?,
    );
    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;

    let cancel        = CancellationToken::new();
    let (hub, handle) = EventHub::new(&cfg.hub, Arc::clone(&telemetry));

    let collector = Arc::new(Collector::new(
        source,
        Arc::clone(&store),
        Arc::clone(&telemetry),
        cfg.collector.clone(),
    ));
    let dispatcher = Dispatcher::new(Arc::clone(&store), handle.clone(), alerts, Arc::clone(&telemetry));
    let detector   = Arc::new(Detector::new(
        Arc::clone(&store),
        detection,
        dispatcher,
        Arc::clone(&telemetry),
        cfg.detector.clone(),
    ));

    let app = api::router(api::AppState {
        store,
        hub:       handle,
        telemetry: Arc::clone(&telemetry),
        session:   cfg.session.clone(),
        cancel:    cancel.clone(),
    });

    let mut tasks = JoinSet::new();
    tasks.spawn(hub.run(cancel.clone()));
    tasks.spawn(run_periodic(collector, cfg.collector.interval(), cancel.clone()));
    tasks.spawn(run_periodic(detector, cfg.detector.interval(), cancel.clone()));
    tasks.spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(cancel.clone().cancelled_owned())
                .await
            {
                warn!("http server error: {}", e);
            }
            // a dead listener takes the daemon down with it
            cancel.cancel();
        }
    });
    info!(addr = %cli.listen, "argus listening");

    tokio::select! {
        _ = shutdown_signal()   => {}
        _ = cancel.cancelled()  => {}
    }
    cancel.cancel();

    let grace = cfg.shutdown.grace();
    let drain = async { while tasks.join_next().await.is_some() {} };
    if tokio::time::timeout(grace, drain).await.is_err() {
        warn!(grace_secs = grace.as_secs(), "grace period elapsed, aborting remaining tasks");
        tasks.abort_all();
    }

    info!(
        collection_cycles = telemetry.collection_cycles.load(std::sync::atomic::Ordering::Relaxed),
        detection_cycles  = telemetry.detection_cycles.load(std::sync::atomic::Ordering::Relaxed),
        "argus stopped"
    );
    Ok(())
}

fn secs(n: u64) -> std::time::Duration {
    std::time::Duration::from_secs(n.max(1))
}
