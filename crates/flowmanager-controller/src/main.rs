//! Network Flow Manager — control loop daemon.
//!
//! Ingests per-application latency from the probe's scrape endpoint,
//! computes jitter, evaluates each critical application's SLA,
//! aggregates into a single tick decision, and enforces it by patching
//! best-effort Deployments' bandwidth annotations.

mod gauges;
mod ingestion;
mod metrics_server;
mod orchestrator;
mod state;
mod tick;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gauges::GaugeTable;
use ingestion::WindowStore;
use orchestrator::{KubeOrchestratorClient, OrchestratorClient};
use state::ControlState;

const DEFAULT_CONFIG_PATH: &str = "/etc/flowmanager/config.toml";
const DEFAULT_METRICS_PORT: u16 = 8001;
const DEFAULT_PROBE_SERVICE: &str = "network-probe-svc.default.svc.cluster.local:9090";

/// Flow manager control loop.
#[derive(Parser, Debug)]
#[command(name = "flowmanager-controller", about = "SLA control loop and bandwidth enforcer")]
struct Cli {
    /// Path to the SystemConfig TOML document. Overrides CONFIG_PATH.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var("CONFIG_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = match flowmanager_common::config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %config_path.display(), error = %e, "fatal configuration error");
            std::process::exit(1);
        }
    };

    if !config.severity_multiplier_enabled || (config.severity_max_multiplier - 5.0).abs() > f64::EPSILON {
        tracing::debug!(
            severity_multiplier_enabled = config.severity_multiplier_enabled,
            severity_max_multiplier = config.severity_max_multiplier,
            "severity multiplier fields are set but no longer influence control decisions"
        );
    }

    tracing::info!(
        critical_apps = config.critical_apps.len(),
        best_effort_targets = config.best_effort_targets.len(),
        "flowmanager-controller starting"
    );
    for app in &config.critical_apps {
        tracing::info!(
            app = %app.name,
            max_jitter_ms = app.max_jitter_ms,
            priority = app.priority,
            "monitoring critical application"
        );
    }

    let orchestrator: Box<dyn OrchestratorClient> = match KubeOrchestratorClient::connect().await {
        Ok(c) => Box::new(c),
        Err(e) => {
            tracing::error!(error = %e, "fatal: could not construct Kubernetes client");
            std::process::exit(1);
        }
    };

    let mut control_state =
        ControlState::sync_initial(&config.best_effort_targets, orchestrator.as_ref()).await;
    tracing::info!("initial bandwidth sync complete");

    let probe_service = std::env::var("PROBE_SERVICE").unwrap_or_else(|_| DEFAULT_PROBE_SERVICE.to_string());
    let probe_url = format!("http://{probe_service}/metrics");

    let metrics_port: u16 = std::env::var("METRICS_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_METRICS_PORT);
    let metrics_addr: SocketAddr = format!("0.0.0.0:{metrics_port}").parse()?;

    let gauge_table = GaugeTable::new();
    let metrics_table = gauge_table.clone();
    let metrics_handle = tokio::spawn(async move { metrics_server::run(metrics_table, metrics_addr).await });

    let http = reqwest::Client::new();
    let mut windows = WindowStore::new(config.control.window_size);
    let control_interval = Duration::from_secs_f64(config.control.control_interval_secs);
    let mut ticker = tokio::time::interval(control_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let tick_loop = async {
        loop {
            ticker.tick().await;
            let outcome = tick::run_tick(
                &config,
                &http,
                &probe_url,
                &mut windows,
                &mut control_state,
                orchestrator.as_ref(),
            )
            .await;
            gauge_table.store(outcome.exported);
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        result = metrics_handle => {
            match result {
                Ok(Err(e)) => tracing::error!("metrics server failed: {e}"),
                Err(e) => tracing::error!("metrics server task failed: {e}"),
                Ok(Ok(())) => {}
            }
        }
        _ = tick_loop => {}
    }

    tracing::info!("flowmanager-controller stopped");
    Ok(())
}
