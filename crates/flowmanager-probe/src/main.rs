//! Network Flow Manager — active probe daemon.
//!
//! Measures UDP round-trip time, TCP handshake latency, and throttled
//! TCP throughput against each configured critical application, and
//! exports the results as Prometheus gauges/histograms for the
//! controller to scrape.

mod cycle;
mod gauges;
mod histogram;
mod metrics_server;
mod probe;
mod resolve;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use flowmanager_common::{Protocol, SystemConfig};
use tracing_subscriber::EnvFilter;

use cycle::TargetState;
use gauges::{GaugeTable, Snapshot, TargetGauges};

const DEFAULT_CONFIG_PATH: &str = "/etc/flowmanager/config.toml";
const DEFAULT_METRICS_PORT: u16 = 9090;

/// Flow manager active probe.
#[derive(Parser, Debug)]
#[command(name = "flowmanager-probe", about = "Active UDP/TCP network probe")]
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

    let metrics_port: u16 = std::env::var("METRICS_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_METRICS_PORT);

    tracing::info!(
        config_path = %config_path.display(),
        metrics_port,
        targets = config.critical_apps.len(),
        probe_interval_secs = config.control.probe_interval_secs,
        "flowmanager-probe starting"
    );

    let (states, initial_snapshot) = build_targets(&config);
    let table = GaugeTable::new(initial_snapshot);

    let probe_table = table.clone();
    let probe_interval = Duration::from_secs_f64(config.control.probe_interval_secs);
    let probe_handle = tokio::spawn(async move {
        run_probe_loop(states, probe_table, probe_interval).await;
    });

    let metrics_addr: SocketAddr = format!("0.0.0.0:{metrics_port}").parse()?;
    let metrics_table = table.clone();
    let metrics_handle =
        tokio::spawn(async move { metrics_server::run(metrics_table, metrics_addr).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        result = probe_handle => {
            if let Err(e) = result {
                tracing::error!("probe loop task failed: {e}");
            }
        }
        result = metrics_handle => {
            match result {
                Ok(Err(e)) => tracing::error!("metrics server failed: {e}"),
                Err(e) => tracing::error!("metrics server task failed: {e}"),
                Ok(Ok(())) => {}
            }
        }
    }

    tracing::info!("flowmanager-probe stopped");
    Ok(())
}

/// Per-target env overrides for host/port, keyed by the configured
/// critical app name (`PROBE_TARGET_<NAME>_HOST` / `_PORT`, name
/// uppercased with non-alphanumerics replaced by `_`).
fn env_key(name: &str, suffix: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("PROBE_TARGET_{normalized}_{suffix}")
}

fn build_targets(config: &SystemConfig) -> (Vec<TargetState>, Snapshot) {
    let mut states = Vec::with_capacity(config.critical_apps.len());
    let mut snapshot = Snapshot::default();

    for app in &config.critical_apps {
        let host = std::env::var(env_key(&app.name, "HOST")).unwrap_or_else(|_| app.service.clone());
        let port: u16 = std::env::var(env_key(&app.name, "PORT"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(app.port);

        states.push(TargetState::new(
            app.name.clone(),
            host.clone(),
            port,
            app.protocol,
        ));
        snapshot
            .targets
            .push(TargetGauges::new(app.name.clone(), host, app.protocol));
    }

    (states, snapshot)
}

async fn run_probe_loop(mut states: Vec<TargetState>, table: Arc<GaugeTable>, interval: Duration) {
    let clock_origin = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(interval);
    // Avoid a burst of missed ticks catching up after a slow cycle.
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let mut snapshot = (*table.load()).clone();

        for (state, gauges) in states.iter_mut().zip(snapshot.targets.iter_mut()) {
            cycle::run_cycle(state, gauges, clock_origin).await;
        }

        table.store(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_key_normalizes_name() {
        assert_eq!(env_key("robot-control", "HOST"), "PROBE_TARGET_ROBOT_CONTROL_HOST");
        assert_eq!(env_key("safety.scanner", "PORT"), "PROBE_TARGET_SAFETY_SCANNER_PORT");
    }

    #[test]
    fn build_targets_preserves_order_and_defaults() {
        let toml = r#"
            [control]
            min_bandwidth = 10
            max_bandwidth = 1000

            [[critical_apps]]
            name = "robot-control"
            service = "robot-control-svc"
            port = 5201
            protocol = "UDP"
            max_jitter_ms = 5.0
            priority = 10

            [[best_effort_targets]]
            deployment = "bulk-transfer"
            namespace = "default"
            initial_bandwidth = 500
        "#;
        let config = flowmanager_common::config::parse(toml).unwrap();
        let (states, snapshot) = build_targets(&config);
        assert_eq!(states.len(), 1);
        assert_eq!(snapshot.targets.len(), 1);
        assert_eq!(states[0].host, "robot-control-svc");
        assert_eq!(states[0].port, 5201);
        assert_eq!(states[0].protocol, Protocol::Udp);
    }
}
