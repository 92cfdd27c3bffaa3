//! One control-loop tick: ingest → evaluate → aggregate → enforce
//! (spec §4.3.1–4.3.6).
//!
//! Grounded on `BandwidthController.control_loop`'s per-cycle sequence:
//! fetch all critical apps' latency, build `app_states`, call
//! `_make_control_decision`, then `_apply_bandwidth_changes`. The patch
//! fan-out is concurrent here (`futures::future::join_all`) where the
//! original patches targets sequentially in a `for` loop — each target
//! is independent so nothing forces sequential dispatch, and SPEC_FULL
//! §5 explicitly calls for a bounded-fanout tick.
use std::time::Duration;

use flowmanager_common::config::SystemConfig;
use flowmanager_common::decision::{aggregate, apply_aimd, evaluate, Action, EvaluatedApp};
use flowmanager_common::config::Protocol;
use flowmanager_common::FlowError;

use crate::gauges::{BandwidthSample, ExportedState, JitterSample};
use crate::ingestion::{extract_latency, fetch_scrape_text, WindowStore};
use crate::orchestrator::OrchestratorClient;
use crate::state::ControlState;

/// Budget for a single target's patch call within a tick, so one slow
/// or hanging orchestrator call cannot stall the whole tick
/// indefinitely (spec §5: "each tick must complete before the next
/// begins").
const PATCH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TickOutcome {
    pub exported: ExportedState,
    pub decision_reason: String,
    pub action: Action,
}

/// Runs one tick. `probe_url` is the probe's full scrape URL
/// (`http://host:port/metrics`).
pub async fn run_tick(
    config: &SystemConfig,
    http: &reqwest::Client,
    probe_url: &str,
    windows: &mut WindowStore,
    control_state: &mut ControlState,
    orchestrator: &dyn OrchestratorClient,
) -> TickOutcome {
    let scrape_text = match fetch_scrape_text(http, probe_url).await {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(error = %e, "probe scrape unavailable this tick, skipping ingestion");
            None
        }
    };

    let mut evaluations = Vec::new();
    let mut udp_jitter = Vec::new();
    let mut tcp_jitter = Vec::new();

    for app in &config.critical_apps {
        let Some(text) = scrape_text.as_deref() else {
            continue;
        };
        let Some(latency) = extract_latency(text, app) else {
            tracing::debug!(app = %app.name, "no latency metric found this tick");
            continue;
        };

        let jitter = windows.record(&app.name, latency);
        let sufficient_samples = windows.has_sufficient_samples(&app.name);
        let eval = evaluate(app, jitter, sufficient_samples);

        let sample = JitterSample {
            service: app.name.clone(),
            target_host: app.service.clone(),
            jitter_ms: jitter,
        };
        match app.protocol {
            Protocol::Udp => udp_jitter.push(sample),
            Protocol::Tcp => tcp_jitter.push(sample),
        }

        evaluations.push((app, eval));
    }

    if evaluations.is_empty() {
        tracing::warn!("no app measurements available, skipping cycle");
        return TickOutcome {
            exported: ExportedState {
                udp_jitter,
                tcp_jitter,
                bandwidth_limit: bandwidth_samples(config, control_state),
            },
            decision_reason: "no measurements available".to_string(),
            action: Action::Maintain,
        };
    }

    let evaluated: Vec<EvaluatedApp<'_>> = evaluations
        .into_iter()
        .map(|(app, eval)| EvaluatedApp { app, eval })
        .collect();
    let decision = aggregate(&evaluated);
    tracing::info!(action = ?decision.action, reason = %decision.reason, "tick decision");

    apply_decision(config, control_state, orchestrator, decision.action).await;

    TickOutcome {
        exported: ExportedState {
            udp_jitter,
            tcp_jitter,
            bandwidth_limit: bandwidth_samples(config, control_state),
        },
        decision_reason: decision.reason,
        action: decision.action,
    }
}

async fn apply_decision(
    config: &SystemConfig,
    control_state: &mut ControlState,
    orchestrator: &dyn OrchestratorClient,
    action: Action,
) {
    if matches!(action, Action::Maintain) {
        return;
    }

    let mut patches = Vec::new();
    for target in &config.best_effort_targets {
        if control_state.is_removed(&target.deployment) {
            continue;
        }
        let current = control_state.current(&target.deployment);
        let new_bw = apply_aimd(current, action, &config.control);
        if new_bw == current {
            continue;
        }
        patches.push((target.deployment.clone(), target.namespace.clone(), new_bw));
    }

    let results: Vec<(String, i64, Result<(), FlowError>)> = futures::future::join_all(
        patches.into_iter().map(|(deployment, namespace, new_bw)| async move {
            let result = tokio::time::timeout(
                PATCH_TIMEOUT,
                orchestrator.patch_bandwidth(&deployment, &namespace, new_bw),
            )
            .await
            .unwrap_or_else(|_| {
                Err(FlowError::PatchTransient {
                    deployment: deployment.clone(),
                    namespace: namespace.clone(),
                    source: anyhow::anyhow!("patch timed out after {:?}", PATCH_TIMEOUT),
                })
            });
            (deployment, new_bw, result)
        }),
    )
    .await;

    for (deployment, new_bw, result) in results {
        if let Err(e) = &result {
            tracing::warn!(deployment = %deployment, error = %e, "bandwidth patch failed");
        } else {
            tracing::info!(deployment = %deployment, new_bw, "bandwidth patched");
        }
        control_state.record_patch_result(&deployment, new_bw, &result);
    }
}

fn bandwidth_samples(config: &SystemConfig, control_state: &ControlState) -> Vec<BandwidthSample> {
    config
        .best_effort_targets
        .iter()
        .filter(|t| !control_state.is_removed(&t.deployment))
        .map(|t| BandwidthSample {
            deployment: t.deployment.clone(),
            namespace: t.namespace.clone(),
            mbps: control_state.current(&t.deployment),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::fake::FakeOrchestratorClient;
    use flowmanager_common::config::parse;

    const TOML: &str = r#"
        [control]
        probe_interval = 0.5
        control_interval = 2.0
        window_size = 20
        step_up = 10
        min_bandwidth = 10
        max_bandwidth = 1000
        decrease_fraction = 0.20

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

    async fn scrape_server(latencies: Vec<f64>) -> (String, tokio::task::JoinHandle<()>) {
        use axum::extract::State;
        use axum::routing::get;
        use std::sync::{Arc, Mutex};

        let idx = Arc::new(Mutex::new(0usize));
        let latencies = Arc::new(latencies);

        async fn handler(
            State((idx, latencies)): State<(Arc<Mutex<usize>>, Arc<Vec<f64>>)>,
        ) -> String {
            let mut i = idx.lock().unwrap();
            let v = latencies[(*i).min(latencies.len() - 1)];
            *i += 1;
            format!("network_probe_udp_latency_ms{{target=\"robot-control\"}} {v}\n")
        }

        let app = axum::Router::new()
            .route("/metrics", get(handler))
            .with_state((idx, latencies));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/metrics"), handle)
    }

    #[tokio::test]
    async fn violation_throttles_bulk_transfer_target() {
        let config = parse(TOML).unwrap();
        // Spread wide enough that the IQR comfortably exceeds the 5ms
        // threshold once the window fills (q1=26, q3=76 => iqr=50).
        let latencies: Vec<f64> = (0..20).map(|i| 1.0 + 5.0 * i as f64).collect();
        let (probe_url, _server) = scrape_server(latencies).await;
        let http = reqwest::Client::new();
        let mut windows = WindowStore::new(config.control.window_size);
        let orchestrator = FakeOrchestratorClient::new();
        orchestrator.seed("bulk-transfer", "default", 500);
        let mut state = ControlState::sync_initial(&config.best_effort_targets, &orchestrator).await;

        // Fill the window with enough high-jitter samples to trip a violation.
        let mut outcome = None;
        for _ in 0..20 {
            outcome = Some(
                run_tick(&config, &http, &probe_url, &mut windows, &mut state, &orchestrator).await,
            );
        }
        let outcome = outcome.unwrap();
        assert_eq!(outcome.action, Action::Throttle);
        assert!(orchestrator.current("bulk-transfer", "default").unwrap() < 500);
    }

    #[tokio::test]
    async fn scrape_failure_skips_cycle_without_panicking() {
        let config = parse(TOML).unwrap();
        let http = reqwest::Client::new();
        let mut windows = WindowStore::new(config.control.window_size);
        let orchestrator = FakeOrchestratorClient::new();
        orchestrator.seed("bulk-transfer", "default", 500);
        let mut state = ControlState::sync_initial(&config.best_effort_targets, &orchestrator).await;

        let outcome = run_tick(
            &config,
            &http,
            "http://127.0.0.1:1/metrics",
            &mut windows,
            &mut state,
            &orchestrator,
        )
        .await;
        assert_eq!(outcome.action, Action::Maintain);
        assert_eq!(orchestrator.current("bulk-transfer", "default"), Some(500));
    }
}
