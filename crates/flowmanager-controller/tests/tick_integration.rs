//! Whole-tick integration tests: a real axum scrape server standing in
//! for the probe, and `FakeOrchestratorClient` standing in for the
//! cluster, exercising `tick::run_tick` end to end.

use std::sync::{Arc, Mutex};

use flowmanager_common::config::parse;
use flowmanager_common::decision::Action;
use flowmanager_controller::ingestion::WindowStore;
use flowmanager_controller::orchestrator::fake::FakeOrchestratorClient;
use flowmanager_controller::state::ControlState;
use flowmanager_controller::tick::run_tick;

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

    [[critical_apps]]
    name = "safety-scanner"
    service = "safety-scanner-svc"
    port = 5202
    protocol = "TCP"
    max_jitter_ms = 2.0
    priority = 5

    [[best_effort_targets]]
    deployment = "bulk-transfer"
    namespace = "default"
    initial_bandwidth = 500
"#;

/// A minimal scrape server whose latency values for each labeled
/// target are pulled round-robin from a fixed per-target sequence.
async fn spawn_fake_probe(
    udp_values: Vec<f64>,
    tcp_values: Vec<f64>,
) -> (String, tokio::task::JoinHandle<()>) {
    use axum::extract::State;
    use axum::routing::get;

    #[derive(Clone)]
    struct Shared {
        udp: Arc<Vec<f64>>,
        tcp: Arc<Vec<f64>>,
        idx: Arc<Mutex<usize>>,
    }

    async fn handler(State(shared): State<Shared>) -> String {
        let mut i = shared.idx.lock().unwrap();
        let u = shared.udp[(*i).min(shared.udp.len() - 1)];
        let t = shared.tcp[(*i).min(shared.tcp.len() - 1)];
        *i += 1;
        format!(
            "network_probe_udp_latency_ms{{target=\"robot-control\"}} {u}\n\
             network_probe_tcp_latency_ms{{target=\"safety-scanner\"}} {t}\n"
        )
    }

    let shared = Shared {
        udp: Arc::new(udp_values),
        tcp: Arc::new(tcp_values),
        idx: Arc::new(Mutex::new(0)),
    };
    let app = axum::Router::new()
        .route("/metrics", get(handler))
        .with_state(shared);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/metrics"), handle)
}

#[tokio::test]
async fn stable_apps_release_bandwidth_toward_ceiling() {
    let config = parse(TOML).unwrap();
    let (probe_url, _server) = spawn_fake_probe(vec![0.5; 30], vec![0.3; 30]).await;
    let http = reqwest::Client::new();
    let mut windows = WindowStore::new(config.control.window_size);
    let orchestrator = FakeOrchestratorClient::new();
    orchestrator.seed("bulk-transfer", "default", 500);
    let mut state = ControlState::sync_initial(&config.best_effort_targets, &orchestrator).await;

    let mut outcome = None;
    for _ in 0..25 {
        outcome = Some(run_tick(&config, &http, &probe_url, &mut windows, &mut state, &orchestrator).await);
    }
    let outcome = outcome.unwrap();
    assert_eq!(outcome.action, Action::Release);
    // The first 4 ticks MAINTAIN (fewer than 5 samples accumulated,
    // spec §4.3.7/§8); ticks 5-25 (21 ticks) each RELEASE +10 Mbps.
    assert_eq!(orchestrator.current("bulk-transfer", "default"), Some(710));
}

#[tokio::test]
async fn tcp_jitter_alone_never_drives_a_decision() {
    let config = parse(TOML).unwrap();
    // UDP perfectly stable, TCP wildly varying — TCP must be ignored.
    let tcp_values: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 0.1 } else { 500.0 }).collect();
    let (probe_url, _server) = spawn_fake_probe(vec![0.5; 30], tcp_values).await;
    let http = reqwest::Client::new();
    let mut windows = WindowStore::new(config.control.window_size);
    let orchestrator = FakeOrchestratorClient::new();
    orchestrator.seed("bulk-transfer", "default", 500);
    let mut state = ControlState::sync_initial(&config.best_effort_targets, &orchestrator).await;

    let mut outcome = None;
    for _ in 0..25 {
        outcome = Some(run_tick(&config, &http, &probe_url, &mut windows, &mut state, &orchestrator).await);
    }
    // Stable UDP still drives a release despite chaotic TCP jitter.
    assert_eq!(outcome.unwrap().action, Action::Release);
}

#[tokio::test]
async fn permanently_removed_target_is_skipped_on_subsequent_ticks() {
    let config = parse(TOML).unwrap();
    // High-variance UDP latency to force a throttle decision.
    let udp_values: Vec<f64> = (0..30).map(|i| 1.0 + 10.0 * i as f64).collect();
    let (probe_url, _server) = spawn_fake_probe(udp_values, vec![0.3; 30]).await;
    let http = reqwest::Client::new();
    let mut windows = WindowStore::new(config.control.window_size);
    let orchestrator = FakeOrchestratorClient::new();
    orchestrator.seed("bulk-transfer", "default", 500);
    orchestrator.mark_missing("bulk-transfer", "default");
    let mut state = ControlState::sync_initial(&config.best_effort_targets, &orchestrator).await;

    for _ in 0..25 {
        run_tick(&config, &http, &probe_url, &mut windows, &mut state, &orchestrator).await;
    }

    assert!(state.is_removed("bulk-transfer"));
    // The seeded value is untouched since every patch attempt failed permanently.
    assert_eq!(orchestrator.current("bulk-transfer", "default"), Some(500));
}
