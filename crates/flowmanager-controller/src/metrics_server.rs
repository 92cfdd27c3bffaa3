//! The controller's `/metrics` scrape endpoint, exporting the jitter
//! and bandwidth-limit gauges the original module-level Prometheus
//! client exposed (`flowmanager_udp_jitter_ms`, `flowmanager_tcp_jitter_ms`,
//! `flowmanager_bandwidth_limit_mbps`).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use flowmanager_common::prometheus_text::{write_gauge_family, GaugeSample};

use crate::gauges::{ExportedState, GaugeTable};

pub async fn run(table: Arc<GaugeTable>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(table);

    tracing::info!(%addr, "controller scrape endpoint listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz_handler() -> impl IntoResponse {
    "OK"
}

async fn metrics_handler(State(table): State<Arc<GaugeTable>>) -> impl IntoResponse {
    let state = table.load();
    let body = render(&state);
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

fn render(state: &ExportedState) -> String {
    let mut out = String::with_capacity(2048);

    let udp_samples: Vec<GaugeSample> = state
        .udp_jitter
        .iter()
        .map(|s| {
            GaugeSample::new(
                &[("service", s.service.as_str()), ("target_host", s.target_host.as_str())],
                s.jitter_ms,
            )
        })
        .collect();
    write_gauge_family(
        &mut out,
        "flowmanager_udp_jitter_ms",
        "UDP jitter calculated by flow manager (used for control decisions)",
        &udp_samples,
    );

    let tcp_samples: Vec<GaugeSample> = state
        .tcp_jitter
        .iter()
        .map(|s| {
            GaugeSample::new(
                &[("service", s.service.as_str()), ("target_host", s.target_host.as_str())],
                s.jitter_ms,
            )
        })
        .collect();
    write_gauge_family(
        &mut out,
        "flowmanager_tcp_jitter_ms",
        "TCP jitter calculated by flow manager (monitoring only)",
        &tcp_samples,
    );

    let bandwidth_samples: Vec<GaugeSample> = state
        .bandwidth_limit
        .iter()
        .map(|s| {
            GaugeSample::new(
                &[
                    ("deployment", s.deployment.as_str()),
                    ("namespace", s.namespace.as_str()),
                ],
                s.mbps as f64,
            )
        })
        .collect();
    write_gauge_family(
        &mut out,
        "flowmanager_bandwidth_limit_mbps",
        "Current bandwidth limit enforced by flow manager",
        &bandwidth_samples,
    );

    out
}
