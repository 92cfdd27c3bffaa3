//! The probe's `/metrics` scrape endpoint.
//!
//! Runs as an independent concurrent task reading the shared
//! [`GaugeTable`] snapshot — never blocks on the probe worker (spec
//! §5: "no blocking on the probe worker by the scrape handler").
//! Shaped after `strata-agent::metrics::run`'s dedicated axum router.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use flowmanager_common::prometheus_text::{write_gauge_family, write_histogram_family, GaugeSample};

use crate::gauges::{GaugeTable, Snapshot, TargetGauges};
use crate::histogram::BUCKET_BOUNDS_MS;

pub async fn run(table: Arc<GaugeTable>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(table);

    tracing::info!(%addr, "probe scrape endpoint listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz_handler() -> impl IntoResponse {
    "OK"
}

async fn metrics_handler(State(table): State<Arc<GaugeTable>>) -> impl IntoResponse {
    let snapshot = table.load();
    let body = render(&snapshot);
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

/// Renders one protocol family's latency + success gauges for the
/// targets whose configured protocol tag matches.
fn render_latency_and_success(out: &mut String, targets: &[TargetGauges], protocol_tag: &str) {
    let matching: Vec<&TargetGauges> = targets
        .iter()
        .filter(|t| t.protocol.as_str().eq_ignore_ascii_case(protocol_tag))
        .collect();

    let latency_name = format!("network_probe_{protocol_tag}_latency_ms");
    let latency_samples: Vec<GaugeSample> = matching
        .iter()
        .filter_map(|t| {
            t.latency_ms
                .map(|v| GaugeSample::new(&[("target", t.name.as_str())], v))
        })
        .collect();
    write_gauge_family(
        out,
        &latency_name,
        &format!(
            "last measured {} latency in milliseconds",
            protocol_tag.to_uppercase()
        ),
        &latency_samples,
    );

    let success_name = format!("network_probe_{protocol_tag}_success");
    let success_samples: Vec<GaugeSample> = matching
        .iter()
        .map(|t| {
            GaugeSample::new(
                &[("target", t.name.as_str())],
                if t.success { 1.0 } else { 0.0 },
            )
        })
        .collect();
    write_gauge_family(
        out,
        &success_name,
        "1 if the last probe completed, 0 otherwise",
        &success_samples,
    );
}

fn render(snapshot: &Snapshot) -> String {
    let mut out = String::with_capacity(4096);

    out.push_str("# HELP network_probe_build_info Static build information.\n");
    out.push_str("# TYPE network_probe_build_info gauge\n");
    out.push_str("network_probe_build_info{version=\"1\"} 1\n");

    render_latency_and_success(&mut out, &snapshot.targets, "udp");
    render_latency_and_success(&mut out, &snapshot.targets, "tcp");

    let throughput_samples: Vec<GaugeSample> = snapshot
        .targets
        .iter()
        .filter_map(|t| {
            t.throughput_mbps
                .map(|v| GaugeSample::new(&[("target", t.name.as_str())], v))
        })
        .collect();
    write_gauge_family(
        &mut out,
        "network_probe_tcp_throughput_mbps",
        "last measured bulk-send TCP throughput in Mbps",
        &throughput_samples,
    );

    for target in &snapshot.targets {
        let proto = target.protocol.as_str().to_lowercase();
        let metric = format!("network_probe_{proto}_latency_hist");
        write_histogram_family(
            &mut out,
            &metric,
            "latency histogram in milliseconds",
            &[("target", target.name.as_str())],
            &BUCKET_BOUNDS_MS,
            &target.histogram.cumulative_counts(),
            target.histogram.count(),
            target.histogram.sum(),
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmanager_common::Protocol;

    #[test]
    fn render_includes_udp_and_tcp_gauges() {
        let mut snap = Snapshot::default();
        let mut udp =
            TargetGauges::new("robot-control".into(), "robot-control-svc".into(), Protocol::Udp);
        udp.latency_ms = Some(1.5);
        udp.success = true;
        snap.targets.push(udp);

        let mut tcp = TargetGauges::new(
            "safety-scanner".into(),
            "safety-scanner-svc".into(),
            Protocol::Tcp,
        );
        tcp.latency_ms = Some(0.8);
        tcp.success = true;
        tcp.throughput_mbps = Some(120.0);
        snap.targets.push(tcp);

        let body = render(&snap);
        assert!(body.contains("network_probe_udp_latency_ms"));
        assert!(body.contains("network_probe_tcp_latency_ms"));
        assert!(body.contains("network_probe_tcp_throughput_mbps"));
        assert!(body.contains("target=\"robot-control\""));
        assert!(body.contains("network_probe_udp_success{target=\"robot-control\"} 1"));
    }

    #[test]
    fn render_stays_responsive_with_no_targets() {
        let snap = Snapshot::default();
        let body = render(&snap);
        assert!(body.contains("network_probe_build_info"));
    }
}
