//! Network Flow Manager — UDP reflector.
//!
//! Stateless echo daemon: whatever a datagram's payload is, it is sent
//! straight back to the sender. The probe uses round-trip time against
//! this echo to estimate jitter (spec §4.2). One socket is bound per
//! configured port so multiple UDP critical applications can each have
//! a dedicated reflector port.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 5201;
/// Receive buffer large enough for any probe payload this workspace
/// sends (the UDP probe payload is a single `f64` timestamp).
const RECV_BUF_LEN: usize = 1024;
/// Minimum spacing between repeated receive-error log lines, so a
/// persistently failing socket doesn't flood the log.
const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let ports = reflector_ports();
    tracing::info!(?ports, "flowmanager-reflector starting");

    let mut handles = Vec::with_capacity(ports.len());
    for port in ports {
        handles.push(tokio::spawn(async move {
            if let Err(e) = run_reflector(port).await {
                tracing::error!(port, error = %e, "reflector task exited");
            }
        }));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = futures::future::join_all(handles) => {
            tracing::warn!("all reflector tasks exited");
        }
    }

    Ok(())
}

/// Reads `REFLECTOR_PORTS` as a comma-separated list, falling back to
/// the single default port (matching the original server's hardcoded
/// 5201) when unset or unparseable.
fn reflector_ports() -> Vec<u16> {
    match std::env::var("REFLECTOR_PORTS") {
        Ok(raw) => {
            let parsed: Vec<u16> = raw
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if parsed.is_empty() {
                vec![DEFAULT_PORT]
            } else {
                parsed
            }
        }
        Err(_) => vec![DEFAULT_PORT],
    }
}

async fn run_reflector(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let socket = UdpSocket::bind(addr).await?;
    tracing::info!(%addr, "UDP reflector listening");

    let mut buf = [0u8; RECV_BUF_LEN];
    let mut last_error_logged = Instant::now() - ERROR_LOG_INTERVAL;

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                if let Err(e) = socket.send_to(&buf[..len], from).await {
                    log_throttled(&mut last_error_logged, port, &e.to_string());
                }
            }
            Err(e) => {
                log_throttled(&mut last_error_logged, port, &e.to_string());
            }
        }
    }
}

fn log_throttled(last_logged: &mut Instant, port: u16, message: &str) {
    let now = Instant::now();
    if now.duration_since(*last_logged) >= ERROR_LOG_INTERVAL {
        tracing::warn!(port, error = message, "reflector socket error");
        *last_logged = now;
    }
}
