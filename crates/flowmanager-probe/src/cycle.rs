//! Per-target probe cycle: resolve, measure, publish.
//!
//! One [`TargetState`] per configured critical application, driven on a
//! fixed `probe_interval` tick by [`run_cycle`]. Mirrors the original
//! probe's `run_probe_cycle`, including the every-5th-cycle TCP
//! throughput throttle.

use std::net::SocketAddr;
use std::time::Duration;

use flowmanager_common::Protocol;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::gauges::TargetGauges;
use crate::probe;
use crate::resolve::resolve;

/// How many cycles between TCP throughput measurements (spec: "every
/// 5th cycle to reduce overhead").
const THROUGHPUT_EVERY_N_CYCLES: u32 = 5;

const UDP_BURST: usize = 10;
const UDP_PER_PROBE_TIMEOUT: Duration = Duration::from_millis(200);
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const TCP_THROUGHPUT_DURATION: Duration = Duration::from_millis(500);

/// Mutable per-target state the cycle loop owns between ticks: the
/// resolved address cache (re-resolved lazily on failure) and the
/// UDP socket connected to that address, plus the throughput-cycle
/// counter.
pub struct TargetState {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    resolved: Option<SocketAddr>,
    udp_socket: Option<UdpSocket>,
    throughput_counter: u32,
}

impl TargetState {
    pub fn new(name: String, host: String, port: u16, protocol: Protocol) -> Self {
        Self {
            name,
            host,
            port,
            protocol,
            resolved: None,
            udp_socket: None,
            throughput_counter: 0,
        }
    }

    async fn ensure_resolved(&mut self) -> Option<SocketAddr> {
        if self.resolved.is_none() {
            self.resolved = resolve(&self.host, self.port).await;
            if self.resolved.is_none() {
                tracing::warn!(target = %self.name, host = %self.host, "DNS resolution failed, retaining last gauge values");
            }
        }
        self.resolved
    }

    async fn ensure_udp_socket(&mut self, addr: SocketAddr) -> Option<&UdpSocket> {
        if self.udp_socket.is_none() {
            match UdpSocket::bind("0.0.0.0:0").await {
                Ok(sock) => {
                    if sock.connect(addr).await.is_err() {
                        return None;
                    }
                    self.udp_socket = Some(sock);
                }
                Err(e) => {
                    tracing::warn!(target = %self.name, error = %e, "failed to bind UDP probe socket");
                    return None;
                }
            }
        }
        self.udp_socket.as_ref()
    }
}

/// Runs one measurement cycle for a single target, mutating `gauges`
/// in place. Returns without touching `gauges.latency_ms`/`success` if
/// the target cannot currently be resolved, so a stale-but-valid
/// gauge value is retained (spec §4.1).
pub async fn run_cycle(state: &mut TargetState, gauges: &mut TargetGauges, clock_origin: Instant) {
    let Some(addr) = state.ensure_resolved().await else {
        return;
    };

    match state.protocol {
        Protocol::Udp => {
            if state.ensure_udp_socket(addr).await.is_none() {
                state.resolved = None;
                return;
            }
            let socket = state.udp_socket.as_ref().unwrap();
            match probe::measure_udp_rtt(socket, UDP_BURST, UDP_PER_PROBE_TIMEOUT, clock_origin)
                .await
            {
                Some(latency) => {
                    gauges.latency_ms = Some(latency);
                    gauges.success = true;
                    gauges.histogram.observe(latency);
                }
                None => {
                    gauges.success = false;
                }
            }
        }
        Protocol::Tcp => {
            match probe::measure_tcp_handshake(addr, TCP_CONNECT_TIMEOUT).await {
                Some(latency) => {
                    gauges.latency_ms = Some(latency);
                    gauges.success = true;
                    gauges.histogram.observe(latency);
                }
                None => {
                    gauges.success = false;
                }
            }

            state.throughput_counter += 1;
            if state.throughput_counter >= THROUGHPUT_EVERY_N_CYCLES {
                state.throughput_counter = 0;
                if let Some(mbps) =
                    probe::measure_tcp_throughput(addr, TCP_CONNECT_TIMEOUT, TCP_THROUGHPUT_DURATION)
                        .await
                {
                    gauges.throughput_mbps = Some(mbps);
                }
            }
        }
    }
}
