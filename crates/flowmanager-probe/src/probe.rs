//! Per-target probe measurements: UDP RTT, TCP handshake latency, and
//! throttled TCP throughput (spec §4.1).

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::Instant;

/// Result of one UDP RTT burst: the mean latency over successful
/// round trips (ms), or `None` if every datagram in the burst timed
/// out.
pub async fn measure_udp_rtt(
    socket: &UdpSocket,
    burst: usize,
    per_probe_timeout: Duration,
    clock_origin: Instant,
) -> Option<f64> {
    let mut latencies = Vec::with_capacity(burst);
    let mut buf = [0u8; 64];

    for _ in 0..burst {
        let send_time_s = clock_origin.elapsed().as_secs_f64();
        let payload = send_time_s.to_le_bytes();

        let sent_at = Instant::now();
        if socket.send(&payload).await.is_err() {
            continue;
        }

        match tokio::time::timeout(per_probe_timeout, socket.recv(&mut buf)).await {
            Ok(Ok(_)) => {
                latencies.push(sent_at.elapsed().as_secs_f64() * 1000.0);
            }
            _ => continue,
        }
    }

    if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
    }
}

/// Measures TCP three-way handshake latency: wall-clock from `connect`
/// to successful establishment, then closes immediately (spec: "TCP
/// sockets are opened and closed per cycle").
pub async fn measure_tcp_handshake(addr: SocketAddr, timeout: Duration) -> Option<f64> {
    let start = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Some(start.elapsed().as_secs_f64() * 1000.0),
        _ => None,
    }
}

/// Estimates TCP bulk-send throughput (Mbps) by writing a fixed buffer
/// repeatedly for `send_duration`, on a fresh connection.
pub async fn measure_tcp_throughput(
    addr: SocketAddr,
    connect_timeout: Duration,
    send_duration: Duration,
) -> Option<f64> {
    let mut stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .ok()?
        .ok()?;

    let payload = vec![b'X'; 1024];
    let start = Instant::now();
    let mut bytes_written: u64 = 0;

    while start.elapsed() < send_duration {
        match stream.write_all(&payload).await {
            Ok(()) => bytes_written += payload.len() as u64,
            Err(_) => break,
        }
    }

    let elapsed_s = start.elapsed().as_secs_f64();
    if elapsed_s <= 0.0 {
        return None;
    }
    Some((bytes_written as f64 * 8.0) / elapsed_s / 1_000_000.0)
}
