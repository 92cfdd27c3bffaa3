//! DNS resolution with retain-last-good-on-failure semantics (spec
//! §4.1: "DNS-resolution failure publishes target resolution failure
//! ... and retains the last good observation gauge unchanged").

use std::net::SocketAddr;

/// Resolves `host:port`, returning `None` on failure. Callers keep
/// whatever address they last resolved successfully and retry next
/// cycle — this function itself is stateless.
pub async fn resolve(host: &str, port: u16) -> Option<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
}
