//! Fetches raw per-application latency from the probe's scrape
//! endpoint and maintains each application's rolling window (spec
//! §4.3.1–4.3.2).
//!
//! Grounded on the original `MetricsClient.fetch_and_calculate_jitter`:
//! one HTTP GET of the whole exposition document per tick, a single
//! labeled line picked out of it per application, appended to that
//! application's window.

use std::collections::HashMap;
use std::time::Duration;

use flowmanager_common::prometheus_text::find_labeled_value;
use flowmanager_common::{CriticalApp, FlowError, Protocol, RollingWindow};

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-application rolling windows, keyed by app name. Lazily
/// initialized to the configured window size on first measurement —
/// matches the original's `if app.name not in self.windows`.
pub struct WindowStore {
    windows: HashMap<String, RollingWindow>,
    capacity: usize,
}

impl WindowStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: HashMap::new(),
            capacity,
        }
    }

    fn window_for(&mut self, app_name: &str) -> &mut RollingWindow {
        self.windows
            .entry(app_name.to_string())
            .or_insert_with(|| RollingWindow::new(self.capacity))
    }

    /// Records a fresh sample for `app_name` and returns the window's
    /// current IQR jitter.
    pub fn record(&mut self, app_name: &str, latency_ms: f64) -> f64 {
        let window = self.window_for(app_name);
        window.push(latency_ms);
        window.jitter_iqr()
    }

    /// Whether `app_name`'s window has reached the minimum sample
    /// count for jitter to be meaningful (spec §4.3.2). An app with no
    /// window yet (never measured) is trivially insufficient.
    pub fn has_sufficient_samples(&self, app_name: &str) -> bool {
        self.windows
            .get(app_name)
            .is_some_and(|w| w.len() >= flowmanager_common::window::MIN_SAMPLES_FOR_JITTER)
    }
}

fn metric_name_for(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Udp => "network_probe_udp_latency_ms",
        Protocol::Tcp => "network_probe_tcp_latency_ms",
    }
}

/// Fetches the probe's whole exposition document once per call. Callers
/// ingesting several apps in one tick should share a single fetched
/// document rather than re-fetching per app (see `tick::run_tick`).
pub async fn fetch_scrape_text(http: &reqwest::Client, probe_url: &str) -> Result<String, FlowError> {
    let response = http
        .get(probe_url)
        .timeout(SCRAPE_TIMEOUT)
        .send()
        .await
        .map_err(|e| FlowError::ScrapeUnavailable(e.to_string()))?;

    let response = response
        .error_for_status()
        .map_err(|e| FlowError::ScrapeUnavailable(e.to_string()))?;

    response
        .text()
        .await
        .map_err(|e| FlowError::ScrapeUnavailable(e.to_string()))
}

/// Pulls one application's latest latency sample out of an already
/// fetched exposition document. Returns `None` if the metric line for
/// this application is absent — the window is left untouched by the
/// caller in that case (spec: "contributes no sample").
pub fn extract_latency(scrape_text: &str, app: &CriticalApp) -> Option<f64> {
    find_labeled_value(scrape_text, metric_name_for(app.protocol), "target", &app.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmanager_common::config::Protocol;

    fn app(name: &str, protocol: Protocol) -> CriticalApp {
        CriticalApp {
            name: name.to_string(),
            service: format!("{name}-svc"),
            port: 1,
            protocol,
            max_jitter_ms: 5.0,
            max_latency_ms: None,
            priority: 1,
        }
    }

    #[test]
    fn extract_latency_finds_labeled_line() {
        let text = "network_probe_udp_latency_ms{target=\"robot-control\"} 1.234\n";
        let a = app("robot-control", Protocol::Udp);
        assert_eq!(extract_latency(text, &a), Some(1.234));
    }

    #[test]
    fn extract_latency_none_when_absent() {
        let text = "network_probe_tcp_latency_ms{target=\"other\"} 5.0\n";
        let a = app("robot-control", Protocol::Udp);
        assert_eq!(extract_latency(text, &a), None);
    }

    #[test]
    fn has_sufficient_samples_tracks_per_app_fill_level() {
        let mut store = WindowStore::new(20);
        assert!(!store.has_sufficient_samples("a"));
        for v in [1.0, 2.0, 3.0, 4.0] {
            store.record("a", v);
        }
        assert!(!store.has_sufficient_samples("a"));
        store.record("a", 5.0);
        assert!(store.has_sufficient_samples("a"));
    }

    #[test]
    fn window_store_tracks_per_app_windows_independently() {
        let mut store = WindowStore::new(20);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            store.record("a", v);
        }
        for v in [100.0, 100.0, 100.0, 100.0, 100.0] {
            store.record("b", v);
        }
        assert!(store.record("a", 6.0) >= 0.0);
        assert_eq!(store.record("b", 100.0), 0.0);
    }
}
