//! The controller's own exported Prometheus gauges: per-app jitter
//! (used for decisions) and per-target enforced bandwidth. Grounded on
//! the original's module-level `udp_jitter_gauge` / `tcp_jitter_gauge`
//! / `bandwidth_limit_gauge`, republished here as an
//! `arc_swap::ArcSwap` snapshot rather than the Python client's
//! mutable global gauges, so the scrape handler never blocks on the
//! tick loop (same design note as the probe's gauge table).

use std::sync::Arc;

use arc_swap::ArcSwap;

#[derive(Debug, Clone)]
pub struct JitterSample {
    pub service: String,
    pub target_host: String,
    pub jitter_ms: f64,
}

#[derive(Debug, Clone)]
pub struct BandwidthSample {
    pub deployment: String,
    pub namespace: String,
    pub mbps: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ExportedState {
    pub udp_jitter: Vec<JitterSample>,
    pub tcp_jitter: Vec<JitterSample>,
    pub bandwidth_limit: Vec<BandwidthSample>,
}

pub struct GaugeTable {
    inner: ArcSwap<ExportedState>,
}

impl GaugeTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: ArcSwap::from_pointee(ExportedState::default()),
        })
    }

    pub fn load(&self) -> Arc<ExportedState> {
        self.inner.load_full()
    }

    pub fn store(&self, state: ExportedState) {
        self.inner.store(Arc::new(state));
    }
}
