//! The probe's gauge table — process-wide, single-writer (the probe
//! worker) / multiple-reader (the scrape handler) state.
//!
//! Published via [`arc_swap::ArcSwap`] whole-struct replacement: the
//! probe worker builds a new snapshot each cycle and swaps it in with
//! no lock held on the read path, per design note §9 ("model it as a
//! single owner publishing to an atomically readable snapshot").

use std::sync::Arc;

use arc_swap::ArcSwap;
use flowmanager_common::Protocol;

use crate::histogram::Histogram;

/// One target's last-known gauge values.
#[derive(Debug, Clone)]
pub struct TargetGauges {
    pub name: String,
    pub host: String,
    pub protocol: Protocol,
    pub latency_ms: Option<f64>,
    pub success: bool,
    /// Only ever set for TCP targets, and only every Kth cycle.
    pub throughput_mbps: Option<f64>,
    pub histogram: Histogram,
}

impl TargetGauges {
    pub fn new(name: String, host: String, protocol: Protocol) -> Self {
        Self {
            name,
            host,
            protocol,
            latency_ms: None,
            success: false,
            throughput_mbps: None,
            histogram: Histogram::new(),
        }
    }
}

/// Process-wide snapshot of all targets' gauges at a point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub targets: Vec<TargetGauges>,
}

/// Lock-free shared gauge table.
pub struct GaugeTable {
    inner: ArcSwap<Snapshot>,
}

impl GaugeTable {
    pub fn new(initial: Snapshot) -> Arc<Self> {
        Arc::new(Self {
            inner: ArcSwap::from_pointee(initial),
        })
    }

    /// Reads a consistent snapshot (no blocking, no locks).
    pub fn load(&self) -> Arc<Snapshot> {
        self.inner.load_full()
    }

    /// Publishes a new snapshot atomically (single writer only).
    pub fn store(&self, snapshot: Snapshot) {
        self.inner.store(Arc::new(snapshot));
    }
}
