//! Per-best-effort-target bookkeeping beyond the raw bandwidth integer
//! (spec §3 "ControlState"): current enforced bandwidth, and whether
//! the target has been permanently removed after a `PatchPermanent`
//! error (spec §7 — "all following ticks skip it and keep logging").

use std::collections::{HashMap, HashSet};

use flowmanager_common::{BestEffortTarget, FlowError};

use crate::orchestrator::OrchestratorClient;

pub struct ControlState {
    bandwidths: HashMap<String, i64>,
    removed: HashSet<String>,
}

impl ControlState {
    /// Initializes current bandwidth per target by reading it back
    /// from the orchestrator, falling back to the configured
    /// `initial_bandwidth` when the annotation is absent or unreadable
    /// — matches the original's `bw if bw else target.initial_bandwidth`.
    pub async fn sync_initial(
        targets: &[BestEffortTarget],
        orchestrator: &dyn OrchestratorClient,
    ) -> Self {
        let mut bandwidths = HashMap::with_capacity(targets.len());
        for t in targets {
            let current = orchestrator
                .get_bandwidth(&t.deployment, &t.namespace)
                .await
                .unwrap_or(t.initial_bandwidth_mbps);
            bandwidths.insert(t.deployment.clone(), current);
        }
        Self {
            bandwidths,
            removed: HashSet::new(),
        }
    }

    pub fn current(&self, deployment: &str) -> i64 {
        *self.bandwidths.get(deployment).unwrap_or(&0)
    }

    pub fn set(&mut self, deployment: &str, mbps: i64) {
        self.bandwidths.insert(deployment.to_string(), mbps);
    }

    pub fn is_removed(&self, deployment: &str) -> bool {
        self.removed.contains(deployment)
    }

    pub fn mark_removed(&mut self, deployment: &str) {
        self.removed.insert(deployment.to_string());
    }

    /// Records the outcome of a patch attempt, marking the target
    /// permanently removed on `PatchPermanent` so future ticks stop
    /// trying it (spec §7).
    pub fn record_patch_result(&mut self, deployment: &str, new_bw: i64, result: &Result<(), FlowError>) {
        match result {
            Ok(()) => self.set(deployment, new_bw),
            Err(FlowError::PatchPermanent { .. }) => self.mark_removed(deployment),
            Err(_) => {}
        }
    }

    pub fn snapshot(&self) -> HashMap<String, i64> {
        self.bandwidths.clone()
    }
}
