//! Per-application SLA evaluation, decision aggregation, and the
//! asymmetric AIMD enforcement law (spec §4.3.3–4.3.5).

use crate::config::{ControlConfig, CriticalApp, Protocol};

/// Outcome of evaluating one critical application's current jitter
/// against its configured threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct AppEvaluation {
    pub jitter_ms: f64,
    pub violation: bool,
    /// Only meaningful when `violation` is true.
    pub severity: f64,
    pub stable: bool,
    /// Whether this application's rolling window had reached the
    /// minimum sample count (spec §4.3.2) when `jitter_ms` was
    /// computed. `jitter_ms == 0.0` alone cannot distinguish
    /// insufficient data from a genuinely constant, full window, so
    /// aggregation gates RELEASE/THROTTLE on this flag rather than on
    /// `stable` alone (spec §4.3.7, §8).
    pub sufficient_samples: bool,
}

/// Evaluates one application's SLA given its freshly computed jitter.
pub fn evaluate(app: &CriticalApp, jitter_ms: f64, sufficient_samples: bool) -> AppEvaluation {
    let violation = jitter_ms > app.max_jitter_ms;
    let severity = if violation {
        jitter_ms / app.max_jitter_ms
    } else {
        0.0
    };
    let stable = jitter_ms < app.max_jitter_ms / 2.0;
    AppEvaluation {
        jitter_ms,
        violation,
        severity,
        stable,
        sufficient_samples,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Throttle,
    Release,
    Maintain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
}

/// One evaluated critical application, paired with its static config,
/// as seen by the aggregation step.
pub struct EvaluatedApp<'a> {
    pub app: &'a CriticalApp,
    pub eval: AppEvaluation,
}

/// Aggregates per-application evaluations into a single tick decision
/// (spec §4.3.4). Only UDP-protocol apps drive THROTTLE/RELEASE; TCP
/// apps are observed but never selected here — by design (spec
/// rationale: TCP jitter is dominated by send-buffer/receiver
/// scheduling effects uncorrelated with cross-traffic).
pub fn aggregate(evaluated: &[EvaluatedApp<'_>]) -> Decision {
    let udp_apps: Vec<&EvaluatedApp<'_>> = evaluated
        .iter()
        .filter(|e| e.app.protocol == Protocol::Udp)
        .collect();

    // Degenerate case (spec §4.3.7, §8): if no UDP app has accumulated
    // enough samples yet, a jitter reading of 0.0 is meaningless, not
    // evidence of stability — MAINTAIN rather than RELEASE.
    if !udp_apps.iter().any(|e| e.eval.sufficient_samples) {
        return Decision {
            action: Action::Maintain,
            reason: "insufficient samples for any critical UDP app".to_string(),
        };
    }

    // Step 1: highest-priority UDP violator wins, ties broken by
    // config insertion order (spec §3). `max_by_key` would instead
    // keep the *last* equal-priority violator; folding and only
    // replacing on a strictly greater priority keeps the first.
    let worst_violation = udp_apps.iter().filter(|e| e.eval.violation).fold(
        None::<&&EvaluatedApp<'_>>,
        |best, e| match best {
            Some(b) if b.app.priority >= e.app.priority => best,
            _ => Some(e),
        },
    );

    if let Some(e) = worst_violation {
        return Decision {
            action: Action::Throttle,
            reason: format!(
                "{} {} jitter {:.3}ms > {}ms",
                e.app.name,
                e.app.protocol.as_str(),
                e.eval.jitter_ms,
                e.app.max_jitter_ms
            ),
        };
    }

    // Step 2: release only if every UDP app is present and stable.
    if !udp_apps.is_empty() && udp_apps.iter().all(|e| e.eval.stable) {
        return Decision {
            action: Action::Release,
            reason: "all critical UDP apps stable (jitter < 50% threshold)".to_string(),
        };
    }

    Decision {
        action: Action::Maintain,
        reason: "apps within acceptable range".to_string(),
    }
}

/// Applies the asymmetric AIMD step to a single best-effort target's
/// current bandwidth, returning the new, bound-clamped value (spec
/// §4.3.5). Idempotent at the bounds (§4.3.6).
pub fn apply_aimd(current_bw_mbps: i64, action: Action, control: &ControlConfig) -> i64 {
    match action {
        Action::Throttle => {
            let reduction = ((current_bw_mbps as f64) * control.decrease_fraction).floor() as i64;
            (current_bw_mbps - reduction).max(control.min_bandwidth_mbps)
        }
        Action::Release => {
            (current_bw_mbps + control.increase_step_mbps).min(control.max_bandwidth_mbps)
        }
        Action::Maintain => current_bw_mbps,
    }
}
