//! Declarative SLA configuration: a raw deserialized `*Input` document,
//! resolved and validated into an immutable [`SystemConfig`].
//!
//! Follows the teacher workspace's `Input` → resolved-`Config` split
//! (see `rist-bonding-core::config::BondingConfigInput::resolve`):
//! optional fields in the wire format, defaults filled in on resolve,
//! validation run once at startup.

use serde::Deserialize;
use std::path::Path;

use crate::error::FlowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Udp,
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Udp => "UDP",
            Protocol::Tcp => "TCP",
        }
    }
}

// ── Raw (wire-format) input ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControlInput {
    pub probe_interval: Option<f64>,
    pub control_interval: Option<f64>,
    pub window_size: Option<usize>,
    /// Legacy, unused when `decrease_fraction` is set (spec §6).
    pub step_down: Option<i64>,
    pub step_up: Option<i64>,
    pub min_bandwidth: Option<i64>,
    pub max_bandwidth: Option<i64>,
    pub decrease_fraction: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CriticalAppInput {
    pub name: String,
    pub service: String,
    pub port: u16,
    pub protocol: Protocol,
    pub max_jitter_ms: f64,
    #[serde(default)]
    pub max_latency_ms: Option<f64>,
    pub priority: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BestEffortTargetInput {
    pub deployment: String,
    pub namespace: String,
    pub initial_bandwidth: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SystemConfigInput {
    pub control: ControlInput,
    #[serde(default)]
    pub critical_apps: Vec<CriticalAppInput>,
    #[serde(default)]
    pub best_effort_targets: Vec<BestEffortTargetInput>,
    pub severity_multiplier_enabled: Option<bool>,
    pub severity_max_multiplier: Option<f64>,
}

// ── Resolved, validated configuration ────────────────────────────────

#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub probe_interval_secs: f64,
    pub control_interval_secs: f64,
    pub window_size: usize,
    pub min_bandwidth_mbps: i64,
    pub max_bandwidth_mbps: i64,
    pub decrease_fraction: f64,
    pub increase_step_mbps: i64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 0.5,
            control_interval_secs: 2.0,
            window_size: 20,
            min_bandwidth_mbps: 10,
            max_bandwidth_mbps: 1000,
            decrease_fraction: 0.20,
            increase_step_mbps: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CriticalApp {
    pub name: String,
    pub service: String,
    pub port: u16,
    pub protocol: Protocol,
    pub max_jitter_ms: f64,
    pub max_latency_ms: Option<f64>,
    pub priority: i64,
}

#[derive(Debug, Clone)]
pub struct BestEffortTarget {
    pub deployment: String,
    pub namespace: String,
    pub initial_bandwidth_mbps: i64,
}

#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub control: ControlConfig,
    /// Sorted by priority descending; ties broken by original (insertion)
    /// order, which `Vec::sort_by` preserves (stable sort).
    pub critical_apps: Vec<CriticalApp>,
    pub best_effort_targets: Vec<BestEffortTarget>,
    /// Retired from the decision path (see DESIGN.md open question 3);
    /// retained only so existing config documents still parse.
    pub severity_multiplier_enabled: bool,
    pub severity_max_multiplier: f64,
}

impl SystemConfigInput {
    /// Resolves defaults and validates, producing a [`SystemConfig`] or
    /// a `ConfigFatal` error describing the first violated rule.
    pub fn resolve(self) -> Result<SystemConfig, FlowError> {
        let defaults = ControlConfig::default();
        let ctrl = self.control;

        let control = ControlConfig {
            probe_interval_secs: ctrl.probe_interval.unwrap_or(defaults.probe_interval_secs),
            control_interval_secs: ctrl
                .control_interval
                .unwrap_or(defaults.control_interval_secs),
            window_size: ctrl.window_size.unwrap_or(defaults.window_size),
            min_bandwidth_mbps: ctrl.min_bandwidth.unwrap_or(defaults.min_bandwidth_mbps),
            max_bandwidth_mbps: ctrl.max_bandwidth.unwrap_or(defaults.max_bandwidth_mbps),
            decrease_fraction: ctrl.decrease_fraction.unwrap_or(defaults.decrease_fraction),
            increase_step_mbps: ctrl.step_up.unwrap_or(defaults.increase_step_mbps),
        };

        let mut critical_apps: Vec<CriticalApp> = self
            .critical_apps
            .into_iter()
            .map(|a| CriticalApp {
                name: a.name,
                service: a.service,
                port: a.port,
                protocol: a.protocol,
                max_jitter_ms: a.max_jitter_ms,
                max_latency_ms: a.max_latency_ms,
                priority: a.priority,
            })
            .collect();

        // Stable sort: priority descending, ties keep config (insertion) order.
        critical_apps.sort_by(|a, b| b.priority.cmp(&a.priority));

        let best_effort_targets: Vec<BestEffortTarget> = self
            .best_effort_targets
            .into_iter()
            .map(|t| BestEffortTarget {
                deployment: t.deployment,
                namespace: t.namespace,
                initial_bandwidth_mbps: t.initial_bandwidth,
            })
            .collect();

        let severity_multiplier_enabled = self.severity_multiplier_enabled.unwrap_or(true);
        let severity_max_multiplier = self.severity_max_multiplier.unwrap_or(5.0);

        let config = SystemConfig {
            control,
            critical_apps,
            best_effort_targets,
            severity_multiplier_enabled,
            severity_max_multiplier,
        };

        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &SystemConfig) -> Result<(), FlowError> {
    if config.critical_apps.is_empty() {
        return Err(FlowError::ConfigFatal(
            "critical_apps must be non-empty".into(),
        ));
    }
    if config.best_effort_targets.is_empty() {
        return Err(FlowError::ConfigFatal(
            "best_effort_targets must be non-empty".into(),
        ));
    }
    if config.control.min_bandwidth_mbps >= config.control.max_bandwidth_mbps {
        return Err(FlowError::ConfigFatal(
            "control.min_bandwidth must be < control.max_bandwidth".into(),
        ));
    }
    if config.control.window_size < 5 {
        return Err(FlowError::ConfigFatal(
            "control.window_size must be >= 5".into(),
        ));
    }
    if config.control.probe_interval_secs <= 0.0 {
        return Err(FlowError::ConfigFatal(
            "control.probe_interval must be > 0".into(),
        ));
    }
    if config.control.control_interval_secs <= 0.0 {
        return Err(FlowError::ConfigFatal(
            "control.control_interval must be > 0".into(),
        ));
    }
    if config.control.decrease_fraction <= 0.0 || config.control.decrease_fraction >= 1.0 {
        return Err(FlowError::ConfigFatal(
            "control.decrease_fraction must satisfy 0 < d < 1".into(),
        ));
    }
    Ok(())
}

/// Loads and resolves a [`SystemConfig`] from a TOML document on disk.
pub fn load(path: &Path) -> Result<SystemConfig, FlowError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| FlowError::ConfigFatal(format!("cannot read {}: {e}", path.display())))?;
    parse(&text)
}

/// Parses a TOML document into a resolved, validated [`SystemConfig`].
pub fn parse(text: &str) -> Result<SystemConfig, FlowError> {
    let input: SystemConfigInput =
        toml::from_str(text).map_err(|e| FlowError::ConfigFatal(format!("invalid TOML: {e}")))?;
    input.resolve()
}
