//! Shared types for the flow manager: configuration, the error
//! taxonomy, the rolling-window IQR jitter statistic, SLA decision and
//! AIMD enforcement logic, bandwidth-annotation parsing, and
//! Prometheus text-exposition rendering/parsing.
//!
//! Kept deliberately free of sockets and async so every rule in this
//! crate is exercised by plain unit tests.

pub mod bandwidth;
pub mod config;
pub mod decision;
pub mod error;
pub mod prometheus_text;
pub mod window;

pub use config::{
    BestEffortTarget, ControlConfig, CriticalApp, Protocol, SystemConfig, SystemConfigInput,
};
pub use error::FlowError;
pub use window::RollingWindow;
