//! Flow manager control-loop library.
//!
//! Re-exports the tick logic, orchestrator client trait (and its fake
//! implementation), and exported-gauge table so integration tests can
//! drive whole ticks without a live cluster — mirrors the teacher
//! workspace's own bin+lib split (`strata-control`).

pub mod gauges;
pub mod ingestion;
pub mod metrics_server;
pub mod orchestrator;
pub mod state;
pub mod tick;
