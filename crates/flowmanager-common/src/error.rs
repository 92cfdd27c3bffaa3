//! Error taxonomy shared by the probe, reflector, and controller.
//!
//! Kinds match the system's error model: `ConfigFatal` propagates to
//! process exit, everything else is caught at a tick/cycle boundary and
//! logged — never unwinds across that boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("configuration error: {0}")]
    ConfigFatal(String),

    #[error("target {target} ({transport}) unreachable: {source}")]
    TargetUnreachable {
        target: String,
        transport: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("probe scrape endpoint unavailable: {0}")]
    ScrapeUnavailable(String),

    #[error("patch of {deployment}.{namespace} failed (retriable): {source}")]
    PatchTransient {
        deployment: String,
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("patch of {deployment}.{namespace} rejected, target gone: {source}")]
    PatchPermanent {
        deployment: String,
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}
