//! ---
//! vigil_section: "03-observability"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Metrics collection and export utilities."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Registry, TextEncoder};
use tracing::debug;

/// Shared registry type used across components.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Standard latency buckets (1ms doubling up to ~32s) used by call histograms.
pub fn latency_buckets() -> Result<Vec<f64>> {
    prometheus::exponential_buckets(0.001, 2.0, 16).context("failed to construct histogram buckets")
}

/// Render every family in the registry using the Prometheus text format.
pub fn encode_text(registry: &SharedRegistry) -> Result<String> {
    let families = registry.gather();
    debug!(families = families.len(), "encoding metrics registry");
    TextEncoder::new()
        .encode_to_string(&families)
        .context("failed to encode metrics")
}

pub use prometheus;
