//! ---
//! vigil_section: "10-operator-tooling"
//! vigil_subsection: "binary"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Operator CLI for the Vigil control plane."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use vigil_metrics::{encode_text, new_registry};
use vigil_resilience::{ResilienceMetrics, ServiceManager};
use vigil_rollout::{RolloutDecisionMetrics, RolloutManager};
use vigil_slo::{SloMetrics, SloTracker};

use crate::load_config;

#[derive(Debug, Args)]
pub struct MetricsCommand {}

impl MetricsCommand {
    /// Initialise every component against one registry and expose it.
    pub fn execute(self, config: Option<&Path>) -> Result<String> {
        let loaded = load_config(config)?;
        let app = &loaded.config;
        let registry = new_registry();

        let _manager = ServiceManager::from_config(
            &app.services,
            Some(ResilienceMetrics::new(registry.clone())?),
        )?;
        let tracker = SloTracker::from_config(&app.slo, Some(SloMetrics::new(registry.clone())?))
            .context("invalid [slo] section")?;
        tracker.check_all_slos();
        let _rollout = RolloutManager::from_config(
            &app.rollout,
            Some(RolloutDecisionMetrics::new(registry.clone())?),
        )
        .context("invalid [rollout] section")?;

        encode_text(&registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_seeded_families() {
        let (_dir, path) = crate::test_support::config_tree();
        let text = MetricsCommand {}.execute(Some(&path)).unwrap();
        assert!(text.contains("vigil_breaker_state{service=\"ocr\"} 0"));
        assert!(text.contains("vigil_slo_success_rate{route=\"/api/scan\"} 1"));
    }
}
