//! ---
//! vigil_section: "09-staged-rollout"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Deterministic traffic split and rollout progression rule."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use anyhow::Result;
use prometheus::{IntCounterVec, Opts};
use vigil_metrics::SharedRegistry;

use crate::manager::VersionChoice;
use crate::policy::RolloutDecision;

/// Metrics published by the rollout manager.
#[derive(Clone)]
pub struct RolloutDecisionMetrics {
    assignments_total: IntCounterVec,
    decisions_total: IntCounterVec,
}

impl RolloutDecisionMetrics {
    /// Register the rollout metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let assignments_total = IntCounterVec::new(
            Opts::new(
                "vigil_rollout_assignments_total",
                "Requests assigned to each pipeline version",
            ),
            &["version"],
        )?;
        registry.register(Box::new(assignments_total.clone()))?;

        let decisions_total = IntCounterVec::new(
            Opts::new(
                "vigil_rollout_decisions_total",
                "Stage evaluations by resulting decision",
            ),
            &["stage", "decision"],
        )?;
        registry.register(Box::new(decisions_total.clone()))?;

        Ok(Self {
            assignments_total,
            decisions_total,
        })
    }

    pub fn record_assignment(&self, version: VersionChoice) {
        self.assignments_total
            .with_label_values(&[version.as_str()])
            .inc();
    }

    pub fn record_decision(&self, stage: &str, decision: &RolloutDecision) {
        self.decisions_total
            .with_label_values(&[stage, decision.as_str()])
            .inc();
    }
}

impl std::fmt::Debug for RolloutDecisionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolloutDecisionMetrics").finish_non_exhaustive()
    }
}
