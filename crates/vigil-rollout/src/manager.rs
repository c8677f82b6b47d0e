//! ---
//! vigil_section: "09-staged-rollout"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Deterministic traffic split and rollout progression rule."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};
use vigil_common::config::RolloutConfig;

use crate::error::RolloutError;
use crate::metrics::RolloutDecisionMetrics;
use crate::policy::{RolloutDecision, RolloutMetrics, RolloutPolicy};
use crate::split::{request_fingerprint, should_use_new_version};
use crate::stage::StageLadder;

/// Pipeline version chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionChoice {
    Old,
    New,
}

impl VersionChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionChoice::Old => "old",
            VersionChoice::New => "new",
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, VersionChoice::New)
    }
}

impl fmt::Display for VersionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routes requests between versions for the current stage and evaluates
/// stage snapshots for the orchestrator. Holds no per-request state.
#[derive(Debug, Clone, Default)]
pub struct RolloutManager {
    policy: RolloutPolicy,
    metrics: Option<RolloutDecisionMetrics>,
}

impl RolloutManager {
    pub fn new(policy: RolloutPolicy, metrics: Option<RolloutDecisionMetrics>) -> Self {
        Self { policy, metrics }
    }

    pub fn from_config(
        config: &RolloutConfig,
        metrics: Option<RolloutDecisionMetrics>,
    ) -> Result<Self, RolloutError> {
        Ok(Self::new(RolloutPolicy::from_config(config)?, metrics))
    }

    pub fn policy(&self) -> &RolloutPolicy {
        &self.policy
    }

    pub fn stages(&self) -> &StageLadder {
        self.policy.ladder()
    }

    /// Version for `request_id` while `stage` is live.
    pub fn assign(&self, stage: &str, request_id: &str) -> Result<VersionChoice, RolloutError> {
        let stage = self.stages().get(stage)?;
        let choice = if should_use_new_version(stage.traffic_percentage, request_id) {
            VersionChoice::New
        } else {
            VersionChoice::Old
        };
        debug!(
            target: "vigil::rollout::split",
            stage = %stage.label,
            fingerprint = %request_fingerprint(request_id),
            version = %choice,
            "request assigned",
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_assignment(choice);
        }
        Ok(choice)
    }

    pub fn evaluate(&self, snapshot: &RolloutMetrics) -> Result<RolloutDecision, RolloutError> {
        let decision = self.policy.evaluate(snapshot)?;
        match &decision {
            RolloutDecision::Rollback => warn!(
                target: "vigil::rollout::policy",
                stage = %snapshot.stage,
                error_rate = snapshot.error_rate(),
                threshold = self.policy.rollback_error_rate(),
                "rollout stage exceeded error budget; rolling back",
            ),
            RolloutDecision::Hold => debug!(
                target: "vigil::rollout::policy",
                stage = %snapshot.stage,
                total_requests = snapshot.total_requests,
                duration_secs = snapshot.duration.as_secs(),
                "rollout stage holding",
            ),
            RolloutDecision::Advance { next } => info!(
                target: "vigil::rollout::policy",
                stage = %snapshot.stage,
                next = %next,
                error_rate = snapshot.error_rate(),
                "rollout stage advancing",
            ),
            RolloutDecision::Complete => info!(
                target: "vigil::rollout::policy",
                stage = %snapshot.stage,
                "rollout complete",
            ),
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(&snapshot.stage, &decision);
        }
        Ok(decision)
    }
}
