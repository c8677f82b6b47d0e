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
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use vigil_common::config::RolloutConfig;

use crate::error::RolloutError;
use crate::stage::StageLadder;

/// Observed behaviour of the new version during one stage, as reported by
/// the metrics aggregator.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutMetrics {
    pub stage: String,
    pub traffic_percentage: u8,
    pub total_requests: u64,
    pub failed_requests: u64,
    #[serde(rename = "duration_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub duration: Duration,
}

impl RolloutMetrics {
    pub fn new(stage: impl Into<String>, traffic_percentage: u8) -> Self {
        Self {
            stage: stage.into(),
            traffic_percentage,
            total_requests: 0,
            failed_requests: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn with_requests(mut self, total: u64, failed: u64) -> Self {
        self.total_requests = total;
        self.failed_requests = failed;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// `failed / total`, or 0 when nothing has been observed yet.
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 / self.total_requests as f64
        }
    }
}

/// Outcome of evaluating a stage snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RolloutDecision {
    /// Move traffic to the next stage.
    Advance { next: String },
    /// Keep observing; not enough time or traffic yet.
    Hold,
    /// Error rate exceeded the rollback threshold.
    Rollback,
    /// The final stage has been observed long enough.
    Complete,
}

impl RolloutDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RolloutDecision::Advance { .. } => "advance",
            RolloutDecision::Hold => "hold",
            RolloutDecision::Rollback => "rollback",
            RolloutDecision::Complete => "complete",
        }
    }
}

impl fmt::Display for RolloutDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloutDecision::Advance { next } => write!(f, "advance to {next}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Rollback/advance rule applied to a stage snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutPolicy {
    ladder: StageLadder,
    rollback_error_rate: f64,
    min_stage_duration: Duration,
    min_stage_requests: u64,
}

impl RolloutPolicy {
    pub fn new(
        ladder: StageLadder,
        rollback_error_rate: f64,
        min_stage_duration: Duration,
        min_stage_requests: u64,
    ) -> Result<Self, RolloutError> {
        if !(0.0..=1.0).contains(&rollback_error_rate) {
            return Err(RolloutError::InvalidErrorRate(rollback_error_rate));
        }
        Ok(Self {
            ladder,
            rollback_error_rate,
            min_stage_duration,
            min_stage_requests,
        })
    }

    pub fn from_config(config: &RolloutConfig) -> Result<Self, RolloutError> {
        Self::new(
            StageLadder::from_config(&config.stages)?,
            config.rollback_error_rate,
            config.min_stage_duration,
            config.min_stage_requests,
        )
    }

    pub fn ladder(&self) -> &StageLadder {
        &self.ladder
    }

    pub fn rollback_error_rate(&self) -> f64 {
        self.rollback_error_rate
    }

    /// Roll back when the error rate exceeds the threshold. Otherwise hold
    /// until both the minimum duration and request count are met, then
    /// advance (or complete on the last stage).
    ///
    /// Snapshots with more failures than requests, or whose traffic share
    /// disagrees with the stage, are rejected.
    pub fn evaluate(&self, metrics: &RolloutMetrics) -> Result<RolloutDecision, RolloutError> {
        let stage = self.ladder.get(&metrics.stage)?;
        if metrics.failed_requests > metrics.total_requests {
            return Err(RolloutError::FailuresExceedTotal {
                stage: metrics.stage.clone(),
                failed: metrics.failed_requests,
                total: metrics.total_requests,
            });
        }
        if metrics.traffic_percentage != stage.traffic_percentage {
            return Err(RolloutError::TrafficMismatch {
                stage: metrics.stage.clone(),
                expected: stage.traffic_percentage,
                actual: metrics.traffic_percentage,
            });
        }
        let next = self.ladder.next(&metrics.stage)?;
        if metrics.error_rate() > self.rollback_error_rate {
            return Ok(RolloutDecision::Rollback);
        }
        if metrics.duration < self.min_stage_duration
            || metrics.total_requests < self.min_stage_requests
        {
            return Ok(RolloutDecision::Hold);
        }
        Ok(match next {
            Some(stage) => RolloutDecision::Advance {
                next: stage.label.clone(),
            },
            None => RolloutDecision::Complete,
        })
    }
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self {
            ladder: StageLadder::default(),
            rollback_error_rate: 0.05,
            min_stage_duration: Duration::from_secs(300),
            min_stage_requests: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(stage: &str, total: u64, failed: u64, secs: u64) -> RolloutMetrics {
        let percentage = StageLadder::default()
            .get(stage)
            .map_or(0, |stage| stage.traffic_percentage);
        RolloutMetrics::new(stage, percentage)
            .with_requests(total, failed)
            .with_duration(Duration::from_secs(secs))
    }

    #[test]
    fn error_rate_is_failed_over_total() {
        assert_eq!(snapshot("stage_10", 0, 0, 0).error_rate(), 0.0);
        assert_eq!(snapshot("stage_10", 200, 10, 0).error_rate(), 0.05);
    }

    #[test]
    fn high_error_rate_rolls_back_even_early() {
        let policy = RolloutPolicy::default();
        assert_eq!(
            policy.evaluate(&snapshot("stage_25", 20, 5, 10)).unwrap(),
            RolloutDecision::Rollback
        );
    }

    #[test]
    fn threshold_rate_itself_does_not_roll_back() {
        let policy = RolloutPolicy::default();
        assert_eq!(
            policy.evaluate(&snapshot("stage_10", 200, 10, 600)).unwrap(),
            RolloutDecision::Advance {
                next: "stage_25".into()
            }
        );
    }

    #[test]
    fn holds_until_duration_and_volume_are_met() {
        let policy = RolloutPolicy::default();
        assert_eq!(
            policy.evaluate(&snapshot("stage_10", 500, 0, 60)).unwrap(),
            RolloutDecision::Hold
        );
        assert_eq!(
            policy.evaluate(&snapshot("stage_10", 50, 0, 600)).unwrap(),
            RolloutDecision::Hold
        );
    }

    #[test]
    fn final_stage_completes() {
        let policy = RolloutPolicy::default();
        assert_eq!(
            policy.evaluate(&snapshot("stage_100", 1000, 1, 600)).unwrap(),
            RolloutDecision::Complete
        );
        assert!(matches!(
            policy.evaluate(&snapshot("canary", 1000, 1, 600)),
            Err(RolloutError::UnknownStage(_))
        ));
    }

    #[test]
    fn inconsistent_snapshots_are_rejected() {
        let policy = RolloutPolicy::default();
        assert_eq!(
            policy.evaluate(&snapshot("stage_10", 10, 11, 600)),
            Err(RolloutError::FailuresExceedTotal {
                stage: "stage_10".into(),
                failed: 11,
                total: 10,
            })
        );
        let mislabelled = RolloutMetrics::new("stage_50", 10)
            .with_requests(500, 0)
            .with_duration(Duration::from_secs(600));
        assert_eq!(
            policy.evaluate(&mislabelled),
            Err(RolloutError::TrafficMismatch {
                stage: "stage_50".into(),
                expected: 50,
                actual: 10,
            })
        );
    }

    #[test]
    fn decision_serialises_with_tag() {
        let json = serde_json::to_value(RolloutDecision::Advance {
            next: "stage_50".into(),
        })
        .unwrap();
        assert_eq!(json["decision"], "advance");
        assert_eq!(json["next"], "stage_50");
    }
}
