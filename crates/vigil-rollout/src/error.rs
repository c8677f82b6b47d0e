//! ---
//! vigil_section: "09-staged-rollout"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Deterministic traffic split and rollout progression rule."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RolloutError {
    #[error("rollout stage '{label}' traffic percentage {percentage} exceeds 100")]
    InvalidPercentage { label: String, percentage: u8 },
    #[error("rollout stage '{label}' reduces traffic below the previous stage")]
    NonMonotonic { label: String },
    #[error("rollout stage label '{0}' is declared more than once")]
    DuplicateStage(String),
    #[error("unknown rollout stage '{0}'")]
    UnknownStage(String),
    #[error("rollout ladder has no stages")]
    EmptyLadder,
    #[error("snapshot for stage '{stage}' reports {failed} failures out of {total} requests")]
    FailuresExceedTotal { stage: String, failed: u64, total: u64 },
    #[error("snapshot for stage '{stage}' reports {actual}% traffic, stage serves {expected}%")]
    TrafficMismatch {
        stage: String,
        expected: u8,
        actual: u8,
    },
    #[error("rollback error rate must lie within [0, 1], got {0}")]
    InvalidErrorRate(f64),
}
