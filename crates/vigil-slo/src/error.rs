//! ---
//! vigil_section: "08-service-level-objectives"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Rolling-window SLO tracking and error-budget classification."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use thiserror::Error;

/// Caller contract violations raised by the SLO tracker. None of these are
/// retryable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SloError {
    #[error("no SLO defined for route '{0}'")]
    NotDefined(String),
    #[error("SLO '{name}' target must lie within (0, 1], got {target}")]
    InvalidTarget { name: String, target: f64 },
    #[error("SLO '{name}' window must be greater than zero")]
    InvalidWindow { name: String },
    #[error("invalid SLO thresholds: warning {warning}, critical {critical}")]
    InvalidThresholds { warning: f64, critical: f64 },
}
