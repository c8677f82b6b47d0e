//! ---
//! vigil_section: "09-staged-rollout"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Deterministic traffic split and rollout progression rule."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---

pub mod error;
pub mod manager;
pub mod metrics;
pub mod policy;
pub mod split;
pub mod stage;

pub use error::RolloutError;
pub use manager::{RolloutManager, VersionChoice};
pub use metrics::RolloutDecisionMetrics;
pub use policy::{RolloutDecision, RolloutMetrics, RolloutPolicy};
pub use split::{bucket, request_fingerprint, should_use_new_version};
pub use stage::{RolloutStage, StageLadder};
