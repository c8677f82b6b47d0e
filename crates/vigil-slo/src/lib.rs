//! ---
//! vigil_section: "08-service-level-objectives"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Rolling-window SLO tracking and error-budget classification."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---

pub mod error;
pub mod metrics;
pub mod tracker;

pub use error::SloError;
pub use metrics::SloMetrics;
pub use tracker::{SloDefinition, SloReport, SloStatus, SloThresholds, SloTracker};
