//! ---
//! vigil_section: "07-resilience-fault-tolerance"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Circuit breaking and degraded-mode orchestration."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
//! Per-service circuit breakers and the degraded-mode layer that decides what
//! a caller receives when an enrichment service fails.

pub mod circuit_breaker;
pub mod degraded;
pub mod error;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod service_manager;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use degraded::{
    DegradedAction, DegradedModeConfig, DegradedModeTable, FallbackPayload, ServiceResponse,
};
pub use error::{BreakerError, ConfigError, ServiceError};
pub use health::{HealthStatus, ServiceHealth};
pub use metrics::ResilienceMetrics;
pub use registry::{ServiceDefinition, ServiceRegistry};
pub use service_manager::{ServiceManager, ServiceManagerOptions};
