//! ---
//! vigil_section: "07-resilience-fault-tolerance"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Circuit breaking and degraded-mode orchestration."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::time::Duration;

use thiserror::Error;

/// Failure returned by [`crate::CircuitBreaker::execute`].
///
/// The first three variants are produced by the breaker itself. `Operation`
/// carries the wrapped call's own error untouched.
#[derive(Debug, Error)]
pub enum BreakerError {
    /// The breaker is open (or a half-open probe is already in flight).
    #[error("circuit '{service}' is open")]
    CircuitOpen { service: String },
    /// Backpressure guard: too many calls already in flight.
    #[error("circuit '{service}' rejected call: max inflight ({limit}) exceeded")]
    MaxInflightExceeded { service: String, limit: usize },
    /// The wrapped call did not settle within the configured timeout.
    #[error("call through circuit '{service}' timed out after {after:?}")]
    Timeout { service: String, after: Duration },
    /// The wrapped call itself failed.
    #[error(transparent)]
    Operation(anyhow::Error),
}

impl BreakerError {
    /// Whether the breaker produced this error rather than the wrapped call.
    pub fn is_breaker_induced(&self) -> bool {
        !matches!(self, BreakerError::Operation(_))
    }

    /// Stable label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BreakerError::CircuitOpen { .. } => "circuit_open",
            BreakerError::MaxInflightExceeded { .. } => "max_inflight",
            BreakerError::Timeout { .. } => "timeout",
            BreakerError::Operation(_) => "operation",
        }
    }

    /// Recover the business error, if this is one.
    pub fn into_operation(self) -> Option<anyhow::Error> {
        match self {
            BreakerError::Operation(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors surfaced by [`crate::ServiceManager`] calls.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown service '{0}'")]
    UnknownService(String),
    #[error("service '{0}' is disabled in the registry")]
    ServiceDisabled(String),
    /// A critical dependency failed; no fallback is applied.
    #[error("critical service '{service}' failed: {source}")]
    Failed {
        service: String,
        #[source]
        source: BreakerError,
    },
}

impl ServiceError {
    /// Configuration defects are never retryable.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ServiceError::UnknownService(_) | ServiceError::ServiceDisabled(_)
        )
    }

    /// Underlying breaker failure for critical propagation.
    pub fn breaker_error(&self) -> Option<&BreakerError> {
        match self {
            ServiceError::Failed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Raised while reconciling the service registry with the degraded-mode table.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("service '{0}' has a degraded-mode policy but no registry entry")]
    MissingRegistryEntry(String),
    #[error("service '{0}' is registered but has no degraded-mode policy")]
    MissingDegradedPolicy(String),
    #[error("service '{service}' has invalid breaker settings: {reason}")]
    InvalidBreaker { service: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_errors_keep_their_identity() {
        #[derive(Debug, Error)]
        #[error("upstream said no")]
        struct Upstream;

        let err = BreakerError::Operation(anyhow::Error::new(Upstream));
        assert!(!err.is_breaker_induced());
        assert_eq!(err.to_string(), "upstream said no");
        let inner = err.into_operation().unwrap();
        assert!(inner.downcast_ref::<Upstream>().is_some());
    }

    #[test]
    fn breaker_errors_are_labelled() {
        let open = BreakerError::CircuitOpen {
            service: "ocr".into(),
        };
        assert!(open.is_breaker_induced());
        assert_eq!(open.kind(), "circuit_open");
        let timeout = BreakerError::Timeout {
            service: "ocr".into(),
            after: Duration::from_millis(500),
        };
        assert_eq!(timeout.kind(), "timeout");
        assert_eq!(
            timeout.to_string(),
            "call through circuit 'ocr' timed out after 500ms"
        );
    }

    #[test]
    fn service_error_classification() {
        assert!(ServiceError::UnknownService("x".into()).is_configuration_error());
        let failed = ServiceError::Failed {
            service: "recall".into(),
            source: BreakerError::CircuitOpen {
                service: "recall".into(),
            },
        };
        assert!(!failed.is_configuration_error());
        assert_eq!(failed.breaker_error().map(BreakerError::kind), Some("circuit_open"));
    }
}
