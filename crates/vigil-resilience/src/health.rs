//! ---
//! vigil_section: "07-resilience-fault-tolerance"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Circuit breaking and degraded-mode orchestration."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_with::{serde_as, DurationMilliSeconds};

use crate::circuit_breaker::CircuitState;

/// Operator-facing health of an external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
        }
    }

    /// Status implied by breaker state alone, used before any call or probe.
    pub fn from_circuit(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => HealthStatus::Healthy,
            CircuitState::HalfOpen => HealthStatus::Degraded,
            CircuitState::Open => HealthStatus::Down,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last observation recorded for a service by a call or a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HealthObservation {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub response_time: Duration,
}

impl HealthObservation {
    pub fn now(status: HealthStatus, response_time: Duration) -> Self {
        Self {
            status,
            checked_at: Utc::now(),
            response_time,
        }
    }
}

/// Derived health snapshot. `circuit_state` always mirrors the breaker at the
/// time the snapshot is taken.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub service: String,
    pub status: HealthStatus,
    /// `None` until the service has been called or probed.
    pub last_check_time: Option<DateTime<Utc>>,
    #[serde(rename = "response_time_ms")]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub response_time: Option<Duration>,
    pub circuit_state: CircuitState,
}

impl ServiceHealth {
    pub(crate) fn derive(
        service: &str,
        observation: Option<HealthObservation>,
        circuit_state: CircuitState,
    ) -> Self {
        match observation {
            Some(obs) => Self {
                service: service.to_owned(),
                status: obs.status,
                last_check_time: Some(obs.checked_at),
                response_time: Some(obs.response_time),
                circuit_state,
            },
            None => Self {
                service: service.to_owned(),
                status: HealthStatus::from_circuit(circuit_state),
                last_check_time: None,
                response_time: None,
                circuit_state,
            },
        }
    }

    /// Express the snapshot in a lightweight JSON payload for status endpoints.
    pub fn as_status_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "service": self.service,
            "status": self.status.as_str(),
            "circuit_state": self.circuit_state.as_str(),
            "last_check_time": self.last_check_time.map(|t| t.to_rfc3339()),
            "response_time_ms": self.response_time.map(|d| d.as_millis() as u64),
        })
    }
}
