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

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts};
use vigil_metrics::SharedRegistry;

use crate::circuit_breaker::CircuitState;
use crate::degraded::DegradedAction;

/// Metrics published by the resilience subsystem.
#[derive(Clone)]
pub struct ResilienceMetrics {
    breaker_state: IntGaugeVec,
    breaker_transitions_total: IntCounterVec,
    service_calls_total: IntCounterVec,
    service_fallbacks_total: IntCounterVec,
    service_call_seconds: HistogramVec,
}

impl ResilienceMetrics {
    /// Register the resilience metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let breaker_state = IntGaugeVec::new(
            Opts::new(
                "vigil_breaker_state",
                "Current breaker state per service (0 closed, 1 half-open, 2 open)",
            ),
            &["service"],
        )?;
        registry.register(Box::new(breaker_state.clone()))?;

        let breaker_transitions_total = IntCounterVec::new(
            Opts::new(
                "vigil_breaker_transitions_total",
                "Breaker state transitions by service and destination state",
            ),
            &["service", "to"],
        )?;
        registry.register(Box::new(breaker_transitions_total.clone()))?;

        let service_calls_total = IntCounterVec::new(
            Opts::new(
                "vigil_service_calls_total",
                "Calls routed through the service manager by outcome",
            ),
            &["service", "outcome"],
        )?;
        registry.register(Box::new(service_calls_total.clone()))?;

        let service_fallbacks_total = IntCounterVec::new(
            Opts::new(
                "vigil_service_fallbacks_total",
                "Degraded-mode fallbacks applied instead of propagating a failure",
            ),
            &["service", "action"],
        )?;
        registry.register(Box::new(service_fallbacks_total.clone()))?;

        let histogram_opts = HistogramOpts::new(
            "vigil_service_call_seconds",
            "Observed latency of calls routed through the service manager",
        )
        .buckets(vigil_metrics::latency_buckets()?);
        let service_call_seconds = HistogramVec::new(histogram_opts, &["service"])?;
        registry.register(Box::new(service_call_seconds.clone()))?;

        Ok(Self {
            breaker_state,
            breaker_transitions_total,
            service_calls_total,
            service_fallbacks_total,
            service_call_seconds,
        })
    }

    pub fn set_breaker_state(&self, service: &str, state: CircuitState) {
        self.breaker_state
            .with_label_values(&[service])
            .set(state.gauge_value());
    }

    /// Track a transition and update the state gauge.
    pub fn record_transition(&self, service: &str, to: CircuitState) {
        self.breaker_transitions_total
            .with_label_values(&[service, to.as_str()])
            .inc();
        self.set_breaker_state(service, to);
    }

    pub fn record_call(&self, service: &str, outcome: &str, elapsed: Duration) {
        self.service_calls_total
            .with_label_values(&[service, outcome])
            .inc();
        self.service_call_seconds
            .with_label_values(&[service])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_fallback(&self, service: &str, action: DegradedAction) {
        self.service_fallbacks_total
            .with_label_values(&[service, action.as_str()])
            .inc();
    }
}

impl std::fmt::Debug for ResilienceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceMetrics").finish_non_exhaustive()
    }
}
