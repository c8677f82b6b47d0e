//! ---
//! vigil_section: "08-service-level-objectives"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Rolling-window SLO tracking and error-budget classification."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use anyhow::Result;
use prometheus::{GaugeVec, IntCounterVec, Opts};
use vigil_metrics::SharedRegistry;

use crate::tracker::SloReport;

/// Metrics published by the SLO tracker.
#[derive(Clone)]
pub struct SloMetrics {
    requests_total: IntCounterVec,
    success_rate: GaugeVec,
    error_budget_remaining: GaugeVec,
}

impl SloMetrics {
    /// Register the SLO metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new(
                "vigil_slo_requests_total",
                "Request outcomes recorded per SLO route",
            ),
            &["route", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let success_rate = GaugeVec::new(
            Opts::new(
                "vigil_slo_success_rate",
                "Success rate over the route's rolling window at the last check",
            ),
            &["route"],
        )?;
        registry.register(Box::new(success_rate.clone()))?;

        let error_budget_remaining = GaugeVec::new(
            Opts::new(
                "vigil_slo_error_budget_remaining",
                "Fraction of the error budget left at the last check",
            ),
            &["route"],
        )?;
        registry.register(Box::new(error_budget_remaining.clone()))?;

        Ok(Self {
            requests_total,
            success_rate,
            error_budget_remaining,
        })
    }

    pub fn record_request(&self, route: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.requests_total
            .with_label_values(&[route, outcome])
            .inc();
    }

    pub fn observe(&self, report: &SloReport) {
        self.success_rate
            .with_label_values(&[report.name.as_str()])
            .set(report.success_rate);
        self.error_budget_remaining
            .with_label_values(&[report.name.as_str()])
            .set(report.error_budget_remaining);
    }
}

impl std::fmt::Debug for SloMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SloMetrics").finish_non_exhaustive()
    }
}
