//! ---
//! vigil_section: "08-service-level-objectives"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Rolling-window SLO tracking and error-budget classification."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};
use vigil_common::config::SloConfig;
use vigil_common::time::{SharedClock, SystemClock};

use crate::error::SloError;
use crate::metrics::SloMetrics;

/// Classification of a route against its objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SloStatus {
    Healthy,
    Warning,
    Critical,
    /// The success rate itself has dropped below target.
    Violated,
}

impl SloStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SloStatus::Healthy => "healthy",
            SloStatus::Warning => "warning",
            SloStatus::Critical => "critical",
            SloStatus::Violated => "violated",
        }
    }
}

impl fmt::Display for SloStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fractions of the error budget that, once consumed, raise the status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SloThresholds {
    /// Budget consumption at which a route turns `warning`.
    pub warning: f64,
    /// Budget consumption at which a route turns `critical`.
    pub critical: f64,
}

impl SloThresholds {
    pub fn new(warning: f64, critical: f64) -> Result<Self, SloError> {
        let in_range = (0.0..=1.0).contains(&warning) && (0.0..=1.0).contains(&critical);
        if !in_range || warning > critical {
            return Err(SloError::InvalidThresholds { warning, critical });
        }
        Ok(Self { warning, critical })
    }

    /// Violation takes precedence over budget consumption. Otherwise
    /// `critical` once `budget_remaining <= 1 - critical`, `warning` once
    /// `budget_remaining <= 1 - warning`, else `healthy` (defaults: 0.2 and 0.5).
    pub fn classify(&self, target: f64, success_rate: f64, budget_remaining: f64) -> SloStatus {
        if success_rate < target {
            SloStatus::Violated
        } else if budget_remaining <= 1.0 - self.critical {
            SloStatus::Critical
        } else if budget_remaining <= 1.0 - self.warning {
            SloStatus::Warning
        } else {
            SloStatus::Healthy
        }
    }
}

impl Default for SloThresholds {
    fn default() -> Self {
        Self {
            warning: 0.5,
            critical: 0.8,
        }
    }
}

/// Objective for one route. The error budget is fixed when the definition
/// is built.
#[derive(Debug, Clone, PartialEq)]
pub struct SloDefinition {
    pub name: String,
    pub target: f64,
    pub window: Duration,
    error_budget: f64,
}

impl SloDefinition {
    pub fn new(name: impl Into<String>, target: f64, window: Duration) -> Result<Self, SloError> {
        let name = name.into();
        if !(target > 0.0 && target <= 1.0) {
            return Err(SloError::InvalidTarget { name, target });
        }
        if window.is_zero() {
            return Err(SloError::InvalidWindow { name });
        }
        Ok(Self {
            name,
            target,
            window,
            error_budget: 1.0 - target,
        })
    }

    pub fn error_budget(&self) -> f64 {
        self.error_budget
    }
}

/// Point-in-time evaluation of one route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SloReport {
    pub name: String,
    pub target: f64,
    pub window_seconds: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub error_budget_remaining: f64,
    pub status: SloStatus,
}

impl SloReport {
    fn compute(definition: &SloDefinition, total: u64, failed: u64, thresholds: &SloThresholds) -> Self {
        let success_rate = if failed == 0 {
            1.0
        } else {
            (total - failed) as f64 / total as f64
        };
        let allowed_failures = total as f64 * definition.error_budget;
        let error_budget_remaining = if allowed_failures == 0.0 {
            1.0
        } else {
            (1.0 - failed as f64 / allowed_failures).clamp(0.0, 1.0)
        };
        Self {
            name: definition.name.clone(),
            target: definition.target,
            window_seconds: definition.window.as_secs(),
            total_requests: total,
            failed_requests: failed,
            success_rate,
            error_budget_remaining,
            status: thresholds.classify(definition.target, success_rate, error_budget_remaining),
        }
    }

    /// Express the report in a lightweight JSON payload for dashboards.
    pub fn as_status_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "route": self.name,
            "status": self.status.as_str(),
            "success_rate": self.success_rate,
            "error_budget_remaining": self.error_budget_remaining,
            "total_requests": self.total_requests,
            "failed_requests": self.failed_requests,
        })
    }
}

#[derive(Debug)]
struct RouteWindow {
    outcomes: VecDeque<(Instant, bool)>,
    last_status: Option<SloStatus>,
}

#[derive(Debug)]
struct Route {
    definition: SloDefinition,
    window: Mutex<RouteWindow>,
}

impl Route {
    fn new(definition: SloDefinition) -> Self {
        Self {
            definition,
            window: Mutex::new(RouteWindow {
                outcomes: VecDeque::new(),
                last_status: None,
            }),
        }
    }
}

/// Tracks request outcomes per route and classifies them against their
/// objective on demand.
///
/// Entries older than the window are purged when a route is checked and
/// trimmed from the front on every append, under the same lock, so an
/// unchecked route stays bounded and a concurrent append is never dropped.
/// Entries are retained for an extra `grace` period past the window before
/// being purged; only entries inside the window are counted.
#[derive(Debug)]
pub struct SloTracker {
    thresholds: SloThresholds,
    grace: Duration,
    clock: SharedClock,
    metrics: Option<SloMetrics>,
    routes: RwLock<IndexMap<String, Arc<Route>>>,
}

impl SloTracker {
    pub fn new(thresholds: SloThresholds) -> Self {
        Self {
            thresholds,
            grace: Duration::from_secs(1),
            clock: SystemClock::shared(),
            metrics: None,
            routes: RwLock::new(IndexMap::new()),
        }
    }

    /// Build a tracker from the `[slo]` section and register its definitions.
    pub fn from_config(config: &SloConfig, metrics: Option<SloMetrics>) -> Result<Self, SloError> {
        let thresholds = SloThresholds::new(config.warning_threshold, config.critical_threshold)?;
        let mut tracker = Self::new(thresholds).with_grace(config.grace);
        tracker.metrics = metrics;
        for definition in &config.definitions {
            tracker.define_slo(SloDefinition::new(
                definition.name.clone(),
                definition.target,
                Duration::from_secs(definition.window_seconds),
            )?);
        }
        Ok(tracker)
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: SloMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn thresholds(&self) -> SloThresholds {
        self.thresholds
    }

    /// Register an objective. Redefining a route replaces it and discards its
    /// recorded history.
    pub fn define_slo(&self, definition: SloDefinition) {
        let name = definition.name.clone();
        debug!(
            target: "vigil::slo::tracker",
            route = %name,
            target_rate = definition.target,
            window_secs = definition.window.as_secs(),
            "slo defined",
        );
        self.routes.write().insert(name, Arc::new(Route::new(definition)));
    }

    pub fn record_request(&self, name: &str, success: bool) -> Result<(), SloError> {
        let route = self.route(name)?;
        let now = self.clock.now();
        let cutoff = now
            .checked_sub(route.definition.window)
            .and_then(|start| start.checked_sub(self.grace));
        {
            let mut window = route.window.lock();
            if let Some(cutoff) = cutoff {
                while window.outcomes.front().is_some_and(|(at, _)| *at < cutoff) {
                    window.outcomes.pop_front();
                }
            }
            window.outcomes.push_back((now, success));
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_request(name, success);
        }
        Ok(())
    }

    pub fn check_slo(&self, name: &str) -> Result<SloReport, SloError> {
        let route = self.route(name)?;
        Ok(self.evaluate(&route))
    }

    /// Reports for every defined route, in definition order.
    pub fn check_all_slos(&self) -> Vec<SloReport> {
        let routes: Vec<Arc<Route>> = self.routes.read().values().cloned().collect();
        routes.iter().map(|route| self.evaluate(route)).collect()
    }

    /// Drop recorded outcomes for every route; definitions are kept.
    pub fn reset(&self) {
        for route in self.routes.read().values() {
            let mut window = route.window.lock();
            window.outcomes.clear();
            window.last_status = None;
        }
        info!(target: "vigil::slo::tracker", "slo history reset");
    }

    pub fn definition(&self, name: &str) -> Option<SloDefinition> {
        self.routes
            .read()
            .get(name)
            .map(|route| route.definition.clone())
    }

    pub fn route_names(&self) -> Vec<String> {
        self.routes.read().keys().cloned().collect()
    }

    fn route(&self, name: &str) -> Result<Arc<Route>, SloError> {
        self.routes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SloError::NotDefined(name.to_owned()))
    }

    fn evaluate(&self, route: &Route) -> SloReport {
        let definition = &route.definition;
        let mut window = route.window.lock();
        let now = self.clock.now();
        let window_start = now.checked_sub(definition.window);
        if let Some(cutoff) = window_start.and_then(|start| start.checked_sub(self.grace)) {
            window.outcomes.retain(|(at, _)| *at >= cutoff);
        }

        let (total, failed) = window
            .outcomes
            .iter()
            .filter(|(at, _)| window_start.map_or(true, |start| *at >= start))
            .fold((0u64, 0u64), |(total, failed), (_, success)| {
                (total + 1, failed + u64::from(!success))
            });
        let report = SloReport::compute(definition, total, failed, &self.thresholds);

        if window.last_status != Some(report.status) {
            match report.status {
                SloStatus::Healthy | SloStatus::Warning => info!(
                    target: "vigil::slo::tracker",
                    route = %definition.name,
                    status = %report.status,
                    success_rate = report.success_rate,
                    budget_remaining = report.error_budget_remaining,
                    "slo status changed",
                ),
                SloStatus::Critical | SloStatus::Violated => warn!(
                    target: "vigil::slo::tracker",
                    route = %definition.name,
                    status = %report.status,
                    success_rate = report.success_rate,
                    budget_remaining = report.error_budget_remaining,
                    "slo status changed",
                ),
            }
            window.last_status = Some(report.status);
        }
        drop(window);

        if let Some(metrics) = &self.metrics {
            metrics.observe(&report);
        }
        report
    }
}

impl Default for SloTracker {
    fn default() -> Self {
        Self::new(SloThresholds::default())
    }
}
