//! ---
//! vigil_section: "07-resilience-fault-tolerance"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Circuit breaking and degraded-mode orchestration."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::future::Future;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use vigil_common::config::{BreakerSettings, ServicesConfig};
use vigil_common::time::{SharedClock, SystemClock};

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::degraded::{DegradedAction, DegradedModeConfig, DegradedModeTable, ServiceResponse};
use crate::error::{ConfigError, ServiceError};
use crate::health::{HealthObservation, HealthStatus, ServiceHealth};
use crate::metrics::ResilienceMetrics;
use crate::registry::{ServiceDefinition, ServiceRegistry};

/// Construction-time knobs for [`ServiceManager`].
#[derive(Debug, Clone)]
pub struct ServiceManagerOptions {
    /// Baseline breaker tuning, overridden per service by the degraded-mode table.
    pub breaker_defaults: BreakerSettings,
    /// Timeout applied to out-of-band health probes.
    pub probe_timeout: Duration,
    pub clock: SharedClock,
    pub metrics: Option<ResilienceMetrics>,
}

impl ServiceManagerOptions {
    pub fn from_config(config: &ServicesConfig) -> Self {
        Self {
            breaker_defaults: config.breaker_defaults,
            probe_timeout: config.health_probe_timeout,
            ..Self::default()
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: ResilienceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl Default for ServiceManagerOptions {
    fn default() -> Self {
        Self {
            breaker_defaults: BreakerSettings::default(),
            probe_timeout: Duration::from_millis(500),
            clock: SystemClock::shared(),
            metrics: None,
        }
    }
}

#[derive(Debug)]
struct ManagedService {
    definition: ServiceDefinition,
    policy: DegradedModeConfig,
    breaker: CircuitBreaker,
    health: Mutex<Option<HealthObservation>>,
}

impl ManagedService {
    fn observe(&self, status: HealthStatus, response_time: Duration) {
        *self.health.lock() = Some(HealthObservation::now(status, response_time));
    }

    fn is_degraded(&self) -> bool {
        self.breaker.state() != CircuitState::Closed
    }
}

/// Routes calls to external services through per-service breakers and
/// applies degraded-mode fallbacks when they fail.
#[derive(Debug)]
pub struct ServiceManager {
    services: IndexMap<String, ManagedService>,
    disabled: IndexMap<String, ServiceDefinition>,
    probe_timeout: Duration,
    metrics: Option<ResilienceMetrics>,
}

impl ServiceManager {
    /// Reconcile the registry with the degraded-mode table and build one
    /// breaker per enabled service.
    ///
    /// Every enabled registry entry needs a policy and every policy needs a
    /// registry entry. Disabled entries get no breaker; calls to them fail
    /// with [`ServiceError::ServiceDisabled`].
    pub fn initialize(
        registry: &ServiceRegistry,
        table: &DegradedModeTable,
        options: ServiceManagerOptions,
    ) -> Result<Self, ConfigError> {
        for (name, _) in table.iter() {
            if registry.get(name).is_none() {
                return Err(ConfigError::MissingRegistryEntry(name.to_owned()));
            }
        }

        let mut services = IndexMap::new();
        let mut disabled = IndexMap::new();
        for (name, definition) in registry.iter() {
            if definition.disabled {
                debug!(target: "vigil::resilience::manager", service = name, "service disabled in registry");
                disabled.insert(name.to_owned(), definition.clone());
                continue;
            }
            let policy = table
                .get(name)
                .ok_or_else(|| ConfigError::MissingDegradedPolicy(name.to_owned()))?;
            let config = policy.breaker_config(options.breaker_defaults);
            config
                .validate()
                .map_err(|reason| ConfigError::InvalidBreaker {
                    service: name.to_owned(),
                    reason,
                })?;
            let mut breaker = CircuitBreaker::with_clock(name, config, options.clock.clone());
            if let Some(metrics) = &options.metrics {
                breaker = breaker.with_metrics(metrics.clone());
            }
            services.insert(
                name.to_owned(),
                ManagedService {
                    definition: definition.clone(),
                    policy: policy.clone(),
                    breaker,
                    health: Mutex::new(None),
                },
            );
        }

        info!(
            target: "vigil::resilience::manager",
            services = services.len(),
            disabled = disabled.len(),
            "service manager initialised",
        );
        Ok(Self {
            services,
            disabled,
            probe_timeout: options.probe_timeout,
            metrics: options.metrics,
        })
    }

    /// Load both tables from the paths in `config` and initialise.
    pub fn from_config(
        config: &ServicesConfig,
        metrics: Option<ResilienceMetrics>,
    ) -> anyhow::Result<Self> {
        let registry = ServiceRegistry::from_path(&config.registry_path)?;
        let table = DegradedModeTable::from_path(&config.degraded_mode_path)?;
        let mut options = ServiceManagerOptions::from_config(config);
        options.metrics = metrics;
        Ok(Self::initialize(&registry, &table, options)?)
    }

    /// Execute `operation` through the named service's breaker.
    ///
    /// Failures of critical services are returned as [`ServiceError::Failed`].
    /// Failures of non-critical services resolve to the configured fallback.
    pub async fn call_service<T, F, Fut>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<ServiceResponse<T>, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let service = self.lookup(name)?;
        let started = Instant::now();
        let result = service.breaker.execute(operation).await;
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                service.observe(HealthStatus::Healthy, elapsed);
                if let Some(metrics) = &self.metrics {
                    metrics.record_call(name, "success", elapsed);
                }
                Ok(ServiceResponse::Live(value))
            }
            Err(err) => {
                service.observe(HealthStatus::Down, elapsed);
                if let Some(metrics) = &self.metrics {
                    metrics.record_call(name, err.kind(), elapsed);
                }
                if service.policy.critical {
                    error!(
                        target: "vigil::resilience::manager",
                        service = name,
                        kind = err.kind(),
                        error = %err,
                        "critical service failed; propagating",
                    );
                    return Err(ServiceError::Failed {
                        service: name.to_owned(),
                        source: err,
                    });
                }

                let action = service.policy.action;
                warn!(
                    target: "vigil::resilience::manager",
                    service = name,
                    kind = err.kind(),
                    action = %action,
                    error = %err,
                    "service call failed; applying degraded mode",
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_fallback(name, action);
                }
                Ok(match action {
                    DegradedAction::PassThrough => ServiceResponse::Skipped {
                        service: name.to_owned(),
                    },
                    DegradedAction::Modify => {
                        ServiceResponse::Fallback(service.policy.fallback_payload(name))
                    }
                })
            }
        }
    }

    /// Run an out-of-band liveness probe bounded by the probe timeout.
    ///
    /// The breaker's counters are not touched. Returns whether the probe
    /// succeeded.
    pub async fn check_health<T, F, Fut>(&self, name: &str, probe: F) -> Result<bool, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let service = self.lookup(name)?;
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.probe_timeout, probe()).await;
        let elapsed = started.elapsed();

        let alive = match outcome {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                debug!(target: "vigil::resilience::manager", service = name, error = %err, "health probe failed");
                false
            }
            Err(_) => {
                debug!(target: "vigil::resilience::manager", service = name, "health probe timed out");
                false
            }
        };
        let status = match (alive, service.breaker.state()) {
            (false, _) => HealthStatus::Down,
            (true, CircuitState::Closed) => HealthStatus::Healthy,
            (true, _) => HealthStatus::Degraded,
        };
        service.observe(status, elapsed);
        Ok(alive)
    }

    /// Services whose breaker is not CLOSED.
    pub fn degraded_services(&self) -> Vec<String> {
        self.services
            .iter()
            .filter(|(_, service)| service.is_degraded())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Health snapshot of every enabled service, in registry order.
    pub fn all_health_checks(&self) -> Vec<ServiceHealth> {
        self.services
            .iter()
            .map(|(name, service)| Self::health_of(name, service))
            .collect()
    }

    pub fn health(&self, name: &str) -> Option<ServiceHealth> {
        self.services
            .get(name)
            .map(|service| Self::health_of(name, service))
    }

    /// The configured audit note, only while the service's breaker is not CLOSED.
    pub fn audit_note(&self, name: &str) -> Option<String> {
        let service = self.services.get(name)?;
        if !service.is_degraded() {
            return None;
        }
        service.policy.audit_note.clone()
    }

    /// Banner text of every currently degraded service.
    pub fn degraded_banner_text(&self) -> Vec<String> {
        self.services
            .values()
            .filter(|service| service.is_degraded())
            .filter_map(|service| service.policy.banner_text.clone())
            .collect()
    }

    /// Reset every breaker and forget recorded health observations.
    pub fn reset_all(&self) {
        for service in self.services.values() {
            service.breaker.reset();
            *service.health.lock() = None;
        }
        info!(target: "vigil::resilience::manager", "all breakers reset");
    }

    pub fn breaker(&self, name: &str) -> Option<&CircuitBreaker> {
        self.services.get(name).map(|service| &service.breaker)
    }

    pub fn policy(&self, name: &str) -> Option<&DegradedModeConfig> {
        self.services.get(name).map(|service| &service.policy)
    }

    pub fn definition(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services
            .get(name)
            .map(|service| &service.definition)
            .or_else(|| self.disabled.get(name))
    }

    /// Enabled services, in registry order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn disabled_services(&self) -> impl Iterator<Item = &str> {
        self.disabled.keys().map(String::as_str)
    }

    fn lookup(&self, name: &str) -> Result<&ManagedService, ServiceError> {
        if let Some(service) = self.services.get(name) {
            return Ok(service);
        }
        if self.disabled.contains_key(name) {
            return Err(ServiceError::ServiceDisabled(name.to_owned()));
        }
        Err(ServiceError::UnknownService(name.to_owned()))
    }

    fn health_of(name: &str, service: &ManagedService) -> ServiceHealth {
        ServiceHealth::derive(name, *service.health.lock(), service.breaker.state())
    }
}
