//! ---
//! vigil_section: "07-resilience-fault-tolerance"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Circuit breaking and degraded-mode orchestration."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
//! Per-dependency circuit breaker.
//!
//! Every call is admitted under the breaker's lock (inflight cap, state check,
//! lazy OPEN to HALF_OPEN promotion), run outside the lock against a timer,
//! and settled under the lock again. Only one half-open probe may be in flight;
//! other callers are rejected as if the circuit were still open.
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use vigil_common::config::BreakerSettings;
use vigil_common::time::{SharedClock, SystemClock};

use crate::error::BreakerError;
use crate::metrics::ResilienceMetrics;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// A limited number of probe calls decide whether to close again.
    HalfOpen,
}

impl CircuitState {
    /// Represent the state as a static label for metrics and status payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    pub(crate) fn gauge_value(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning for a single breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive CLOSED failures that open the circuit.
    pub failure_threshold: u32,
    /// HALF_OPEN successes required to close the circuit.
    pub success_threshold: u32,
    /// Upper bound on a single call.
    pub timeout: Duration,
    /// Time spent OPEN before a probe is admitted.
    pub reset_timeout: Duration,
    /// Concurrent calls admitted before backpressure kicks in.
    pub max_inflight: usize,
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be at least 1".into());
        }
        if self.success_threshold == 0 {
            return Err("success_threshold must be at least 1".into());
        }
        if self.max_inflight == 0 {
            return Err("max_inflight must be at least 1".into());
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than zero".into());
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        BreakerSettings::default().into()
    }
}

impl From<BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            success_threshold: settings.success_threshold,
            timeout: settings.timeout,
            reset_timeout: settings.reset_timeout,
            max_inflight: settings.max_inflight,
        }
    }
}

/// Point-in-time view of a breaker's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub inflight: usize,
    /// Time elapsed since the most recent failure, if any.
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    inflight: usize,
    probe_inflight: bool,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            inflight: 0,
            probe_inflight: false,
        }
    }
}

/// Failure isolation for one protected dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: SharedClock,
    metrics: Option<ResilienceMetrics>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker reading time from the system clock.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, SystemClock::shared())
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            metrics: None,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    /// Attach a metrics handle; the state gauge is seeded immediately.
    pub fn with_metrics(mut self, metrics: ResilienceMetrics) -> Self {
        metrics.set_breaker_state(&self.name, self.state());
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An OPEN breaker whose reset timeout has elapsed still
    /// reports OPEN until the next call promotes it.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn inflight(&self) -> usize {
        self.inner.lock().inflight
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        let now = self.clock.now();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            inflight: inner.inflight,
            since_last_failure: inner
                .last_failure
                .map(|at| now.saturating_duration_since(at)),
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// The operation is not started when the call is rejected. A call that
    /// outlives `timeout` is dropped and reported as [`BreakerError::Timeout`];
    /// its inflight slot is released at that point.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, BreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let permit = self.admit()?;
        match tokio::time::timeout(self.config.timeout, operation()).await {
            Ok(Ok(value)) => {
                permit.complete(true);
                Ok(value)
            }
            Ok(Err(err)) => {
                permit.complete(false);
                debug!(
                    target: "vigil::resilience::breaker",
                    service = %self.name,
                    error = %err,
                    "protected call failed",
                );
                Err(BreakerError::Operation(err))
            }
            Err(_) => {
                permit.complete(false);
                warn!(
                    target: "vigil::resilience::breaker",
                    service = %self.name,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "protected call timed out",
                );
                Err(BreakerError::Timeout {
                    service: self.name.clone(),
                    after: self.config.timeout,
                })
            }
        }
    }

    /// Force the breaker back to CLOSED with zeroed counters. In-flight calls
    /// keep their slots and release them normally.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure = None;
        inner.probe_inflight = false;
        info!(target: "vigil::resilience::breaker", service = %self.name, "breaker reset");
    }

    fn admit(&self) -> Result<CallPermit<'_>, BreakerError> {
        let mut inner = self.inner.lock();
        if inner.inflight >= self.config.max_inflight {
            debug!(
                target: "vigil::resilience::breaker",
                service = %self.name,
                inflight = inner.inflight,
                "rejecting call: max inflight exceeded",
            );
            return Err(BreakerError::MaxInflightExceeded {
                service: self.name.clone(),
                limit: self.config.max_inflight,
            });
        }

        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let now = self.clock.now();
                let cooled_down = inner.last_failure.map_or(true, |at| {
                    now.saturating_duration_since(at) >= self.config.reset_timeout
                });
                if !cooled_down {
                    debug!(target: "vigil::resilience::breaker", service = %self.name, "rejecting call: circuit open");
                    return Err(self.open_error());
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.probe_inflight = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.probe_inflight {
                    debug!(target: "vigil::resilience::breaker", service = %self.name, "rejecting call: probe already in flight");
                    return Err(self.open_error());
                }
                inner.probe_inflight = true;
                true
            }
        };

        inner.inflight += 1;
        Ok(CallPermit {
            breaker: self,
            probe,
            released: false,
        })
    }

    fn open_error(&self) -> BreakerError {
        BreakerError::CircuitOpen {
            service: self.name.clone(),
        }
    }

    /// Apply a call outcome. Successes that land while OPEN, or from calls
    /// admitted before the current HALF_OPEN phase, are ignored; any failure
    /// while HALF_OPEN reopens the circuit.
    fn settle(&self, inner: &mut BreakerInner, success: bool, probe: bool) {
        if success {
            match inner.state {
                CircuitState::Closed => inner.failure_count = 0,
                CircuitState::HalfOpen if probe => {
                    inner.success_count += 1;
                    if inner.success_count >= self.config.success_threshold {
                        self.transition(inner, CircuitState::Closed);
                    }
                }
                CircuitState::HalfOpen | CircuitState::Open => {
                    debug!(target: "vigil::resilience::breaker", service = %self.name, "ignoring stale success");
                }
            }
            return;
        }

        inner.last_failure = Some(self.clock.now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => self.transition(inner, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        match to {
            CircuitState::Closed => {
                inner.failure_count = 0;
                inner.success_count = 0;
            }
            CircuitState::Open | CircuitState::HalfOpen => inner.success_count = 0,
        }
        if to == CircuitState::Open {
            warn!(
                target: "vigil::resilience::breaker",
                service = %self.name,
                from = %from,
                failures = inner.failure_count,
                "circuit opened",
            );
        } else {
            info!(
                target: "vigil::resilience::breaker",
                service = %self.name,
                from = %from,
                to = %to,
                "circuit state transition",
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(&self.name, to);
        }
    }
}

/// Inflight slot held for the duration of one admitted call. Dropping it
/// without completing (caller cancelled) releases the slot and any probe claim
/// without touching the counters.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    released: bool,
}

impl CallPermit<'_> {
    fn complete(mut self, success: bool) {
        let mut inner = self.breaker.inner.lock();
        inner.inflight = inner.inflight.saturating_sub(1);
        if self.probe {
            inner.probe_inflight = false;
        }
        self.breaker.settle(&mut inner, success, self.probe);
        self.released = true;
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let mut inner = self.breaker.inner.lock();
        inner.inflight = inner.inflight.saturating_sub(1);
        if self.probe {
            inner.probe_inflight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::anyhow;
    use vigil_common::time::ManualClock;

    fn config(failure_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            success_threshold: 2,
            timeout: Duration::from_millis(500),
            reset_timeout: Duration::from_secs(30),
            max_inflight: 10,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> BreakerError {
        breaker
            .execute(|| async { Err::<(), _>(anyhow!("boom")) })
            .await
            .unwrap_err()
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError> {
        breaker.execute(|| async { Ok(7) }).await
    }

    #[tokio::test]
    async fn opens_exactly_on_the_threshold_failure() {
        let breaker = CircuitBreaker::new("ocr", config(3));
        for _ in 0..2 {
            assert!(matches!(fail(&breaker).await, BreakerError::Operation(_)));
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let runs = AtomicUsize::new(0);
        let err = breaker
            .execute(|| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerError::CircuitOpen { .. }));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_clears_closed_failures() {
        let breaker = CircuitBreaker::new("units", config(2));
        fail(&breaker).await;
        assert_eq!(breaker.snapshot().failure_count, 1);
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.snapshot().failure_count, 0);
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_after_reset_timeout_then_closes() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::with_clock("recall", config(1), clock.shared());
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(29));
        assert!(matches!(
            succeed(&breaker).await.unwrap_err(),
            BreakerError::CircuitOpen { .. }
        ));
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(1));
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.snapshot().success_count, 1);

        succeed(&breaker).await.unwrap();
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.success_count, 0);
        assert_eq!(snapshot.failure_count, 0);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::with_clock("recall", config(1), clock.shared());
        fail(&breaker).await;
        clock.advance(Duration::from_secs(30));
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().success_count, 0);
        assert!(matches!(
            succeed(&breaker).await.unwrap_err(),
            BreakerError::CircuitOpen { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_probe_in_flight_while_half_open() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::with_clock("alt", config(1), clock.shared());
        fail(&breaker).await;
        clock.advance(Duration::from_secs(31));

        let slow_probe = breaker.execute(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(1)
        });
        let (probe, second) = tokio::join!(slow_probe, succeed(&breaker));
        assert_eq!(probe.unwrap(), 1);
        assert!(matches!(
            second.unwrap_err(),
            BreakerError::CircuitOpen { .. }
        ));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_even_if_they_would_succeed() {
        let breaker = CircuitBreaker::new("ocr", config(5));
        let err = breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok("late")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerError::Timeout { .. }));
        assert!(err.is_breaker_induced());
        assert_eq!(breaker.inflight(), 0);
        assert_eq!(breaker.snapshot().failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_calls_beyond_max_inflight() {
        let breaker = CircuitBreaker::new("ocr", CircuitBreakerConfig::default());
        let limit = breaker.config().max_inflight;
        let calls = (0..=limit).map(|i| {
            breaker.execute(move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(i)
            })
        });
        let results = futures::future::join_all(calls).await;
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(BreakerError::MaxInflightExceeded { .. })))
            .count();
        assert!(rejected >= 1);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), limit);
        assert_eq!(breaker.inflight(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn cancelled_call_releases_its_slot() {
        let breaker = CircuitBreaker::new("ocr", config(5));
        {
            let pending = breaker.execute(|| std::future::pending::<anyhow::Result<()>>());
            tokio::pin!(pending);
            let polled = futures::poll!(pending.as_mut());
            assert!(polled.is_pending());
            assert_eq!(breaker.inflight(), 1);
        }
        assert_eq!(breaker.inflight(), 0);
        assert_eq!(breaker.snapshot().failure_count, 0);
    }

    #[tokio::test]
    async fn business_error_is_returned_unchanged() {
        #[derive(Debug, thiserror::Error)]
        #[error("recall feed rejected lot {0}")]
        struct Rejected(u32);

        let breaker = CircuitBreaker::new("recall", config(5));
        let err = breaker
            .execute(|| async { Err::<(), _>(anyhow::Error::new(Rejected(42))) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "recall feed rejected lot 42");
        let inner = err.into_operation().unwrap();
        assert_eq!(inner.downcast_ref::<Rejected>().map(|r| r.0), Some(42));
    }

    #[tokio::test]
    async fn reset_returns_to_closed() {
        let breaker = CircuitBreaker::new("ocr", config(1));
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker.reset();
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.since_last_failure, None);
        succeed(&breaker).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_open_the_circuit_once() {
        let registry = vigil_metrics::new_registry();
        let metrics = ResilienceMetrics::new(registry.clone()).unwrap();
        let breaker = Arc::new(CircuitBreaker::new("ocr", config(5)).with_metrics(metrics));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let breaker = breaker.clone();
                tokio::spawn(async move {
                    breaker
                        .execute(|| async {
                            tokio::task::yield_now().await;
                            Err::<(), _>(anyhow!("boom"))
                        })
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.inflight(), 0);
        let opened: f64 = registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == "vigil_breaker_transitions_total")
            .flat_map(|family| family.get_metric().to_vec())
            .filter(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|label| label.get_name() == "to" && label.get_value() == "open")
            })
            .map(|metric| metric.get_counter().get_value())
            .sum();
        assert_eq!(opened, 1.0);
    }
}
