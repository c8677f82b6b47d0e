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
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use vigil_common::config::{load_table, BreakerSettings};

use crate::circuit_breaker::CircuitBreakerConfig;

/// What a non-critical service contributes when its call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedAction {
    /// Skip the enrichment step; downstream treats the result as absent.
    PassThrough,
    /// Substitute the configured fallback payload.
    Modify,
}

impl DegradedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradedAction::PassThrough => "pass_through",
            DegradedAction::Modify => "modify",
        }
    }
}

impl fmt::Display for DegradedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Degraded-mode policy for one service.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedModeConfig {
    /// Critical services propagate failures instead of falling back.
    #[serde(default)]
    pub critical: bool,
    pub action: DegradedAction,
    #[serde(rename = "timeout_ms", default)]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub banner_text: Option<String>,
    #[serde(default)]
    pub audit_note: Option<String>,
    #[serde(default)]
    pub fallback_disclaimer: Option<String>,
}

impl DegradedModeConfig {
    pub fn new(action: DegradedAction) -> Self {
        Self {
            critical: false,
            action,
            timeout: None,
            max_retries: None,
            banner_text: None,
            audit_note: None,
            fallback_disclaimer: None,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner_text = Some(banner.into());
        self
    }

    pub fn with_audit_note(mut self, note: impl Into<String>) -> Self {
        self.audit_note = Some(note.into());
        self
    }

    pub fn with_disclaimer(mut self, disclaimer: impl Into<String>) -> Self {
        self.fallback_disclaimer = Some(disclaimer.into());
        self
    }

    /// Breaker tuning for this service: `timeout_ms` replaces the call
    /// timeout and a non-zero `max_retries` replaces the failure threshold.
    pub fn breaker_config(&self, defaults: BreakerSettings) -> CircuitBreakerConfig {
        let mut config = CircuitBreakerConfig::from(defaults);
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(retries) = self.max_retries.filter(|r| *r > 0) {
            config.failure_threshold = retries;
        }
        config
    }

    pub(crate) fn fallback_payload(&self, service: &str) -> FallbackPayload {
        FallbackPayload {
            service: service.to_owned(),
            disclaimer: self
                .fallback_disclaimer
                .clone()
                .unwrap_or_else(|| format!("{service} is temporarily unavailable; results may be incomplete.")),
            banner_text: self.banner_text.clone(),
            audit_note: self.audit_note.clone(),
        }
    }
}

/// Degraded-mode policies keyed by service name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DegradedModeTable {
    policies: IndexMap<String, DegradedModeConfig>,
}

impl DegradedModeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the table from a JSON, YAML or TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        load_table(path)
            .with_context(|| format!("unable to load degraded-mode table {}", path.display()))
    }

    pub fn with_policy(mut self, service: impl Into<String>, policy: DegradedModeConfig) -> Self {
        self.insert(service, policy);
        self
    }

    pub fn insert(&mut self, service: impl Into<String>, policy: DegradedModeConfig) {
        self.policies.insert(service.into(), policy);
    }

    pub fn get(&self, service: &str) -> Option<&DegradedModeConfig> {
        self.policies.get(service)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DegradedModeConfig)> {
        self.policies.iter().map(|(name, policy)| (name.as_str(), policy))
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Substitute enrichment produced by a `modify` policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackPayload {
    pub service: String,
    pub disclaimer: String,
    pub banner_text: Option<String>,
    pub audit_note: Option<String>,
}

/// What a caller receives from [`crate::ServiceManager::call_service`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ServiceResponse<T> {
    /// Real enrichment from the service.
    Live(T),
    /// The step produced nothing; downstream must treat it as absent.
    Skipped { service: String },
    /// Fallback enrichment substituted for a failed call.
    Fallback(FallbackPayload),
}

impl<T> ServiceResponse<T> {
    pub fn is_live(&self) -> bool {
        matches!(self, ServiceResponse::Live(_))
    }

    pub fn is_degraded(&self) -> bool {
        !self.is_live()
    }

    pub fn live(self) -> Option<T> {
        match self {
            ServiceResponse::Live(value) => Some(value),
            _ => None,
        }
    }

    pub fn fallback(&self) -> Option<&FallbackPayload> {
        match self {
            ServiceResponse::Fallback(payload) => Some(payload),
            _ => None,
        }
    }
}
