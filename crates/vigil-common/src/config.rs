//! ---
//! vigil_section: "01-core-functionality"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Shared primitives and utilities for the control plane."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("configs/mcp.json")
}

fn default_degraded_mode_path() -> PathBuf {
    PathBuf::from("configs/degraded_mode.yaml")
}

fn default_health_probe_timeout() -> Duration {
    Duration::from_millis(500)
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_call_timeout() -> Duration {
    Duration::from_millis(500)
}

fn default_reset_timeout() -> Duration {
    Duration::from_millis(30_000)
}

fn default_max_inflight() -> usize {
    10
}

fn default_warning_threshold() -> f64 {
    0.5
}

fn default_critical_threshold() -> f64 {
    0.8
}

fn default_slo_grace() -> Duration {
    Duration::from_secs(1)
}

fn default_rollback_error_rate() -> f64 {
    0.05
}

fn default_min_stage_duration() -> Duration {
    Duration::from_secs(300)
}

fn default_min_stage_requests() -> u64 {
    100
}

fn default_stages() -> Vec<StageConfig> {
    [10u8, 25, 50, 100]
        .into_iter()
        .map(|pct| StageConfig {
            label: format!("stage_{pct}"),
            traffic_percentage: pct,
        })
        .collect()
}

/// Primary configuration object for the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub slo: SloConfig,
    #[serde(default)]
    pub rollout: RolloutConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "VIGIL_CONFIG";

    /// Load configuration from disk, respecting the `VIGIL_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Parse and validate a configuration file. Relative table paths are
    /// resolved against the directory holding the file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let mut config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Anchor relative registry and degraded-mode paths at `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let services = &mut self.services;
        if services.registry_path.is_relative() {
            services.registry_path = base.join(&services.registry_path);
        }
        if services.degraded_mode_path.is_relative() {
            services.degraded_mode_path = base.join(&services.degraded_mode_path);
        }
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.services.breaker_defaults.validate()?;
        self.slo.validate()?;
        self.rollout.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Where the external service tables live and how their breakers are tuned.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,
    #[serde(default = "default_degraded_mode_path")]
    pub degraded_mode_path: PathBuf,
    #[serde(
        rename = "health_probe_timeout_ms",
        default = "default_health_probe_timeout"
    )]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub health_probe_timeout: Duration,
    #[serde(default)]
    pub breaker_defaults: BreakerSettings,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            degraded_mode_path: default_degraded_mode_path(),
            health_probe_timeout: default_health_probe_timeout(),
            breaker_defaults: BreakerSettings::default(),
        }
    }
}

/// Baseline breaker tuning. Per-service degraded-mode entries override the
/// timeout and failure threshold.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(rename = "timeout_ms", default = "default_call_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
    #[serde(rename = "reset_timeout_ms", default = "default_reset_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reset_timeout: Duration,
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout: default_call_timeout(),
            reset_timeout: default_reset_timeout(),
            max_inflight: default_max_inflight(),
        }
    }
}

impl BreakerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 || self.success_threshold == 0 {
            return Err(anyhow!("breaker thresholds must be at least 1"));
        }
        if self.max_inflight == 0 {
            return Err(anyhow!("breaker max_inflight must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("breaker timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

/// Tracker-wide SLO thresholds plus the routes registered at start-up.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloConfig {
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,
    #[serde(rename = "grace_seconds", default = "default_slo_grace")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub grace: Duration,
    #[serde(default)]
    pub definitions: Vec<SloDefinitionConfig>,
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            warning_threshold: default_warning_threshold(),
            critical_threshold: default_critical_threshold(),
            grace: default_slo_grace(),
            definitions: Vec::new(),
        }
    }
}

impl SloConfig {
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("warning_threshold", self.warning_threshold),
            ("critical_threshold", self.critical_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("slo {label} must lie within [0, 1], got {value}"));
            }
        }
        if self.warning_threshold > self.critical_threshold {
            return Err(anyhow!(
                "slo warning_threshold ({}) must not exceed critical_threshold ({})",
                self.warning_threshold,
                self.critical_threshold
            ));
        }
        for definition in &self.definitions {
            if !(definition.target > 0.0 && definition.target <= 1.0) {
                return Err(anyhow!(
                    "slo '{}' target must lie within (0, 1], got {}",
                    definition.name,
                    definition.target
                ));
            }
            if definition.window_seconds == 0 {
                return Err(anyhow!(
                    "slo '{}' window_seconds must be greater than zero",
                    definition.name
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloDefinitionConfig {
    pub name: String,
    pub target: f64,
    pub window_seconds: u64,
}

/// Stage ladder and progression rule for staged rollouts.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,
    #[serde(default = "default_rollback_error_rate")]
    pub rollback_error_rate: f64,
    #[serde(
        rename = "min_stage_duration_secs",
        default = "default_min_stage_duration"
    )]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub min_stage_duration: Duration,
    #[serde(default = "default_min_stage_requests")]
    pub min_stage_requests: u64,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            rollback_error_rate: default_rollback_error_rate(),
            min_stage_duration: default_min_stage_duration(),
            min_stage_requests: default_min_stage_requests(),
        }
    }
}

impl RolloutConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(anyhow!("rollout must declare at least one stage"));
        }
        let mut previous = 0u8;
        for stage in &self.stages {
            if stage.traffic_percentage > 100 {
                return Err(anyhow!(
                    "rollout stage '{}' traffic_percentage {} exceeds 100",
                    stage.label,
                    stage.traffic_percentage
                ));
            }
            if stage.traffic_percentage < previous {
                return Err(anyhow!(
                    "rollout stage '{}' must not reduce traffic below the previous stage",
                    stage.label
                ));
            }
            previous = stage.traffic_percentage;
        }
        if !(0.0..=1.0).contains(&self.rollback_error_rate) {
            return Err(anyhow!(
                "rollout rollback_error_rate must lie within [0, 1], got {}",
                self.rollback_error_rate
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub label: String,
    pub traffic_percentage: u8,
}

/// Decode a structured table from disk, picking the format from the extension.
pub fn load_table<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read table {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let parsed = match extension.as_str() {
        "json" => serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse JSON table {}", path.display()))?,
        "yaml" | "yml" => serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse YAML table {}", path.display()))?,
        "toml" => toml::from_str(&raw)
            .with_context(|| format!("failed to parse TOML table {}", path.display()))?,
        other => {
            return Err(anyhow!(
                "unsupported table format '{}' for {}",
                other,
                path.display()
            ))
        }
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        let breaker = config.services.breaker_defaults;
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.success_threshold, 2);
        assert_eq!(breaker.timeout, Duration::from_millis(500));
        assert_eq!(breaker.reset_timeout, Duration::from_secs(30));
        assert_eq!(breaker.max_inflight, 10);
        assert_eq!(config.slo.warning_threshold, 0.5);
        assert_eq!(config.slo.critical_threshold, 0.8);
        let pcts: Vec<u8> = config
            .rollout
            .stages
            .iter()
            .map(|s| s.traffic_percentage)
            .collect();
        assert_eq!(pcts, vec![10, 25, 50, 100]);
        config.validate().unwrap();
    }

    #[test]
    fn parses_sections_with_duration_units() {
        let config: AppConfig = r#"
            [services]
            registry_path = "/etc/vigil/mcp.json"
            health_probe_timeout_ms = 250

            [services.breaker_defaults]
            failure_threshold = 3
            reset_timeout_ms = 1000

            [slo]
            warning_threshold = 0.4
            [[slo.definitions]]
            name = "transform"
            target = 0.995
            window_seconds = 60

            [rollout]
            rollback_error_rate = 0.02
            min_stage_duration_secs = 30
        "#
        .parse()
        .unwrap();
        assert_eq!(config.services.health_probe_timeout, Duration::from_millis(250));
        assert_eq!(config.services.breaker_defaults.failure_threshold, 3);
        assert_eq!(
            config.services.breaker_defaults.reset_timeout,
            Duration::from_secs(1)
        );
        assert_eq!(config.slo.definitions[0].window_seconds, 60);
        assert_eq!(config.rollout.min_stage_duration, Duration::from_secs(30));
        assert_eq!(config.rollout.stages.len(), 4);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(r#"
            [[slo.definitions]]
            name = "bad"
            target = 1.5
            window_seconds = 60
        "#
        .parse::<AppConfig>()
        .is_err());
        assert!(r#"
            [slo]
            warning_threshold = 0.9
            critical_threshold = 0.8
        "#
        .parse::<AppConfig>()
        .is_err());
        assert!(r#"
            [[rollout.stages]]
            label = "too_much"
            traffic_percentage = 120
        "#
        .parse::<AppConfig>()
        .is_err());
    }

    #[test]
    fn from_path_resolves_tables_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.toml");
        fs::write(
            &path,
            "[services]\nregistry_path = \"mcp.json\"\ndegraded_mode_path = \"/abs/degraded.yaml\"\n",
        )
        .unwrap();
        let config = AppConfig::from_path(&path).unwrap();
        assert_eq!(config.services.registry_path, dir.path().join("mcp.json"));
        assert_eq!(
            config.services.degraded_mode_path,
            PathBuf::from("/abs/degraded.yaml")
        );
    }

    #[test]
    fn load_table_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("table.json");
        fs::write(&json, r#"{"a": 1}"#).unwrap();
        let yaml = dir.path().join("table.yml");
        fs::write(&yaml, "a: 2\n").unwrap();
        let toml_path = dir.path().join("table.toml");
        fs::write(&toml_path, "a = 3\n").unwrap();

        let parsed: BTreeMap<String, u32> = load_table(&json).unwrap();
        assert_eq!(parsed["a"], 1);
        let parsed: BTreeMap<String, u32> = load_table(&yaml).unwrap();
        assert_eq!(parsed["a"], 2);
        let parsed: BTreeMap<String, u32> = load_table(&toml_path).unwrap();
        assert_eq!(parsed["a"], 3);

        let unknown = dir.path().join("table.ini");
        fs::write(&unknown, "a=4").unwrap();
        assert!(load_table::<BTreeMap<String, u32>>(&unknown).is_err());
    }
}
