//! ---
//! vigil_section: "10-operator-tooling"
//! vigil_subsection: "binary"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Operator CLI for the Vigil control plane."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use vigil_common::config::RolloutConfig;
use vigil_rollout::{RolloutManager, RolloutMetrics};

use crate::{load_config, OutputFormat};

#[derive(Debug, Args)]
pub struct EvaluateCommand {
    /// Stage the snapshot was taken in.
    #[arg(long, value_name = "LABEL")]
    stage: String,
    /// Requests served by the new version during the stage.
    #[arg(long, value_name = "N")]
    total: u64,
    /// Failed requests among `total`.
    #[arg(long, value_name = "N", default_value_t = 0)]
    failed: u64,
    /// How long the stage has been live.
    #[arg(long = "duration-secs", value_name = "SECS", default_value_t = 0)]
    duration_secs: u64,
}

impl EvaluateCommand {
    /// Uses the `[rollout]` section when a config is given, defaults otherwise.
    pub fn execute(self, config: Option<&Path>, output: OutputFormat) -> Result<String> {
        let rollout = match config {
            Some(path) => load_config(Some(path))?.config.rollout,
            None => RolloutConfig::default(),
        };
        let manager =
            RolloutManager::from_config(&rollout, None).context("invalid [rollout] section")?;
        let stage = manager.stages().get(&self.stage)?;
        let snapshot = RolloutMetrics::new(stage.label.clone(), stage.traffic_percentage)
            .with_requests(self.total, self.failed.min(self.total))
            .with_duration(Duration::from_secs(self.duration_secs));
        let decision = manager.evaluate(&snapshot)?;

        Ok(match output {
            OutputFormat::Json => serde_json::to_string_pretty(&json!({
                "snapshot": snapshot,
                "error_rate": snapshot.error_rate(),
                "decision": decision,
            }))?,
            OutputFormat::Text => format!(
                "stage {} error_rate={:.4} threshold={:.4}: {}",
                snapshot.stage,
                snapshot.error_rate(),
                manager.policy().rollback_error_rate(),
                decision
            ),
        })
    }
}
