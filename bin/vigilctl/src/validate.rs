//! ---
//! vigil_section: "10-operator-tooling"
//! vigil_subsection: "binary"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Operator CLI for the Vigil control plane."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;
use vigil_resilience::ServiceManager;
use vigil_rollout::{RolloutManager, RolloutStage};
use vigil_slo::SloTracker;

use crate::{load_config, OutputFormat};

#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Also print the resolved configuration as YAML.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    show_config: bool,
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    source: String,
    services: Vec<ServiceSummary>,
    disabled: Vec<String>,
    slos: Vec<SloSummary>,
    stages: Vec<RolloutStage>,
}

#[derive(Debug, Serialize)]
struct ServiceSummary {
    name: String,
    critical: bool,
    action: String,
    failure_threshold: u32,
    timeout_ms: u64,
    reset_timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct SloSummary {
    name: String,
    target: f64,
    window_seconds: u64,
}

impl ValidateCommand {
    pub fn execute(self, config: Option<&Path>, output: OutputFormat) -> Result<String> {
        let loaded = load_config(config)?;
        let app = &loaded.config;
        let manager = ServiceManager::from_config(&app.services, None)?;
        let tracker = SloTracker::from_config(&app.slo, None).context("invalid [slo] section")?;
        let rollout =
            RolloutManager::from_config(&app.rollout, None).context("invalid [rollout] section")?;

        let services = manager
            .service_names()
            .filter_map(|name| {
                let policy = manager.policy(name)?;
                let breaker = manager.breaker(name)?.config();
                Some(ServiceSummary {
                    name: name.to_owned(),
                    critical: policy.critical,
                    action: policy.action.to_string(),
                    failure_threshold: breaker.failure_threshold,
                    timeout_ms: breaker.timeout.as_millis() as u64,
                    reset_timeout_ms: breaker.reset_timeout.as_millis() as u64,
                })
            })
            .collect();
        let slos = tracker
            .route_names()
            .into_iter()
            .filter_map(|name| tracker.definition(&name))
            .map(|definition| SloSummary {
                name: definition.name,
                target: definition.target,
                window_seconds: definition.window.as_secs(),
            })
            .collect();
        let report = ValidationReport {
            source: loaded.source.display().to_string(),
            services,
            disabled: manager.disabled_services().map(str::to_owned).collect(),
            slos,
            stages: rollout.stages().iter().cloned().collect(),
        };
        info!(
            target: "vigil::ctl::validate",
            source = %report.source,
            services = report.services.len(),
            "configuration validated",
        );

        let mut rendered = match output {
            OutputFormat::Json => serde_json::to_string_pretty(&report)?,
            OutputFormat::Text => render_text(&report),
        };
        if self.show_config {
            let preview =
                serde_yaml::to_string(app).context("failed to serialise configuration preview")?;
            rendered.push_str(&format!("\n\nResolved configuration (YAML):\n---\n{preview}---"));
        }
        Ok(rendered)
    }
}

fn render_text(report: &ValidationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Configuration OK: {}", report.source);
    let _ = writeln!(out, "\nServices:");
    for service in &report.services {
        let _ = writeln!(
            out,
            "  {:<20} {:<8} {:<12} threshold={} timeout={}ms reset={}ms",
            service.name,
            if service.critical { "critical" } else { "optional" },
            service.action,
            service.failure_threshold,
            service.timeout_ms,
            service.reset_timeout_ms,
        );
    }
    for name in &report.disabled {
        let _ = writeln!(out, "  {name:<20} disabled");
    }
    let _ = writeln!(out, "\nSLOs:");
    for slo in &report.slos {
        let _ = writeln!(
            out,
            "  {:<20} target={} window={}s",
            slo.name, slo.target, slo.window_seconds
        );
    }
    let _ = writeln!(out, "\nRollout stages:");
    for stage in &report.stages {
        let _ = writeln!(out, "  {stage}");
    }
    out.trim_end().to_owned()
}
