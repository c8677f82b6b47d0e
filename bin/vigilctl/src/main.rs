//! ---
//! vigil_section: "10-operator-tooling"
//! vigil_subsection: "binary"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Operator CLI for the Vigil control plane."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use vigil_common::config::{AppConfig, LoadedAppConfig};
use vigil_common::logging;

mod evaluate;
mod metrics;
mod split;
mod validate;

/// Locations inspected when neither `--config` nor `VIGIL_CONFIG` is set.
const DEFAULT_CONFIG_CANDIDATES: &[&str] = &[
    "vigil.toml",
    "configs/vigil.toml",
    "/etc/vigil/vigil.toml",
];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Vigil control-plane operator utility",
    long_about = None
)]
struct Cli {
    /// Application config file (falls back to VIGIL_CONFIG, then the default locations).
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Output rendering.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load every table, initialise the control plane and list what was configured.
    Validate(validate::ValidateCommand),
    /// Print which version each request id is routed to.
    Split(split::SplitCommand),
    /// Evaluate a rollout stage snapshot against the rollback rule.
    Evaluate(evaluate::EvaluateCommand),
    /// Print the Prometheus exposition of a freshly initialised stack.
    Metrics(metrics::MetricsCommand),
}

/// Resolve the app config from an explicit path or the usual search order.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedAppConfig> {
    match explicit {
        Some(path) => Ok(LoadedAppConfig {
            config: AppConfig::from_path(path)?,
            source: path.to_path_buf(),
        }),
        None => AppConfig::load_with_source(DEFAULT_CONFIG_CANDIDATES),
    }
}

fn main() -> Result<()> {
    logging::init_console();
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let rendered = match cli.command {
        Commands::Validate(cmd) => cmd.execute(config, cli.output)?,
        Commands::Split(cmd) => cmd.execute(config, cli.output)?,
        Commands::Evaluate(cmd) => cmd.execute(config, cli.output)?,
        Commands::Metrics(cmd) => cmd.execute(config)?,
    };
    println!("{rendered}");
    Ok(())
}
