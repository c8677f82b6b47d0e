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

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Serialize;
use vigil_rollout::{bucket, RolloutManager, VersionChoice};

use crate::{load_config, OutputFormat};

#[derive(Debug, Args)]
pub struct SplitCommand {
    /// Share of traffic on the new version.
    #[arg(
        long,
        short = 'p',
        value_name = "PERCENT",
        value_parser = clap::value_parser!(u8).range(0..=100),
        conflicts_with = "stage",
        required_unless_present = "stage"
    )]
    percentage: Option<u8>,
    /// Take the percentage from a configured rollout stage instead.
    #[arg(long, short = 's', value_name = "LABEL")]
    stage: Option<String>,
    /// Request ids to classify.
    #[arg(value_name = "ID", required = true, num_args = 1..)]
    ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Assignment<'a> {
    request_id: &'a str,
    bucket: u8,
    version: VersionChoice,
}

impl SplitCommand {
    pub fn execute(self, config: Option<&Path>, output: OutputFormat) -> Result<String> {
        let percentage = match (&self.stage, self.percentage) {
            (Some(label), _) => {
                let loaded = load_config(config)?;
                let manager = RolloutManager::from_config(&loaded.config.rollout, None)
                    .context("invalid [rollout] section")?;
                manager.stages().get(label)?.traffic_percentage
            }
            (None, Some(percentage)) => percentage,
            (None, None) => return Err(anyhow!("either --percentage or --stage is required")),
        };

        let assignments: Vec<Assignment<'_>> = self
            .ids
            .iter()
            .map(|id| {
                let bucket = bucket(id);
                Assignment {
                    request_id: id,
                    bucket,
                    version: if bucket < percentage {
                        VersionChoice::New
                    } else {
                        VersionChoice::Old
                    },
                }
            })
            .collect();

        match output {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&assignments)?),
            OutputFormat::Text => {
                let mut out = String::new();
                for assignment in &assignments {
                    let _ = writeln!(
                        out,
                        "{}\t{}\tbucket={}",
                        assignment.request_id, assignment.version, assignment.bucket
                    );
                }
                Ok(out.trim_end().to_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_rollout::should_use_new_version;

    fn command(percentage: u8, ids: &[&str]) -> SplitCommand {
        SplitCommand {
            percentage: Some(percentage),
            stage: None,
            ids: ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    #[test]
    fn matches_library_assignment() {
        let ids = ["req-1", "req-2", "req-3", "req-4"];
        let text = command(50, &ids).execute(None, OutputFormat::Text).unwrap();
        for (line, id) in text.lines().zip(ids) {
            let expected = if should_use_new_version(50, id) { "new" } else { "old" };
            assert!(line.starts_with(&format!("{id}\t{expected}\t")), "{line}");
        }
    }

    #[test]
    fn stage_percentage_comes_from_config() {
        let (_dir, path) = crate::test_support::config_tree();
        let cmd = SplitCommand {
            percentage: None,
            stage: Some("stage_100".into()),
            ids: vec!["req-1".into(), "req-2".into()],
        };
        let json = cmd.execute(Some(&path), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["version"], "new");
        assert_eq!(value[1]["version"], "new");
    }
}
